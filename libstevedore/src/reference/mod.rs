//! Repository reference parsing.
//!
//! A reference string has the form `[index-host[:port]/]namespace/name[:tag]`.
//! This module splits a reference into its index and remote-name parts,
//! validates the remote name grammar, and resolves the result against the
//! registry configuration into a [`RepositoryInfo`].

use crate::config::{INDEX_NAME, IndexInfo, ServiceConfig};
use crate::error::{Result, StevedoreError};


/// The implicit namespace of top-level repositories on the official index.
pub const OFFICIAL_NAMESPACE: &str = "library";

/// A repository name resolved against the registry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// The index this repository belongs to.
    pub index: IndexInfo,
    /// Path-form name without the index host (e.g. `library/ubuntu`).
    pub remote_name: String,
    /// Name as shown locally (e.g. `docker.io/ubuntu`).
    pub local_name: String,
    /// Fully qualified, unambiguous name.
    pub canonical_name: String,
    /// True for top-level repositories on the official index.
    pub official: bool,
}

impl RepositoryInfo {
    /// Parses a tagless reference into a `RepositoryInfo`.
    ///
    /// # Examples
    ///
    /// ```
    /// use libstevedore::config::ServiceConfig;
    /// use libstevedore::reference::RepositoryInfo;
    ///
    /// let config = ServiceConfig::default();
    /// let info = RepositoryInfo::parse(&config, "ubuntu").unwrap();
    /// assert_eq!(info.remote_name, "library/ubuntu");
    /// assert_eq!(info.local_name, "docker.io/ubuntu");
    /// assert!(info.official);
    /// ```
    pub fn parse(config: &ServiceConfig, repos_name: &str) -> Result<Self> {
        if repos_name.contains("://") {
            return Err(StevedoreError::invalid_repository_name(format!(
                "invalid repository name ({}): must not include a scheme",
                repos_name
            )));
        }

        let (index_name, remote_name) = split_repos_name(repos_name);
        let index = config.new_index_info(index_name.unwrap_or(INDEX_NAME))?;

        if index.official {
            validate_remote_name(remote_name)?;
            let normalized = if remote_name.contains('/') {
                remote_name.to_string()
            } else {
                format!("{}/{}", OFFICIAL_NAMESPACE, remote_name)
            };

            let official = normalized
                .strip_prefix(OFFICIAL_NAMESPACE)
                .and_then(|rest| rest.strip_prefix('/'))
                .is_some_and(|rest| !rest.contains('/'));

            let local_name = if official {
                format!(
                    "{}/{}",
                    index.name,
                    &normalized[OFFICIAL_NAMESPACE.len() + 1..]
                )
            } else {
                format!("{}/{}", index.name, normalized)
            };

            Ok(Self {
                index,
                remote_name: normalized,
                canonical_name: local_name.clone(),
                local_name,
                official,
            })
        } else {
            validate_remote_name(remote_name)?;
            let local_name = format!("{}/{}", index.name, remote_name);

            Ok(Self {
                index,
                remote_name: remote_name.to_string(),
                canonical_name: local_name.clone(),
                local_name,
                official: false,
            })
        }
    }

    /// The term used when searching this repository's index.
    ///
    /// The implicit namespace is stripped for official repositories so the
    /// search matches what users typed.
    pub fn get_search_term(&self) -> String {
        if self.official {
            self.remote_name[OFFICIAL_NAMESPACE.len() + 1..].to_string()
        } else {
            self.remote_name.clone()
        }
    }
}

/// Splits a reference string into the name and an optional tag.
///
/// The tag separator is the last `:` not followed by a `/`, so host ports
/// are never mistaken for tags.
///
/// # Examples
///
/// ```
/// use libstevedore::reference::parse_repository_tag;
///
/// assert_eq!(parse_repository_tag("ubuntu:14.04"), ("ubuntu", Some("14.04")));
/// assert_eq!(parse_repository_tag("localhost:5000/ubuntu"), ("localhost:5000/ubuntu", None));
/// ```
pub fn parse_repository_tag(repos: &str) -> (&str, Option<&str>) {
    match repos.rfind(':') {
        Some(i) if !repos[i + 1..].contains('/') => (&repos[..i], Some(&repos[i + 1..])),
        _ => (repos, None),
    }
}

/// Splits a repository name into an optional index host and the remote name.
///
/// The first path segment is an index host when it contains a `.` or `:`
/// or equals `localhost`; otherwise the whole string is a remote name on
/// the default index.
pub fn split_repos_name(repos_name: &str) -> (Option<&str>, &str) {
    match repos_name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (Some(first), rest)
        }
        _ => (None, repos_name),
    }
}

/// Returns whether a repository name explicitly carries an index host.
pub fn repository_name_has_index(repos_name: &str) -> bool {
    split_repos_name(repos_name).0.is_some()
}

/// Validates a remote repository name against the v1 grammar.
///
/// Each slash-separated component must be 2-255 characters of lowercase
/// alphanumerics, `.`, `_` or `-`, with no leading, trailing or consecutive
/// hyphens. A bare 64-character hex string is reserved for content IDs.
pub fn validate_remote_name(remote_name: &str) -> Result<()> {
    if remote_name.len() == 64 && remote_name.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(StevedoreError::invalid_repository_name(format!(
            "invalid repository name ({}): 64-character hexadecimal strings are reserved for image IDs",
            remote_name
        )));
    }

    for component in remote_name.split('/') {
        if component.is_empty() {
            return Err(StevedoreError::invalid_repository_name(format!(
                "invalid repository name ({}): empty name component",
                remote_name
            )));
        }
        if component.len() < 2 || component.len() > 255 {
            return Err(StevedoreError::invalid_repository_name(format!(
                "invalid repository name ({}): name components must be between 2 and 255 characters",
                remote_name
            )));
        }
        if component.starts_with('-') || component.ends_with('-') {
            return Err(StevedoreError::invalid_repository_name(format!(
                "invalid repository name ({}): name components cannot begin or end with a hyphen",
                remote_name
            )));
        }
        if component.contains("--") {
            return Err(StevedoreError::invalid_repository_name(format!(
                "invalid repository name ({}): consecutive hyphens are not allowed",
                remote_name
            )));
        }
        if !component
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'))
        {
            return Err(StevedoreError::invalid_repository_name(format!(
                "invalid repository name ({}): only lowercase alphanumerics, '.', '_' and '-' are allowed",
                remote_name
            )));
        }
    }

    Ok(())
}

/// Validates a full repository name, index host included.
pub fn validate_repository_name(repos_name: &str) -> Result<()> {
    if repos_name.contains("://") {
        return Err(StevedoreError::invalid_repository_name(format!(
            "invalid repository name ({}): must not include a scheme",
            repos_name
        )));
    }
    let (_, remote_name) = split_repos_name(repos_name);
    validate_remote_name(remote_name)
}
