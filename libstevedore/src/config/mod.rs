//! Registry trust configuration.
//!
//! This module holds the process-wide registry configuration: the official
//! index, the insecure-registry list (hostnames and CIDR blocks), content
//! mirrors, and the ordered list of registries consulted by search. The
//! configuration is built once at process start and shared read-only; there
//! are no package-level singletons.

use crate::error::{Result, StevedoreError};
use config::{Config as ConfigRs, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;
use url::Url;


/// Name of the official index.
pub const INDEX_NAME: &str = "docker.io";

/// Full address of the official index server.
pub const INDEX_SERVER_ADDRESS: &str = "https://index.docker.io/v1/";

/// Resolved trust information for one index.
///
/// Immutable once resolved for a given configuration generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    /// Index name, `host[:port]` form.
    pub name: String,
    /// Content mirrors declared for this index, in preference order.
    pub mirrors: Vec<String>,
    /// Whether connections to this index must use TLS.
    pub secure: bool,
    /// True only for the single well-known default index.
    pub official: bool,
}

/// Raw options the configuration is built from, as supplied by the
/// embedding application or a YAML file.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ServiceOptions {
    /// Mirrors of the official index.
    #[serde(default)]
    pub mirrors: Vec<String>,
    /// Hosts or CIDR blocks allowed to use plain HTTP.
    #[serde(default)]
    pub insecure_registries: Vec<String>,
    /// Additional registries to consult on search, highest priority first.
    #[serde(default)]
    pub registries: Vec<String>,
}

impl ServiceOptions {
    /// Parses options from a YAML string.
    ///
    /// This function is primarily used for testing.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let builder = ConfigRs::builder()
            .add_source(ConfigRs::try_from(&ServiceOptions::default())?)
            .add_source(File::from_str(s, FileFormat::Yaml));

        Self::from_builder(builder)
    }

    /// Loads options from an optional file path.
    ///
    /// If the path is `None`, defaults are returned.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            ConfigRs::builder().add_source(ConfigRs::try_from(&ServiceOptions::default())?);

        if let Some(p) = path {
            builder = builder.add_source(File::from(p).required(true));
        }

        Self::from_builder(builder)
    }

    fn from_builder(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        builder
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|e| {
                StevedoreError::config_with_source("Failed to deserialize configuration", None, e)
            })
    }
}

/// An IPv4 network in CIDR notation, used for insecure-registry matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ipv4Cidr {
    base: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    fn parse(s: &str) -> Option<Self> {
        let (addr, len) = s.split_once('/')?;
        let base: Ipv4Addr = addr.parse().ok()?;
        let prefix_len: u8 = len.parse().ok()?;
        if prefix_len > 32 {
            return None;
        }
        Some(Self { base, prefix_len })
    }

    fn contains(&self, ip: Ipv4Addr) -> bool {
        let mask = if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix_len)
        };
        (u32::from(self.base) & mask) == (u32::from(ip) & mask)
    }
}

/// Process-wide registry configuration.
///
/// Constructed once from [`ServiceOptions`] and passed by reference into
/// every resolver and aggregator call.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    insecure_registry_cidrs: Vec<Ipv4Cidr>,
    index_configs: HashMap<String, IndexInfo>,
    /// Registries consulted by search, in priority order (earlier wins).
    pub registry_list: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new(&ServiceOptions::default()).expect("default options are valid")
    }
}

impl ServiceConfig {
    /// Builds the configuration from raw options.
    ///
    /// # Examples
    ///
    /// ```
    /// use libstevedore::config::{ServiceConfig, ServiceOptions};
    ///
    /// let options = ServiceOptions {
    ///     insecure_registries: vec!["registry.local:5000".to_string()],
    ///     ..Default::default()
    /// };
    /// let config = ServiceConfig::new(&options).unwrap();
    /// assert!(!config.is_secure_index("registry.local:5000"));
    /// ```
    pub fn new(options: &ServiceOptions) -> Result<Self> {
        // Loopback hosts are insecure unless configured otherwise.
        let mut insecure_registry_cidrs = vec![Ipv4Cidr {
            base: Ipv4Addr::new(127, 0, 0, 0),
            prefix_len: 8,
        }];
        let mut index_configs = HashMap::new();

        for entry in &options.insecure_registries {
            if let Some(cidr) = Ipv4Cidr::parse(entry) {
                insecure_registry_cidrs.push(cidr);
            } else {
                let name = validate_index_name(entry)?;
                index_configs.insert(
                    name.clone(),
                    IndexInfo {
                        name,
                        mirrors: Vec::new(),
                        secure: false,
                        official: false,
                    },
                );
            }
        }

        let mut mirrors = Vec::with_capacity(options.mirrors.len());
        for mirror in &options.mirrors {
            mirrors.push(validate_mirror(mirror)?);
        }

        // The official index is always secure; insecure entries cannot
        // override it.
        index_configs.insert(
            INDEX_NAME.to_string(),
            IndexInfo {
                name: INDEX_NAME.to_string(),
                mirrors,
                secure: true,
                official: true,
            },
        );

        let mut registry_list = Vec::new();
        for registry in &options.registries {
            let name = validate_index_name(registry)?;
            if !registry_list.contains(&name) {
                registry_list.push(name);
            }
        }
        if !registry_list.contains(&INDEX_NAME.to_string()) {
            registry_list.push(INDEX_NAME.to_string());
        }

        Ok(Self {
            insecure_registry_cidrs,
            index_configs,
            registry_list,
        })
    }

    /// Returns whether the named index must be reached over TLS.
    ///
    /// An index is insecure when it matches a configured insecure-registry
    /// entry exactly (including any port), or when its host is an IPv4
    /// literal (or `localhost`) contained in a configured CIDR block.
    /// Unrecognized hostnames default to secure.
    pub fn is_secure_index(&self, index_name: &str) -> bool {
        if let Some(index) = self.index_configs.get(index_name) {
            return index.secure;
        }

        let host = index_name
            .rsplit_once(':')
            .map(|(h, _)| h)
            .unwrap_or(index_name);
        let ip = if host == "localhost" {
            Some(Ipv4Addr::LOCALHOST)
        } else {
            host.parse::<Ipv4Addr>().ok()
        };
        if let Some(ip) = ip {
            return !self
                .insecure_registry_cidrs
                .iter()
                .any(|cidr| cidr.contains(ip));
        }

        true
    }

    /// Resolves the trust information for an index name.
    ///
    /// `index.docker.io` and the bare official name both resolve to the
    /// official index; anything else resolves to a non-official entry
    /// classified by [`ServiceConfig::is_secure_index`].
    pub fn new_index_info(&self, index_name: &str) -> Result<IndexInfo> {
        let name = validate_index_name(index_name)?;

        if let Some(index) = self.index_configs.get(&name) {
            return Ok(index.clone());
        }

        Ok(IndexInfo {
            secure: self.is_secure_index(&name),
            name,
            mirrors: Vec::new(),
            official: false,
        })
    }
}

/// Validates and normalizes an index name.
///
/// The `index.` prefix of the official index is stripped so both spellings
/// resolve identically.
pub fn validate_index_name(name: &str) -> Result<String> {
    let name = if name == "index.docker.io" {
        INDEX_NAME
    } else {
        name
    };
    if name.starts_with('-') || name.ends_with('-') {
        return Err(StevedoreError::invalid_repository_name(format!(
            "invalid index name ({}): cannot begin or end with a hyphen",
            name
        )));
    }
    Ok(name.to_string())
}

/// Validates a mirror URL, normalizing it to end with a single `/`.
pub fn validate_mirror(mirror: &str) -> Result<String> {
    let url = Url::parse(mirror).map_err(|e| {
        StevedoreError::config_with_source(format!("invalid mirror url {}", mirror), None, e)
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(StevedoreError::config(
            format!("invalid mirror url {}: unsupported scheme", mirror),
            None,
        ));
    }
    if !matches!(url.path(), "" | "/") || url.query().is_some() || url.fragment().is_some() {
        return Err(StevedoreError::config(
            format!("invalid mirror url {}: path not allowed", mirror),
            None,
        ));
    }
    Ok(format!("{}/", mirror.trim_end_matches('/')))
}
