//! Registry endpoint resolution.
//!
//! An endpoint is a concrete base URL for a registry, with an API version
//! and a scheme decided by the security classification of its index. The
//! resolver probes `_ping` to confirm reachability and, for indexes marked
//! insecure, falls back from https to http. Secure indexes never downgrade.

use std::fmt;
use std::time::Duration;

use reqwest::redirect::Policy;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::{INDEX_SERVER_ADDRESS, IndexInfo};
use crate::error::{Result, StevedoreError};

#[cfg(test)]
mod tests;

/// Registry API versions addressable through an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiVersion {
    /// The original index/registry protocol.
    #[default]
    V1,
    /// The content-addressable protocol.
    V2,
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiVersion::V1 => write!(f, "v1"),
            ApiVersion::V2 => write!(f, "v2"),
        }
    }
}

/// Strips a trailing API-version path segment from an address.
///
/// `example.com/path/v2` becomes `("example.com/path", Some(V2))`; an
/// address without a recognized trailing segment is returned unchanged.
pub fn scan_for_api_version(address: &str) -> (&str, Option<ApiVersion>) {
    let trimmed = address.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((rest, "v1")) => (rest, Some(ApiVersion::V1)),
        Some((rest, "v2")) => (rest, Some(ApiVersion::V2)),
        _ => (trimmed, None),
    }
}

/// The result of probing a registry's `_ping` endpoint.
///
/// Registries that omit the version header or return an unreadable body
/// are still accepted; absent fields take permissive defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PingResult {
    /// Registry server version, if advertised.
    #[serde(rename = "version", default)]
    pub version: Option<String>,
    /// Whether the registry serves content without a separate index.
    #[serde(rename = "standalone", default = "default_standalone")]
    pub standalone: bool,
}

fn default_standalone() -> bool {
    true
}

impl Default for PingResult {
    fn default() -> Self {
        Self {
            version: None,
            standalone: true,
        }
    }
}

/// A resolved registry endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Base URL, scheme and host only.
    pub url: Url,
    /// API version this endpoint speaks.
    pub version: ApiVersion,
    /// Whether the endpoint's index is classified secure.
    pub is_secure: bool,
}

impl Endpoint {
    /// Builds an endpoint from an address without probing it.
    ///
    /// An explicit `http://` scheme on a secure index is rejected with an
    /// `InsecureRegistry` error; an address without a scheme defaults to
    /// https. A trailing `/v1` or `/v2` path segment selects the API
    /// version, which otherwise defaults to v1.
    ///
    /// # Examples
    ///
    /// ```
    /// use libstevedore::endpoint::Endpoint;
    ///
    /// let endpoint = Endpoint::new("0.0.0.0:5000", false).unwrap();
    /// assert_eq!(endpoint.to_string(), "https://0.0.0.0:5000/v1/");
    ///
    /// let endpoint = Endpoint::new("http://0.0.0.0:5000/v2", false).unwrap();
    /// assert_eq!(endpoint.to_string(), "http://0.0.0.0:5000/v2/");
    /// ```
    pub fn new(address: &str, is_secure: bool) -> Result<Self> {
        let address = address.trim_end_matches('/');

        let (stripped, scheme) = if let Some(rest) = address.strip_prefix("https://") {
            (rest, "https")
        } else if let Some(rest) = address.strip_prefix("http://") {
            if is_secure {
                return Err(StevedoreError::insecure_registry(format!(
                    "invalid registry endpoint {}: this registry is configured as secure. \
                     If it supports only HTTP, add it to the insecure-registry list",
                    address
                )));
            }
            (rest, "http")
        } else {
            (address, "https")
        };

        let (host, version) = scan_for_api_version(stripped);
        let url = Url::parse(&format!("{}://{}", scheme, host)).map_err(|e| {
            StevedoreError::validation_with_source(
                format!("invalid registry endpoint address: {}", address),
                e,
            )
        })?;

        Ok(Self {
            url,
            version: version.unwrap_or_default(),
            is_secure,
        })
    }

    /// True when this endpoint addresses the official index server.
    pub fn is_official_index(&self) -> bool {
        self.to_string() == INDEX_SERVER_ADDRESS
    }

    /// Probes the endpoint's `_ping` route.
    ///
    /// The official index does not implement `_ping`; it is reported as
    /// `standalone: false` without a request. All other failures to parse
    /// the response are tolerated: defaults are `{standalone: true}`, and
    /// the `X-Docker-Registry-Version` / `X-Docker-Registry-Standalone`
    /// headers override whatever the body carried.
    pub async fn ping(&self, http_client: &reqwest::Client) -> Result<PingResult> {
        if self.is_official_index() {
            return Ok(PingResult {
                version: None,
                standalone: false,
            });
        }

        let url = format!("{}_ping", self);
        debug!(url = %url, "pinging registry endpoint");

        let response = http_client.get(&url).send().await.map_err(|e| {
            StevedoreError::network_with_source(
                format!("error pinging registry endpoint {}", url),
                e,
            )
        })?;

        let headers = response.headers().clone();
        let mut result = match response.bytes().await {
            Ok(body) => serde_json::from_slice::<PingResult>(&body).unwrap_or_else(|e| {
                warn!(url = %url, error = %e, "unparseable ping response body, assuming standalone");
                PingResult::default()
            }),
            Err(e) => {
                warn!(url = %url, error = %e, "error reading ping response body, assuming standalone");
                PingResult::default()
            }
        };

        if let Some(version) = headers
            .get("X-Docker-Registry-Version")
            .and_then(|v| v.to_str().ok())
        {
            result.version = Some(version.to_string());
        }
        if let Some(standalone) = headers
            .get("X-Docker-Registry-Standalone")
            .and_then(|v| v.to_str().ok())
        {
            result.standalone = standalone.eq_ignore_ascii_case("true") || standalone == "1";
        }

        debug!(url = %url, ?result, "registry ping complete");
        Ok(result)
    }

    /// Resolves an index into a reachable endpoint.
    ///
    /// The official index resolves to the index server address directly.
    /// Other indexes are probed over https first; when the probe fails and
    /// the index is insecure, http is tried next. A secure index whose
    /// https probe fails surfaces an `InsecureRegistry` error rather than
    /// silently downgrading.
    pub async fn resolve(index: &IndexInfo, http_client: &reqwest::Client) -> Result<Self> {
        let address = if index.official {
            INDEX_SERVER_ADDRESS.to_string()
        } else {
            index.name.clone()
        };

        let endpoint = Self::new(&address, index.secure)?;
        match endpoint.ping(http_client).await {
            Ok(_) => Ok(endpoint),
            Err(https_err) if !index.secure && endpoint.url.scheme() == "https" => {
                debug!(
                    index = %index.name,
                    error = %https_err,
                    "https ping failed for insecure index, retrying over http"
                );
                let fallback = Self::new(&format!("http://{}", address), false)?;
                fallback.ping(http_client).await?;
                Ok(fallback)
            }
            Err(e) if index.secure => Err(StevedoreError::insecure_registry(format!(
                "unable to ping registry endpoint {} over https: {}. \
                 If this private registry supports only HTTP or HTTPS with an unknown \
                 CA certificate, add it to the insecure-registry list",
                endpoint, e
            ))),
            Err(e) => Err(e),
        }
    }
}

/// The endpoint renders as `scheme://host/vN/`, ready for path suffixes.
impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.url.as_str().trim_end_matches('/');
        write!(f, "{}/{}/", base, self.version)
    }
}

/// Builds the HTTP client used for registry traffic.
///
/// Redirects are disabled; sessions follow them by hand so that
/// authorization headers can be scrubbed when a redirect leaves trusted
/// territory.
pub fn new_http_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .redirect(Policy::none())
        .build()
        .map_err(|e| StevedoreError::network_with_source("failed to create HTTP client", e))
}
