//! Stevedore - Container Registry Protocol Library
//!
//! Stevedore implements the classic container registry protocols: v1
//! index/registry sessions with token auth, the v2 content-addressable
//! API, repository name resolution, endpoint probing with an
//! insecure-registry policy, order-independent tar checksums, and
//! multi-registry search aggregation.
//!
//! # Quick Start
//!
//! ```no_run
//! use libstevedore::{Credentials, Service, ServiceConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Service::new(ServiceConfig::default())?;
//!
//! // Resolve a repository name the way the daemon would.
//! let info = service.resolve_repository("ubuntu")?;
//! assert_eq!(info.remote_name, "library/ubuntu");
//!
//! // Search every configured registry.
//! let results = service.search("busybox", &Credentials::anonymous(), false).await?;
//! for result in results {
//!     println!("{}/{}", result.registry_name, result.name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Main Types
//!
//! - [`Service`] - Entry point tying configuration, resolution and search together
//! - [`ServiceConfig`] - Index and insecure-registry configuration
//! - [`RepositoryInfo`] - A resolved repository name
//! - [`Endpoint`] - A probed registry endpoint
//! - [`Session`] - A v1 protocol session
//! - [`TarSum`] - Checksumming pass-through reader for layer uploads
//! - [`Credentials`] - Authentication credentials

#![warn(clippy::all)]

/// Returns the libstevedore crate version.
///
/// # Examples
///
/// ```
/// let version = libstevedore::version();
/// assert!(!version.is_empty());
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// Re-export commonly used types for convenience
pub use auth::Credentials;
pub use config::{IndexInfo, ServiceConfig, ServiceOptions};
pub use endpoint::Endpoint;
pub use error::{Result, StevedoreError};
pub use reference::RepositoryInfo;
pub use search::{SearchResult, SearchResultExt, SearchResults};
pub use service::Service;
pub use session::Session;
pub use tarsum::TarSum;

pub mod auth;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod reference;
pub mod search;
pub mod service;
pub mod session;
pub mod tarsum;
pub mod v2;

// Transport plumbing; public for embedders that follow redirects by hand.
#[doc(hidden)]
pub mod transport;
