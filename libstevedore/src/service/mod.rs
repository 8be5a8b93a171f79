//! High-level registry service.
//!
//! `Service` ties the pieces together: it resolves repository names
//! against the configuration, resolves endpoints, and fans searches out
//! across every configured registry.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error};

use crate::auth::Credentials;
use crate::config::{IndexInfo, ServiceConfig};
use crate::endpoint::{Endpoint, new_http_client};
use crate::error::{Result, StevedoreError};
use crate::reference::{RepositoryInfo, repository_name_has_index, split_repos_name};
use crate::search::{SearchResultExt, SearchResults, compare_results, remove_duplicates};
use crate::session::Session;


/// Default request timeout for service-built HTTP clients.
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// The capability a search task needs from a registry client.
///
/// The v1 session is the only implementation today; the trait is the
/// seam where a v2-backed search would plug in.
pub trait RegistryClient {
    /// Searches the registry for repositories matching a term.
    fn search_repositories(
        &self,
        term: &str,
    ) -> impl Future<Output = Result<SearchResults>> + Send;
}

impl RegistryClient for Session {
    fn search_repositories(
        &self,
        term: &str,
    ) -> impl Future<Output = Result<SearchResults>> + Send {
        Session::search_repositories(self, term)
    }
}

/// Registry operations bound to one configuration.
pub struct Service {
    config: Arc<ServiceConfig>,
    http_client: reqwest::Client,
}

impl Service {
    /// Creates a service over a configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use libstevedore::config::ServiceConfig;
    /// use libstevedore::service::Service;
    ///
    /// let service = Service::new(ServiceConfig::default()).unwrap();
    /// let info = service.resolve_repository("ubuntu").unwrap();
    /// assert_eq!(info.local_name, "docker.io/ubuntu");
    /// ```
    pub fn new(config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            config: Arc::new(config),
            http_client: new_http_client(DEFAULT_TIMEOUT_SECONDS)?,
        })
    }

    /// The configuration this service was built over.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Resolves a repository name against the configuration.
    pub fn resolve_repository(&self, name: &str) -> Result<RepositoryInfo> {
        RepositoryInfo::parse(&self.config, name)
    }

    /// Resolves an index name (or a repository name carrying one).
    pub fn resolve_index(&self, name: &str) -> Result<IndexInfo> {
        let (index_name, _) = split_repos_name(name);
        self.config.new_index_info(index_name.unwrap_or(name))
    }

    /// Searches for repositories across the configured registries.
    ///
    /// A term that embeds an index host queries only that index. An
    /// unqualified term fans out one task per entry in `registry_list`;
    /// entries past the first are queried with the term qualified by the
    /// registry host. The search succeeds if at least one task did,
    /// otherwise the last error wins. Results are sorted and, when
    /// `no_index` hides the index column, de-duplicated.
    pub async fn search(
        &self,
        term: &str,
        credentials: &Credentials,
        no_index: bool,
    ) -> Result<Vec<SearchResultExt>> {
        let mut results = if repository_name_has_index(term) {
            self.search_term(term, credentials).await?
        } else {
            if self.config.registry_list.is_empty() {
                return Err(StevedoreError::validation(
                    "no configured registry to search",
                ));
            }

            let tasks = self.config.registry_list.iter().enumerate().map(|(i, registry)| {
                let term = if i > 0 {
                    format!("{}/{}", registry, term)
                } else {
                    term.to_string()
                };
                async move { self.search_term(&term, credentials).await }
            });

            let mut combined = Vec::new();
            let mut succeeded = false;
            let mut last_error = None;
            for outcome in join_all(tasks).await {
                match outcome {
                    Ok(found) => {
                        succeeded = true;
                        combined.extend(found);
                    }
                    Err(e) => {
                        error!(error = %e, "registry search failed");
                        last_error = Some(e);
                    }
                }
            }
            // A registry that answered with zero hits still counts as a
            // successful search; only a full wipeout surfaces an error.
            if !succeeded && let Some(e) = last_error {
                return Err(e);
            }
            combined
        };

        results.sort_by(|a, b| compare_results(a, b, !no_index));
        if no_index {
            results = remove_duplicates(results, &self.config.registry_list);
        }
        Ok(results)
    }

    /// Searches the single index a term resolves to.
    async fn search_term(
        &self,
        term: &str,
        credentials: &Credentials,
    ) -> Result<Vec<SearchResultExt>> {
        let repo_info = self.resolve_repository(term)?;
        debug!(index = %repo_info.index.name, term = %repo_info.get_search_term(), "searching index");

        let endpoint = Endpoint::resolve(&repo_info.index, &self.http_client).await?;
        let session = Session::new(self.http_client.clone(), endpoint, credentials.clone())?;
        search_with_client(&session, &repo_info.get_search_term(), &repo_info.index.name).await
    }
}

/// Runs one search against a client and tags the results with their
/// source index. A result name qualified with a registry host is split
/// so `registry_name` and `name` stay separate columns.
pub async fn search_with_client<C: RegistryClient>(
    client: &C,
    term: &str,
    index_name: &str,
) -> Result<Vec<SearchResultExt>> {
    let results = client.search_repositories(term).await?;
    if results.num_results < 1 {
        return Ok(Vec::new());
    }

    Ok(results
        .results
        .into_iter()
        .map(|result| {
            let (registry_name, name) = match split_repos_name(&result.name) {
                (Some(registry), name) => (registry.to_string(), name.to_string()),
                (None, name) => (index_name.to_string(), name.to_string()),
            };
            SearchResultExt {
                index_name: index_name.to_string(),
                registry_name,
                star_count: result.star_count,
                is_official: result.is_official,
                name,
                is_trusted: result.is_trusted,
                is_automated: result.is_automated,
                description: result.description,
            }
        })
        .collect())
}
