//! Search result types, ordering and duplicate removal.
//!
//! Raw results come from each index in its own wire format; the service
//! layer annotates them with the index and registry they were found in,
//! sorts the combined list, and collapses entries that name the same
//! repository on the same registry.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};


/// A single result as returned by an index's search API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Number of stars the repository has on the index.
    #[serde(rename = "star_count", default)]
    pub star_count: i32,
    /// Whether the repository is an official one.
    #[serde(rename = "is_official", default)]
    pub is_official: bool,
    /// Repository name, possibly qualified with a registry host.
    #[serde(rename = "name")]
    pub name: String,
    /// Whether the repository is signed.
    #[serde(rename = "is_trusted", default)]
    pub is_trusted: bool,
    /// Whether the repository is built automatically.
    #[serde(rename = "is_automated", default)]
    pub is_automated: bool,
    /// Short repository description.
    #[serde(rename = "description", default)]
    pub description: String,
}

/// The wire envelope of an index search response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Total number of matches on the index.
    #[serde(rename = "num_results")]
    pub num_results: i32,
    /// The query the index answered.
    #[serde(rename = "query")]
    pub query: String,
    /// The matches themselves.
    #[serde(rename = "results")]
    pub results: Vec<SearchResult>,
}

/// A search result annotated with where it was found.
///
/// `index_name` is the index that answered the query; `registry_name` is
/// the registry hosting the repository, which differs when the index
/// returns names qualified with another registry's host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultExt {
    #[serde(rename = "index_name")]
    pub index_name: String,
    #[serde(rename = "registry_name")]
    pub registry_name: String,
    #[serde(rename = "star_count")]
    pub star_count: i32,
    #[serde(rename = "is_official")]
    pub is_official: bool,
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "is_trusted")]
    pub is_trusted: bool,
    #[serde(rename = "is_automated")]
    pub is_automated: bool,
    #[serde(rename = "description")]
    pub description: String,
}

/// Orders combined results for display.
///
/// With `with_index` set, results group by index first and rank by stars
/// within each index; otherwise they group by registry. Name and
/// description break the remaining ties so the order is deterministic.
pub fn compare_results(a: &SearchResultExt, b: &SearchResultExt, with_index: bool) -> Ordering {
    if with_index {
        match a.index_name.cmp(&b.index_name) {
            Ordering::Equal => {}
            other => return other,
        }
        match b.star_count.cmp(&a.star_count) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    match a.registry_name.cmp(&b.registry_name) {
        Ordering::Equal => {}
        other => return other,
    }
    if !with_index {
        match b.star_count.cmp(&a.star_count) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    match a.name.cmp(&b.name) {
        Ordering::Equal => {}
        other => return other,
    }
    a.description.cmp(&b.description)
}

/// Collapses adjacent entries naming the same repository on the same
/// registry. Expects the input to be sorted with [`compare_results`].
///
/// When two entries collide, the one whose index appears earlier in
/// `registry_list` wins; at equal priority the higher star count wins.
pub fn remove_duplicates(
    data: Vec<SearchResultExt>,
    registry_list: &[String],
) -> Vec<SearchResultExt> {
    let priority = |index_name: &str| {
        registry_list
            .iter()
            .position(|r| r == index_name)
            .unwrap_or(registry_list.len())
    };

    let mut result: Vec<SearchResultExt> = Vec::with_capacity(data.len());
    for current in data {
        match result.last_mut() {
            Some(prev)
                if prev.registry_name == current.registry_name && prev.name == current.name =>
            {
                let prio_prev = priority(&prev.index_name);
                let prio_curr = priority(&current.index_name);
                if prio_prev > prio_curr
                    || (prio_prev == prio_curr && prev.star_count < current.star_count)
                {
                    *prev = current;
                }
            }
            _ => result.push(current),
        }
    }
    result
}
