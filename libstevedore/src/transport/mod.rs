//! Redirect handling with credential scrubbing.
//!
//! Layer downloads are frequently redirected to CDNs or object stores.
//! Following a redirect must not leak registry credentials to arbitrary
//! hosts, so redirects are followed by hand: headers are carried over in
//! full only between trusted locations, and authorization material is
//! stripped everywhere else.

use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Method, Request, Response};
use tracing::debug;
use url::Url;

use crate::error::{Result, StevedoreError};


const MAX_REDIRECTS: usize = 10;

/// Hosts that may receive full request headers on redirect.
const TRUSTED_HOSTS: [&str; 2] = ["docker.com", "docker.io"];

/// Whether a URL is a trusted location for credential forwarding.
///
/// Only https URLs on the trusted hosts or their subdomains qualify.
pub fn trusted_location(url: &Url) -> bool {
    if url.scheme() != "https" {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    TRUSTED_HOSTS
        .iter()
        .any(|trusted| host == *trusted || host.ends_with(&format!(".{}", trusted)))
}

/// Computes the headers a redirected request may carry.
///
/// Between two trusted locations everything is forwarded. Otherwise
/// `Authorization`, `X-Docker-Token` and `Accept` are dropped and the
/// remaining headers pass through.
pub fn redirect_headers(from: &Url, to: &Url, headers: &HeaderMap) -> HeaderMap {
    if trusted_location(from) && trusted_location(to) {
        return headers.clone();
    }

    let mut scrubbed = headers.clone();
    scrubbed.remove("Authorization");
    scrubbed.remove("X-Docker-Token");
    scrubbed.remove("Accept");
    scrubbed
}

/// Executes a request, following redirects with header scrubbing.
///
/// Each hop re-issues a GET with headers filtered by [`redirect_headers`]
/// against the original request's URL. Gives up after ten hops.
pub async fn follow_redirects(http_client: &reqwest::Client, request: Request) -> Result<Response> {
    let original_url = request.url().clone();
    let original_headers = request.headers().clone();

    let mut current = request;
    for _ in 0..=MAX_REDIRECTS {
        let url = current.url().to_string();
        let response = http_client.execute(current).await.map_err(|e| {
            StevedoreError::network_with_source(format!("error requesting {}", url), e)
        })?;

        if !response.status().is_redirection() {
            return Ok(response);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                StevedoreError::network(format!("redirect from {} without a Location header", url))
            })?;
        let next_url = response.url().join(location).map_err(|e| {
            StevedoreError::network_with_source(
                format!("invalid redirect location from {}: {}", url, location),
                e,
            )
        })?;

        debug!(from = %url, to = %next_url, "following registry redirect");

        let mut next = Request::new(Method::GET, next_url.clone());
        *next.headers_mut() = redirect_headers(&original_url, &next_url, &original_headers);
        current = next;
    }

    Err(StevedoreError::network(format!(
        "too many redirects requesting {}",
        original_url
    )))
}
