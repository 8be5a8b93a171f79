//! V2 protocol: route templates and the content-addressable client.
//!
//! V2 registries address layers by checksum instead of image id. Paths
//! are built from a small route table of URL templates rather than by
//! string concatenation, so client and server agree on the shape of
//! every route.

use std::collections::HashMap;
use std::io::Read;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::endpoint::{ApiVersion, Endpoint};
use crate::error::{Result, StevedoreError};

#[cfg(test)]
mod tests;

/// A URL path template with `{key}` or `{key:regex}` placeholders.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use libstevedore::v2::HttpRoute;
///
/// let route = HttpRoute::new("/path/{foo}/here");
/// let path = route.format(&HashMap::from([("foo", "to")])).unwrap();
/// assert_eq!(path, "/path/to/here");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpRoute {
    template: &'static str,
}

impl HttpRoute {
    /// Wraps a path template.
    pub const fn new(template: &'static str) -> Self {
        Self { template }
    }

    /// The raw template string.
    pub fn template(&self) -> &'static str {
        self.template
    }

    /// The placeholder keys in template order, regex parts stripped.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        let mut rest = self.template;
        while let Some(open) = rest.find('{') {
            let Some(close) = matching_brace(&rest[open..]) else {
                break;
            };
            let inner = &rest[open + 1..open + close];
            keys.push(inner.split(':').next().unwrap_or(inner));
            rest = &rest[open + close + 1..];
        }
        keys
    }

    /// Substitutes placeholder values into the template.
    ///
    /// A placeholder with no matching entry in `vars` is emitted literally
    /// as `{key}`. A rest-of-path placeholder (regex part `.*`) may only
    /// appear in final position, since it would swallow the rest of the
    /// template anywhere else.
    pub fn format(&self, vars: &HashMap<&str, &str>) -> Result<String> {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let Some(close) = matching_brace(&rest[open..]) else {
                out.push_str(&rest[open..]);
                return Ok(out);
            };

            let inner = &rest[open + 1..open + close];
            let (key, pattern) = match inner.split_once(':') {
                Some((key, pattern)) => (key, Some(pattern)),
                None => (inner, None),
            };
            rest = &rest[open + close + 1..];

            if pattern == Some(".*") && !rest.is_empty() {
                return Err(StevedoreError::validation(format!(
                    "route template {}: rest-of-path placeholder {{{}}} must be last",
                    self.template, key
                )));
            }

            match vars.get(key) {
                Some(value) => out.push_str(value),
                None => {
                    out.push('{');
                    out.push_str(key);
                    out.push('}');
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Index of the brace closing the one at the start of `s`, honoring
/// nested braces inside regex parts like `{4,}`.
fn matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in s.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Version info route.
pub const VERSION_ROUTE: HttpRoute = HttpRoute::new("/v2/version");
/// Image manifest route.
pub const MANIFESTS_ROUTE: HttpRoute =
    HttpRoute::new("/v2/manifest/{imagename:[a-z0-9-._/]+}/{tagname:[a-zA-Z0-9-._]+}");
/// Tag list route.
pub const TAGS_ROUTE: HttpRoute = HttpRoute::new("/v2/tags/{imagename:[a-z0-9-._/]+}");
/// Blob download route.
pub const DOWNLOAD_BLOB_ROUTE: HttpRoute = HttpRoute::new(
    "/v2/blob/{imagename:[a-z0-9-._/]+}/{sumtype:[a-z0-9_+-]+}/{sum:[a-fA-F0-9]{4,}}",
);
/// Blob upload route.
pub const UPLOAD_BLOB_ROUTE: HttpRoute =
    HttpRoute::new("/v2/blob/{imagename:[a-z0-9-._/]+}/{sumtype:[a-z0-9_+-]+}");
/// Blob mount route.
pub const MOUNT_BLOB_ROUTE: HttpRoute = HttpRoute::new(
    "/v2/mountblob/{imagename:[a-z0-9-._/]+}/{sumtype:[a-z0-9_+-]+}/{sum:[a-fA-F0-9]{4,}}",
);

/// Version and standalone info advertised by a v2 registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryInfo {
    /// Registry server version.
    #[serde(rename = "version", default)]
    pub version: Option<String>,
    /// Whether the registry serves without a separate index.
    #[serde(rename = "standalone", default)]
    pub standalone: bool,
}

/// Outcome of asking the registry to mount an existing blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobMount {
    /// The registry already has the blob; no upload needed.
    AlreadyPresent,
    /// The blob is unknown for this image scope; upload it.
    NeedsUpload,
}

/// A client against a v2 endpoint.
#[derive(Debug)]
pub struct Client {
    http_client: reqwest::Client,
    endpoint: Endpoint,
    token: Option<String>,
}

impl Client {
    /// Binds a client to a v2 endpoint with an optional session token.
    pub fn new(
        http_client: reqwest::Client,
        endpoint: Endpoint,
        token: Option<String>,
    ) -> Result<Self> {
        if endpoint.version != ApiVersion::V2 {
            return Err(StevedoreError::incorrect_api_version(format!(
                "v2 client requires a v2 endpoint, got {}",
                endpoint
            )));
        }
        Ok(Self {
            http_client,
            endpoint,
            token,
        })
    }

    fn route_url(&self, route: HttpRoute, vars: &HashMap<&str, &str>) -> Result<String> {
        let path = route.format(vars)?;
        let url = self.endpoint.url.join(&path).map_err(|e| {
            StevedoreError::validation_with_source(
                format!("unable to build registry route {}", path),
                e,
            )
        })?;
        Ok(url.to_string())
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Token {}", token)),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<reqwest::Response> {
        self.authorized(builder).send().await.map_err(|e| {
            StevedoreError::network_with_source(format!("error {}", context), e)
        })
    }

    /// Fetches the registry's version info.
    pub async fn get_version(&self) -> Result<RegistryInfo> {
        let url = self.route_url(VERSION_ROUTE, &HashMap::new())?;
        debug!(url = %url, "fetching v2 registry version");

        let response = self.send(self.http_client.get(&url), "fetching version").await?;
        let response = check_status(response, "fetching version", &[StatusCode::OK]).await?;

        response.json().await.map_err(|e| {
            StevedoreError::validation_with_source("failed to parse version response", e)
        })
    }

    /// Fetches the raw manifest for an image and tag.
    pub async fn get_manifest(&self, image_name: &str, tag_name: &str) -> Result<Vec<u8>> {
        let url = self.route_url(
            MANIFESTS_ROUTE,
            &HashMap::from([("imagename", image_name), ("tagname", tag_name)]),
        )?;
        debug!(url = %url, "fetching manifest");

        let response = self.send(self.http_client.get(&url), "fetching manifest").await?;
        let response = check_status(response, "fetching manifest", &[StatusCode::OK]).await?;

        let body = response.bytes().await.map_err(|e| {
            StevedoreError::network_with_source("failed to read manifest body", e)
        })?;
        Ok(body.to_vec())
    }

    /// Uploads a signed manifest for an image and tag.
    pub async fn put_manifest(
        &self,
        image_name: &str,
        tag_name: &str,
        manifest: &[u8],
    ) -> Result<()> {
        let url = self.route_url(
            MANIFESTS_ROUTE,
            &HashMap::from([("imagename", image_name), ("tagname", tag_name)]),
        )?;
        debug!(url = %url, "pushing manifest");

        let request = self.http_client.put(&url).body(manifest.to_vec());
        let response = self.send(request, "pushing manifest").await?;
        check_status(
            response,
            "pushing manifest",
            &[StatusCode::OK, StatusCode::CREATED],
        )
        .await?;
        Ok(())
    }

    /// Deletes the manifest for an image and tag.
    pub async fn delete_manifest(&self, image_name: &str, tag_name: &str) -> Result<()> {
        let url = self.route_url(
            MANIFESTS_ROUTE,
            &HashMap::from([("imagename", image_name), ("tagname", tag_name)]),
        )?;
        debug!(url = %url, "deleting manifest");

        let response = self.send(self.http_client.delete(&url), "deleting manifest").await?;
        check_status(response, "deleting manifest", &[StatusCode::OK]).await?;
        Ok(())
    }

    /// Lists the tags of an image.
    pub async fn get_tags(&self, image_name: &str) -> Result<Vec<String>> {
        let url = self.route_url(TAGS_ROUTE, &HashMap::from([("imagename", image_name)]))?;
        debug!(url = %url, "listing tags");

        let response = self.send(self.http_client.get(&url), "listing tags").await?;
        let response = check_status(response, "listing tags", &[StatusCode::OK]).await?;

        #[derive(Deserialize)]
        struct TagList {
            #[serde(default)]
            tags: Vec<String>,
        }
        let list: TagList = response.json().await.map_err(|e| {
            StevedoreError::validation_with_source("failed to parse tag list", e)
        })?;
        Ok(list.tags)
    }

    /// Asks the registry to mount a blob it may already have.
    ///
    /// 200 means the blob exists for this image scope; 300 means it does
    /// not and should be uploaded. Any other status is a hard error.
    pub async fn mount_blob(
        &self,
        image_name: &str,
        sum_type: &str,
        sum: &str,
    ) -> Result<BlobMount> {
        let url = self.route_url(
            MOUNT_BLOB_ROUTE,
            &HashMap::from([("imagename", image_name), ("sumtype", sum_type), ("sum", sum)]),
        )?;
        debug!(url = %url, "mounting blob");

        let response = self.send(self.http_client.post(&url), "mounting blob").await?;
        match response.status() {
            StatusCode::OK => Ok(BlobMount::AlreadyPresent),
            StatusCode::MULTIPLE_CHOICES => Ok(BlobMount::NeedsUpload),
            StatusCode::UNAUTHORIZED => Err(StevedoreError::LoginRequired),
            status => Err(StevedoreError::registry_http(
                format!(
                    "failed to mount {} - {}:{} : HTTP {}",
                    image_name,
                    sum_type,
                    sum,
                    status.as_u16()
                ),
                status.as_u16(),
            )),
        }
    }

    /// Downloads a blob by checksum.
    pub async fn get_blob(&self, image_name: &str, sum_type: &str, sum: &str) -> Result<Vec<u8>> {
        let url = self.route_url(
            DOWNLOAD_BLOB_ROUTE,
            &HashMap::from([("imagename", image_name), ("sumtype", sum_type), ("sum", sum)]),
        )?;
        debug!(url = %url, "downloading blob");

        let response = self.send(self.http_client.get(&url), "downloading blob").await?;
        let response = check_status(response, "downloading blob", &[StatusCode::OK]).await?;

        let body = response.bytes().await.map_err(|e| {
            StevedoreError::network_with_source("failed to read blob body", e)
        })?;
        Ok(body.to_vec())
    }

    /// Uploads a blob and cross-checks the server's checksum.
    ///
    /// The registry computes its own checksum of the received bytes and
    /// returns it as `{"checksum": ...}`. A mismatch against the checksum
    /// the caller expects means the upload was corrupted somewhere and is
    /// a hard failure.
    pub async fn put_blob<R: Read>(
        &self,
        image_name: &str,
        sum_type: &str,
        blob: R,
        expected_checksum: &str,
    ) -> Result<String> {
        let url = self.route_url(
            UPLOAD_BLOB_ROUTE,
            &HashMap::from([("imagename", image_name), ("sumtype", sum_type)]),
        )?;

        let mut body = Vec::new();
        let mut blob = blob;
        blob.read_to_end(&mut body)
            .map_err(|e| StevedoreError::validation_with_source("failed to read blob", e))?;
        debug!(url = %url, bytes = body.len(), "uploading blob");

        let request = self.http_client.put(&url).body(body);
        let response = self.send(request, "uploading blob").await?;
        let response = check_status(
            response,
            "uploading blob",
            &[StatusCode::OK, StatusCode::CREATED],
        )
        .await?;

        #[derive(Deserialize)]
        struct SumReturn {
            checksum: String,
        }
        let sum: SumReturn = response.json().await.map_err(|e| {
            StevedoreError::validation_with_source("failed to parse blob upload response", e)
        })?;

        if sum.checksum != expected_checksum {
            return Err(StevedoreError::validation(format!(
                "blob checksum mismatch for {}: expected {}, registry computed {}",
                image_name, expected_checksum, sum.checksum
            )));
        }
        Ok(sum.checksum)
    }
}

async fn check_status(
    response: reqwest::Response,
    context: &str,
    accept: &[StatusCode],
) -> Result<reqwest::Response> {
    let status = response.status();
    if accept.contains(&status) {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(StevedoreError::LoginRequired);
    }

    let url = response.url().to_string();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("(unable to read response body)"));
    Err(StevedoreError::registry_http(
        format!("error {} at {}: HTTP {}: {}", context, url, status.as_u16(), body),
        status.as_u16(),
    ))
}
