//! V1 index/registry protocol session.
//!
//! A session speaks the original registry protocol: repository metadata
//! lives on the index, image data on one or more registry mirrors the
//! index names in its `X-Docker-Endpoints` header. The index issues a
//! session token on the first authenticated request; the token rides
//! along on every registry request that follows.
//!
//! A session serves one logical operation (one pull, one push, one
//! search); it caches a token for a single repository and is not meant to
//! be shared across tasks.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Mutex;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::auth::Credentials;
use crate::endpoint::{ApiVersion, Endpoint};
use crate::error::{Result, StevedoreError};
use crate::search::SearchResults;
use crate::tarsum::TarSum;
use crate::transport;


/// Identity and checksum of one image layer on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImgData {
    /// Image identifier.
    #[serde(rename = "id")]
    pub id: String,
    /// Layer checksum, `tarsum+sha256:<hex>`.
    #[serde(rename = "checksum", default)]
    pub checksum: String,
    /// Sha256 of the uploaded payload bytes; never serialized.
    #[serde(skip)]
    pub checksum_payload: String,
}

/// Repository metadata assembled from an index response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryData {
    /// Known layers keyed by image id.
    pub img_list: HashMap<String, ImgData>,
    /// Registry mirror base URLs, in the index's preference order.
    pub endpoints: Vec<String>,
}

/// A client session against a v1 endpoint.
#[derive(Debug)]
pub struct Session {
    http_client: reqwest::Client,
    endpoint: Endpoint,
    credentials: Credentials,
    token: Mutex<Option<String>>,
}

impl Session {
    /// Opens a session against a v1 endpoint.
    ///
    /// # Examples
    ///
    /// ```
    /// use libstevedore::auth::Credentials;
    /// use libstevedore::endpoint::{Endpoint, new_http_client};
    /// use libstevedore::session::Session;
    ///
    /// # fn example() -> libstevedore::error::Result<()> {
    /// let endpoint = Endpoint::new("https://registry.example.com/v1", true)?;
    /// let session = Session::new(new_http_client(30)?, endpoint, Credentials::anonymous())?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        http_client: reqwest::Client,
        endpoint: Endpoint,
        credentials: Credentials,
    ) -> Result<Self> {
        if endpoint.version != ApiVersion::V1 {
            return Err(StevedoreError::incorrect_api_version(format!(
                "session requires a v1 endpoint, got {}",
                endpoint
            )));
        }
        Ok(Self {
            http_client,
            endpoint,
            credentials,
            token: Mutex::new(None),
        })
    }

    /// The endpoint this session is bound to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Attaches index credentials and requests a session token.
    fn index_request(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = match self.credentials.to_header_value() {
            Some(value) => builder.header("Authorization", value),
            None => builder,
        };
        builder.header("X-Docker-Token", "true")
    }

    /// Attaches the cached token, falling back to index credentials.
    fn registry_request(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = self.token.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match token {
            Some(token) => builder.header("Authorization", format!("Token {}", token)),
            None => match self.credentials.to_header_value() {
                Some(value) => builder.header("Authorization", value),
                None => builder,
            },
        }
    }

    fn cache_token(&self, response: &Response) {
        if let Some(token) = response
            .headers()
            .get("X-Docker-Token")
            .and_then(|v| v.to_str().ok())
        {
            debug!(endpoint = %self.endpoint, "caching index session token");
            *self.token.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
        }
    }

    async fn send(&self, builder: RequestBuilder, context: &str) -> Result<Response> {
        builder.send().await.map_err(|e| {
            StevedoreError::network_with_source(format!("error {}", context), e)
        })
    }

    /// Builds registry mirror URLs from an `X-Docker-Endpoints` header,
    /// reusing the index's scheme.
    fn build_endpoints_list(&self, header: &str) -> Vec<String> {
        let scheme = self.endpoint.url.scheme();
        header
            .split(',')
            .map(|host| format!("{}://{}/v1/", scheme, host.trim()))
            .collect()
    }

    /// Fetches repository metadata from the index.
    ///
    /// Caches the session token and collects the registry mirrors named in
    /// the `X-Docker-Endpoints` header. A missing repository is a distinct
    /// error from other failures.
    pub async fn get_repository_data(&self, remote_name: &str) -> Result<RepositoryData> {
        let url = format!("{}repositories/{}/images", self.endpoint, remote_name);
        debug!(url = %url, "fetching repository data");

        let request = self.index_request(self.http_client.get(&url));
        let response = self.send(request, "requesting repository data").await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(StevedoreError::LoginRequired),
            StatusCode::NOT_FOUND => {
                return Err(StevedoreError::registry_http(
                    format!("repository {} does not exist on the index", remote_name),
                    404,
                ));
            }
            status if !status.is_success() => {
                return Err(error_from_response(response, "requesting repository data").await);
            }
            _ => {}
        }

        self.cache_token(&response);

        let endpoints = match response
            .headers()
            .get("X-Docker-Endpoints")
            .and_then(|v| v.to_str().ok())
        {
            Some(header) => self.build_endpoints_list(header),
            None => vec![self.endpoint.to_string()],
        };

        let img_list: Vec<ImgData> = response.json().await.map_err(|e| {
            StevedoreError::validation_with_source("failed to parse repository image list", e)
        })?;

        Ok(RepositoryData {
            img_list: img_list.into_iter().map(|img| (img.id.clone(), img)).collect(),
            endpoints,
        })
    }

    /// Fetches the ancestry chain of an image, most recent first.
    pub async fn get_remote_history(&self, image_id: &str, registry: &str) -> Result<Vec<String>> {
        let url = format!("{}images/{}/ancestry", registry, image_id);
        let request = self.registry_request(self.http_client.get(&url));
        let response = self.send(request, "requesting image history").await?;
        let response = check_status(response, "requesting image history").await?;

        response.json().await.map_err(|e| {
            StevedoreError::validation_with_source("failed to parse image ancestry", e)
        })
    }

    /// Checks whether an image exists on a registry.
    pub async fn lookup_remote_image(&self, image_id: &str, registry: &str) -> Result<()> {
        let url = format!("{}images/{}/json", registry, image_id);
        let request = self.registry_request(self.http_client.get(&url));
        let response = self.send(request, "looking up image").await?;
        check_status(response, "looking up image").await?;
        Ok(())
    }

    /// Fetches an image's JSON metadata and its size from `X-Docker-Size`.
    pub async fn get_remote_image_json(
        &self,
        image_id: &str,
        registry: &str,
    ) -> Result<(Vec<u8>, i64)> {
        let url = format!("{}images/{}/json", registry, image_id);
        let request = self.registry_request(self.http_client.get(&url));
        let response = self.send(request, "requesting image json").await?;
        let response = check_status(response, "requesting image json").await?;

        let size = response
            .headers()
            .get("X-Docker-Size")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(-1);

        let body = response.bytes().await.map_err(|e| {
            StevedoreError::network_with_source("failed to read image json", e)
        })?;
        Ok((body.to_vec(), size))
    }

    /// Downloads an image layer, following redirects with the credential
    /// guard so authorization never leaks to untrusted hosts.
    pub async fn get_remote_image_layer(&self, image_id: &str, registry: &str) -> Result<Vec<u8>> {
        let url = format!("{}images/{}/layer", registry, image_id);
        let request = self
            .registry_request(self.http_client.get(&url))
            .build()
            .map_err(|e| StevedoreError::network_with_source("failed to build layer request", e))?;

        let response = transport::follow_redirects(&self.http_client, request).await?;
        let response = check_status(response, "downloading layer").await?;

        let body = response.bytes().await.map_err(|e| {
            StevedoreError::network_with_source("failed to read layer body", e)
        })?;
        Ok(body.to_vec())
    }

    /// Fetches the tag map of a repository, trying each mirror in order.
    ///
    /// A 404 falls through to the next mirror; only on the last one does it
    /// become an error.
    pub async fn get_remote_tags(
        &self,
        registries: &[String],
        remote_name: &str,
    ) -> Result<HashMap<String, String>> {
        for (i, registry) in registries.iter().enumerate() {
            let url = format!("{}repositories/{}/tags", registry, remote_name);
            debug!(url = %url, "fetching remote tags");

            let request = self.registry_request(self.http_client.get(&url));
            let response = self.send(request, "requesting tags").await?;

            if response.status() == StatusCode::NOT_FOUND {
                if i == registries.len() - 1 {
                    return Err(StevedoreError::registry_http(
                        format!("repository {} not found; tag does not exist", remote_name),
                        404,
                    ));
                }
                continue;
            }

            let response = check_status(response, "requesting tags").await?;
            return response.json().await.map_err(|e| {
                StevedoreError::validation_with_source("failed to parse tag list", e)
            });
        }

        Err(StevedoreError::validation(
            "no registry endpoints to fetch tags from",
        ))
    }

    /// Uploads an image's JSON metadata.
    pub async fn push_image_json_registry(
        &self,
        img_data: &ImgData,
        raw_json: &[u8],
        registry: &str,
    ) -> Result<()> {
        let url = format!("{}images/{}/json", registry, img_data.id);
        debug!(url = %url, "pushing image json");

        let request = self
            .registry_request(self.http_client.put(&url))
            .header("Content-Type", "application/json")
            .body(raw_json.to_vec());
        let response = self.send(request, "pushing image json").await?;
        check_status(response, "pushing image json").await?;
        Ok(())
    }

    /// Uploads an image layer, checksumming it in transit.
    ///
    /// The layer streams through [`TarSum`] with gzip output; the registry
    /// receives the compressed bytes. Returns the tarsum (bound to the
    /// image JSON) and the sha256 of the payload actually sent, both of
    /// which the checksum confirmation step needs.
    pub async fn push_image_layer_registry<R: Read>(
        &self,
        image_id: &str,
        layer: R,
        json_raw: &[u8],
        registry: &str,
    ) -> Result<(String, String)> {
        let mut tarsum = TarSum::new(layer, true);
        let mut payload = Vec::new();
        tarsum
            .read_to_end(&mut payload)
            .map_err(|e| StevedoreError::validation_with_source("failed to read layer", e))?;

        let checksum = tarsum.sum(json_raw)?;
        let checksum_payload = format!("sha256:{}", hex::encode(Sha256::digest(&payload)));

        let url = format!("{}images/{}/layer", registry, image_id);
        debug!(url = %url, bytes = payload.len(), "pushing image layer");

        let request = self
            .registry_request(self.http_client.put(&url))
            .header("Content-Type", "application/octet-stream")
            .body(payload);
        let response = self.send(request, "pushing image layer").await?;
        check_status(response, "pushing image layer").await?;

        Ok((checksum, checksum_payload))
    }

    /// Confirms an uploaded layer's checksums with the registry.
    pub async fn push_image_checksum(&self, img_data: &ImgData, registry: &str) -> Result<()> {
        let url = format!("{}images/{}/checksum", registry, img_data.id);
        debug!(url = %url, "confirming layer checksum");

        let request = self
            .registry_request(self.http_client.put(&url))
            .header("X-Docker-Checksum", &img_data.checksum)
            .header("X-Docker-Checksum-Payload", &img_data.checksum_payload);
        let response = self.send(request, "confirming checksum").await?;
        let response = check_status(response, "confirming checksum").await?;

        // The registry reports checksum mismatches in the body.
        #[derive(Deserialize)]
        struct ChecksumReply {
            #[serde(default)]
            error: Option<String>,
        }
        if let Ok(reply) = response.json::<ChecksumReply>().await
            && let Some(error) = reply.error
        {
            return Err(StevedoreError::validation(format!(
                "registry rejected checksum for {}: {}",
                img_data.id, error
            )));
        }
        Ok(())
    }

    /// Points a tag at an image on the registry.
    pub async fn push_registry_tag(
        &self,
        remote_name: &str,
        image_id: &str,
        tag: &str,
        registry: &str,
    ) -> Result<()> {
        let url = format!("{}repositories/{}/tags/{}", registry, remote_name, tag);
        let body = serde_json::to_vec(image_id).map_err(|e| {
            StevedoreError::validation_with_source("failed to encode tag value", e)
        })?;

        let request = self
            .registry_request(self.http_client.put(&url))
            .header("Content-Type", "application/json")
            .body(body);
        let response = self.send(request, "pushing tag").await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            StatusCode::UNAUTHORIZED => Err(StevedoreError::LoginRequired),
            StatusCode::NOT_FOUND => Err(StevedoreError::registry_http(
                format!("repository {} or tag does not exist", remote_name),
                404,
            )),
            _ => Err(error_from_response(response, "pushing tag").await),
        }
    }

    /// Announces the image list for a repository on the index.
    ///
    /// Called once with `validate` unset before layers are pushed (the
    /// index answers with the registry endpoints to push to) and once with
    /// `validate` set afterwards to seal the push.
    pub async fn push_image_json_index(
        &self,
        remote_name: &str,
        img_list: &[ImgData],
        validate: bool,
        regs: &[String],
    ) -> Result<RepositoryData> {
        let suffix = if validate { "images" } else { "" };
        let url = format!("{}repositories/{}/{}", self.endpoint, remote_name, suffix);
        debug!(url = %url, validate, "announcing image list to index");

        let body = serde_json::to_vec(img_list).map_err(|e| {
            StevedoreError::validation_with_source("failed to encode image list", e)
        })?;

        let mut request = self
            .index_request(self.http_client.request(Method::PUT, &url))
            .header("Content-Type", "application/json")
            .body(body);
        if validate {
            for registry in regs {
                request = request.header("X-Docker-Endpoints", registry);
            }
        }

        let response = self.send(request, "announcing image list").await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(StevedoreError::LoginRequired),
            status if validate && status != StatusCode::NO_CONTENT => {
                return Err(error_from_response(response, "validating image list").await);
            }
            status if !validate && status != StatusCode::OK && status != StatusCode::CREATED => {
                return Err(error_from_response(response, "announcing image list").await);
            }
            _ => {}
        }

        self.cache_token(&response);

        let endpoints = match response
            .headers()
            .get("X-Docker-Endpoints")
            .and_then(|v| v.to_str().ok())
        {
            Some(header) => self.build_endpoints_list(header),
            None if !validate => {
                return Err(StevedoreError::validation(
                    "index response is missing the X-Docker-Endpoints header",
                ));
            }
            None => Vec::new(),
        };

        Ok(RepositoryData {
            img_list: HashMap::new(),
            endpoints,
        })
    }

    /// Searches the index for repositories matching a term.
    pub async fn search_repositories(&self, term: &str) -> Result<SearchResults> {
        let url = format!(
            "{}search?q={}",
            self.endpoint,
            url::form_urlencoded::byte_serialize(term.as_bytes()).collect::<String>()
        );
        debug!(url = %url, "searching index");

        let request = self.index_request(self.http_client.get(&url));
        let response = self.send(request, "searching index").await?;
        let response = check_status(response, "searching index").await?;

        response.json().await.map_err(|e| {
            StevedoreError::validation_with_source("failed to parse search results", e)
        })
    }
}

/// Maps non-success statuses to errors, 401 to `LoginRequired`.
async fn check_status(response: Response, context: &str) -> Result<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED => Err(StevedoreError::LoginRequired),
        _ => Err(error_from_response(response, context).await),
    }
}

async fn error_from_response(response: Response, context: &str) -> StevedoreError {
    let status = response.status();
    let url = response.url().to_string();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("(unable to read response body)"));

    StevedoreError::registry_http(
        format!("error {} at {}: HTTP {}: {}", context, url, status.as_u16(), body),
        status.as_u16(),
    )
}
