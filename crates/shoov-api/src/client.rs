//! Shoov backend HTTP client
//!
//! JSON over HTTPS, authenticated with the `access-token` header.
//! Artifacts are streamed from disk into the multipart upload.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::api::ShoovApi;
use crate::error::ApiError;
use crate::types::{BuildId, Listing, RepositoryId, UploadEnvelope, UploadForm, UploadReceipt};
use crate::Result;

const REPOSITORIES: &str = "/api/repositories";
const BUILDS: &str = "/api/builds";
const SCREENSHOTS: &str = "/api/screenshots";
const SCREENSHOTS_UPLOAD: &str = "/api/screenshots-upload";

/// Connection settings for the backend client
#[derive(Clone)]
pub struct ApiConfig {
    /// Backend base URL, without the `/api` suffix
    pub backend_url: String,
    /// Value of the `access-token` header
    pub access_token: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ApiConfig {
    /// Create config for a specific backend
    pub fn new(backend_url: &str, access_token: &str) -> Self {
        ApiConfig {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Override the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.backend_url, endpoint)
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("backend_url", &self.backend_url)
            .field("access_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// reqwest-backed implementation of [`ShoovApi`]
pub struct HttpShoovApi {
    config: ApiConfig,
    http_client: reqwest::Client,
}

impl HttpShoovApi {
    /// Create a new backend client
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("shoov-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(HttpShoovApi {
            config,
            http_client,
        })
    }

    async fn get_listing(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Listing> {
        let response = self
            .http_client
            .get(self.config.url(endpoint))
            .header("access-token", &self.config.access_token)
            .query(query)
            .send()
            .await?;

        decode(endpoint, response).await
    }
}

/// Reject anything but `200 OK`, then decode the JSON body.
///
/// The backend answers 200 on every success; any other non-5xx status is
/// how it reports a bad access token.
async fn decode<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T> {
    let status = response.status();
    if status != StatusCode::OK {
        return Err(ApiError::from_status(endpoint, status.as_u16()));
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode {
        endpoint: endpoint.to_string(),
        detail: e.to_string(),
    })
}

/// Stream a file into a multipart part without buffering it.
async fn file_part(path: &Path) -> Result<Part> {
    let artifact_err = |source| ApiError::Artifact {
        path: path.to_path_buf(),
        source,
    };

    let file = tokio::fs::File::open(path).await.map_err(artifact_err)?;
    let len = file.metadata().await.map_err(artifact_err)?.len();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "screenshot.png".to_string());

    let body = Body::wrap_stream(ReaderStream::new(file));
    Ok(Part::stream_with_length(body, len)
        .file_name(file_name)
        .mime_str("image/png")?)
}

#[async_trait]
impl ShoovApi for HttpShoovApi {
    async fn find_repository(&self, label: &str) -> Result<Option<RepositoryId>> {
        let listing = self
            .get_listing(REPOSITORIES, &[("filter[label]", label), ("fields", "id")])
            .await?;
        Ok(listing.first_id().map(RepositoryId))
    }

    async fn latest_build(&self, repository: &RepositoryId) -> Result<Option<BuildId>> {
        let listing = self
            .get_listing(
                BUILDS,
                &[("filter[repository]", repository.0.as_str()), ("fields", "id")],
            )
            .await?;
        Ok(listing.first_id().map(BuildId))
    }

    async fn count_screenshots(&self, build: &BuildId, screenshot_hash: &str) -> Result<u64> {
        let listing = self
            .get_listing(
                SCREENSHOTS,
                &[
                    ("filter[build]", build.0.as_str()),
                    ("filter[screenshot_hash]", screenshot_hash),
                    ("fields", "id"),
                ],
            )
            .await?;
        Ok(listing.count)
    }

    async fn upload_screenshot(&self, form: &UploadForm) -> Result<UploadReceipt> {
        let mut multipart = Form::new();
        for (name, value) in form.text_fields() {
            multipart = multipart.text(name, value);
        }
        for (name, path) in form.file_fields() {
            multipart = multipart.part(name, file_part(path).await?);
        }

        let response = self
            .http_client
            .post(self.config.url(SCREENSHOTS_UPLOAD))
            .header("access-token", &self.config.access_token)
            .multipart(multipart)
            .send()
            .await?;

        let envelope: UploadEnvelope = decode(SCREENSHOTS_UPLOAD, response).await?;
        let record = envelope
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Decode {
                endpoint: SCREENSHOTS_UPLOAD.to_string(),
                detail: "empty data array".to_string(),
            })?;

        debug!(build = %record.build, "Upload accepted");
        Ok(UploadReceipt {
            build: BuildId(record.build),
            record: serde_json::Value::Object(record.extra),
        })
    }
}
