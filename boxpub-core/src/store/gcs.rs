//! Google Cloud Storage backend
//!
//! Talks to the Cloud Storage JSON API directly with `reqwest`:
//! - download: `GET  /storage/v1/b/{bucket}/o/{object}?alt=media`
//! - upload:   `POST /upload/storage/v1/b/{bucket}/o?uploadType=media&name={object}`
//!
//! Requests carry a bearer token obtained elsewhere. Conditional writes use
//! `ifGenerationMatch`, with generation `0` meaning "must not exist".

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{BlobStore, Operation, Precondition, StoreError, StoreResult, StoredObject, UploadBody};

/// Public Cloud Storage endpoint
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Response header carrying the object generation on downloads
const GENERATION_HEADER: &str = "x-goog-generation";

/// Object resource returned by a successful upload
#[derive(Debug, Deserialize)]
struct ObjectResource {
    bucket: String,
    name: String,
}

/// Cloud Storage blob store
pub struct GcsBlobStore {
    client: reqwest::Client,
    endpoint: Url,
    access_token: String,
}

impl GcsBlobStore {
    /// Create a store using the public endpoint
    pub fn new(access_token: impl Into<String>) -> StoreResult<Self> {
        Self::with_endpoint(access_token, DEFAULT_ENDPOINT)
    }

    /// Create a store using a custom endpoint (emulators, private access)
    pub fn with_endpoint(access_token: impl Into<String>, endpoint: &str) -> StoreResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| StoreError::Configuration(format!("invalid endpoint '{endpoint}': {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(StoreError::Configuration(format!(
                "invalid endpoint '{endpoint}': not a base URL"
            )));
        }

        // No overall timeout: box uploads can legitimately take a long time
        let client = reqwest::Client::builder()
            .user_agent(concat!("boxpub/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StoreError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            access_token: access_token.into(),
        })
    }

    fn url_with_segments(&self, segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        // Base URLs were checked at construction
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// URL that downloads an object's content
    pub fn download_url(&self, bucket: &str, object: &str) -> Url {
        let mut url = self.url_with_segments(&["storage", "v1", "b", bucket, "o", object]);
        url.query_pairs_mut().append_pair("alt", "media");
        url
    }

    /// URL for a simple media upload
    pub fn upload_url(&self, bucket: &str, object: &str, precondition: &Precondition) -> Url {
        let mut url = self.url_with_segments(&["upload", "storage", "v1", "b", bucket, "o"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("uploadType", "media");
            query.append_pair("name", object);
            match precondition {
                Precondition::None => {}
                Precondition::DoesNotExist => {
                    query.append_pair("ifGenerationMatch", "0");
                }
                Precondition::GenerationMatch(generation) => {
                    query.append_pair("ifGenerationMatch", generation);
                }
            }
        }
        url
    }

    fn transport_error(
        operation: Operation,
        bucket: &str,
        object: &str,
        source: reqwest::Error,
    ) -> StoreError {
        StoreError::Transport {
            operation,
            container: bucket.to_string(),
            key: object.to_string(),
            source: Box::new(source),
        }
    }

    async fn status_error(
        operation: Operation,
        bucket: &str,
        object: &str,
        response: reqwest::Response,
    ) -> StoreError {
        let status = response.status();
        if status == StatusCode::PRECONDITION_FAILED {
            return StoreError::PreconditionFailed {
                container: bucket.to_string(),
                key: object.to_string(),
            };
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => format!("<unreadable body: {e}>"),
        };
        StoreError::Status {
            operation,
            container: bucket.to_string(),
            key: object.to_string(),
            status: status.as_u16(),
            body,
        }
    }
}

fn generation_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(GENERATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn fetch(&self, bucket: &str, object: &str) -> StoreResult<Option<StoredObject>> {
        let url = self.download_url(bucket, object);
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| Self::transport_error(Operation::Fetch, bucket, object, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::status_error(Operation::Fetch, bucket, object, response).await);
        }

        let generation = generation_from_headers(response.headers());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::transport_error(Operation::Fetch, bucket, object, e))?;

        Ok(Some(StoredObject {
            bytes: bytes.to_vec(),
            generation,
        }))
    }

    async fn store(
        &self,
        bucket: &str,
        object: &str,
        body: UploadBody,
        content_type: &str,
        precondition: Precondition,
    ) -> StoreResult<String> {
        let (body, length) = match body {
            UploadBody::Bytes(bytes) => {
                let length = bytes.len() as u64;
                (Body::from(bytes), length)
            }
            UploadBody::File(path) => {
                let io_error = |source| StoreError::Io {
                    operation: Operation::Store,
                    path: path.clone(),
                    source,
                };
                let file = tokio::fs::File::open(&path).await.map_err(io_error)?;
                let length = file.metadata().await.map_err(io_error)?.len();
                (Body::from(file), length)
            }
        };

        let url = self.upload_url(bucket, object, &precondition);
        debug!("POST {} ({} bytes)", url, length);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, length)
            .body(body)
            .send()
            .await
            .map_err(|e| Self::transport_error(Operation::Store, bucket, object, e))?;

        if !response.status().is_success() {
            return Err(Self::status_error(Operation::Store, bucket, object, response).await);
        }

        let resource: ObjectResource = response
            .json()
            .await
            .map_err(|e| Self::transport_error(Operation::Store, bucket, object, e))?;

        Ok(self.location(&resource.bucket, &resource.name))
    }

    fn name(&self) -> &'static str {
        "gcs"
    }

    fn location(&self, bucket: &str, object: &str) -> String {
        format!("gs://{bucket}/{object}")
    }
}
