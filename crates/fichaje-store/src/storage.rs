//! Object storage client for voice-note blobs.
//!
//! The storage API serves uploaded objects through public URLs. A missing
//! bucket and a rejected content type are distinct, user-facing
//! misconfigurations; everything else surfaces as a generic upload
//! failure.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::ServiceConfig;
use crate::traits::ObjectStorage;

/// Errors produced by the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The bucket has not been provisioned.
    #[error("Bucket '{0}' does not exist")]
    BucketMissing(String),

    /// The bucket rejected the blob's content type.
    #[error("Content type '{0}' not accepted by the bucket")]
    UnsupportedContentType(String),

    /// Transport-level failure.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Storage rejected request ({status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Deserialize)]
struct BucketInfo {
    id: String,
}

pub struct RestStorage {
    http: Client,
    base: String,
    api_key: String,
}

impl RestStorage {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            http: Client::new(),
            base: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.header("apikey", &self.api_key).bearer_auth(&self.api_key)
        }
    }

    /// Public URL an uploaded object is served from.
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base, bucket, path)
    }
}

#[async_trait]
impl ObjectStorage for RestStorage {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        let url = format!("{}/storage/v1/bucket", self.base);
        let resp = self.authed(self.http.get(&url)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let buckets: Vec<BucketInfo> = resp.json().await?;
        Ok(buckets.iter().any(|b| b.id == bucket))
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base, bucket, path);
        let resp = self
            .authed(self.http.post(&url))
            .header("Content-Type", content_type.to_string())
            .header("Cache-Control", "max-age=3600")
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            debug!(bucket, path, "Uploaded blob");
            return Ok(self.public_url(bucket, path));
        }

        let message = resp.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND && message.to_lowercase().contains("bucket") {
            return Err(StorageError::BucketMissing(bucket.to_string()));
        }
        if message.to_lowercase().contains("mime type") {
            return Err(StorageError::UnsupportedContentType(content_type.to_string()));
        }
        Err(StorageError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
