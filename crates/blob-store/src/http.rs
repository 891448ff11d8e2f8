//! MinIO-backed blob store speaking plain S3 path-style HTTP.
//!
//! Each blob lives at `http://<host>/<bucket>/<key>`. The deployments this
//! targets run MinIO with anonymous read-write bucket policies inside a
//! private network, so requests carry no signature; credentials are accepted
//! for forward compatibility with signed setups.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::{BlobStore, BlobStoreError};

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct HttpBlobStoreConfig {
    /// `host:port` of the endpoint, no scheme.
    pub host: String,

    /// Bucket holding the checkpoint config blobs.
    pub bucket: String,

    /// Access key id, unused by anonymous buckets.
    pub access_key_id: String,

    /// Secret access key, unused by anonymous buckets.
    pub secret_access_key: String,
}

/// Blob store client over HTTP.
#[derive(Debug)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBlobStore {
    /// Builds a client for the configured endpoint.
    pub fn new(config: &HttpBlobStoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{}/{}", config.host, config.bucket),
        }
    }

    fn url_for(&self, key_hex: &str) -> String {
        format!("{}/{}", self.base_url, key_hex)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, key_hex: &str, bytes: Vec<u8>) -> Result<(), BlobStoreError> {
        let url = self.url_for(key_hex);
        debug!(%url, len = bytes.len(), "storing blob");

        let response = self
            .client
            .put(&url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| BlobStoreError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(BlobStoreError::Rejected(response.status().as_u16()))
        }
    }

    async fn get(&self, key_hex: &str) -> Result<Vec<u8>, BlobStoreError> {
        let url = self.url_for(key_hex);
        debug!(%url, "fetching blob");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BlobStoreError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(BlobStoreError::NotFound(key_hex.to_owned())),
            status if status.is_success() => Ok(response
                .bytes()
                .await
                .map_err(|e| BlobStoreError::Transport(e.to_string()))?
                .to_vec()),
            status => Err(BlobStoreError::Rejected(status.as_u16())),
        }
    }
}
