//! Content-addressed blob storage for checkpoint configuration blobs.
//!
//! Blobs are addressed by the lowercase hex SHA256 of their contents. Writes
//! are idempotent: storing the same key twice must succeed.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use http::HttpBlobStore;
pub use memory::MemoryBlobStore;

/// Errors surfaced by a blob store.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    /// No blob exists under the requested key.
    #[error("blob {0} not found")]
    NotFound(String),

    /// The store endpoint could not be reached or returned a transport-level
    /// failure.
    #[error("blob store transport: {0}")]
    Transport(String),

    /// The store rejected the request.
    #[error("blob store rejected request with status {0}")]
    Rejected(u16),
}

/// A content-addressed blob store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `key_hex`. Idempotent.
    async fn put(&self, key_hex: &str, bytes: Vec<u8>) -> Result<(), BlobStoreError>;

    /// Fetches the blob stored under `key_hex`.
    async fn get(&self, key_hex: &str) -> Result<Vec<u8>, BlobStoreError>;
}

/// The content address of `bytes`: lowercase hex SHA256.
pub fn content_key(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// The raw 32-byte content hash of `bytes`.
pub fn content_hash(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_key_is_lowercase_hex_sha256() {
        // SHA256("abc"), a fixed vector.
        assert_eq!(
            content_key(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(content_hash(b"abc")[..4], [0xba, 0x78, 0x16, 0xbf]);
    }
}
