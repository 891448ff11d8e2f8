//! In-memory blob store used by tests and single-process setups.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{BlobStore, BlobStoreError};

/// A blob store backed by a process-local map. Clones share the same
/// storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key_hex: &str, bytes: Vec<u8>) -> Result<(), BlobStoreError> {
        self.blobs.lock().await.insert(key_hex.to_owned(), bytes);
        Ok(())
    }

    async fn get(&self, key_hex: &str) -> Result<Vec<u8>, BlobStoreError> {
        self.blobs
            .lock()
            .await
            .get(key_hex)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(key_hex.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_round_trip() {
        let store = MemoryBlobStore::new();
        store.put("aa", b"payload".to_vec()).await.unwrap();
        assert_eq!(store.get("aa").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn duplicate_put_succeeds() {
        let store = MemoryBlobStore::new();
        store.put("aa", b"payload".to_vec()).await.unwrap();
        store.put("aa", b"payload".to_vec()).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let store = MemoryBlobStore::new();
        let clone = store.clone();
        store.put("aa", b"payload".to_vec()).await.unwrap();
        assert_eq!(clone.get("aa").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = MemoryBlobStore::new();
        assert!(matches!(
            store.get("bb").await,
            Err(BlobStoreError::NotFound(_))
        ));
    }
}
