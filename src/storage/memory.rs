//! In-memory blob container.
//!
//! Blobs are held in a `tokio::sync::RwLock<HashMap<...>>`.  Nothing is
//! persisted; the container starts empty on every run.  Useful for local
//! development (`BLOB_BACKEND=memory`) and for exercising the HTTP layer
//! in tests.

use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::container::BlobContainer;
use super::error::StorageError;

/// In-memory container.
pub struct MemoryContainer {
    /// Container name reported by [`BlobContainer::name`].
    name: String,
    /// blob name -> content.
    blobs: tokio::sync::RwLock<HashMap<String, Bytes>>,
}

impl MemoryContainer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blobs: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

impl BlobContainer for MemoryContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn download(
        &self,
        blob_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, StorageError>> + Send + '_>> {
        let blob_name = blob_name.to_string();
        Box::pin(async move {
            let blobs = self.blobs.read().await;
            blobs
                .get(&blob_name)
                .cloned()
                .ok_or(StorageError::NotFound { name: blob_name })
        })
    }

    fn upload(
        &self,
        blob_name: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        let blob_name = blob_name.to_string();
        Box::pin(async move {
            self.blobs.write().await.insert(blob_name, data);
            Ok(())
        })
    }
}

// -- Tests --------------------------------------------------------------------
