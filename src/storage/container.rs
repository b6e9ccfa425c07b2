//! Container handle contract.
//!
//! A [`BlobContainer`] is bound to one storage account and container and
//! performs whole-blob reads and writes.  Handles are created once at
//! startup and shared by all requests, so implementations hold no mutable
//! state that needs external locking.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

use super::error::StorageError;

/// Async blob container contract.
pub trait BlobContainer: Send + Sync + 'static {
    /// Name of the bound container.
    fn name(&self) -> &str;

    /// Read the entire content of `blob_name`.
    fn download(
        &self,
        blob_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, StorageError>> + Send + '_>>;

    /// Store `data` as the full content of `blob_name`.
    fn upload(
        &self,
        blob_name: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>>;
}
