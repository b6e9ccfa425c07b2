//! Blob storage.
//!
//! The [`container::BlobContainer`] trait abstracts over where blobs live.
//! Implementations are the Azure Blob Storage client and an in-memory
//! container.

pub mod azure;
pub mod container;
pub mod error;
pub mod memory;

pub use container::BlobContainer;
pub use error::{ErrorKind, StorageError};
