//! blob-quickstart library: read and write files in an Azure Blob Storage
//! container over HTTP, authenticated with a managed identity.
//!
//! Startup composes the pieces explicitly: [`config::Config`] is read from
//! the environment, [`identity::resolve_credential`] configures the managed
//! identity, [`storage::azure::build_container_handle`] binds a container,
//! and [`server::app`] serves it.

use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod server;
pub mod storage;

use crate::config::Config;
use crate::storage::BlobContainer;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Service configuration.
    pub config: Config,
    /// Container handle (Azure Blob Storage or in-memory).
    pub container: Arc<dyn BlobContainer>,
}
