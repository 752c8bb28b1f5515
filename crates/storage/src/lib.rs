//! Remote blob store abstraction and backends for vocasync.
//!
//! This crate provides:
//! - The dumb blob store interface the sync engine runs against
//!   (find by name, get, create, update, list)
//! - JSON helpers for typed blobs
//! - Bearer credential types and the token provider seam
//! - Backends: local directory and in-memory

pub mod auth;
pub mod backends;
pub mod error;
pub mod traits;

pub use auth::{AccessToken, StaticTokenProvider, TokenProvider};
pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend};
pub use error::{StorageError, StorageResult};
pub use traits::{BlobEntry, BlobId, BlobStore, BlobStoreJsonExt};

use std::sync::Arc;
use vocasync_core::config::RemoteConfig;

/// Create a blob store from configuration.
pub async fn from_config(config: &RemoteConfig) -> StorageResult<Arc<dyn BlobStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        RemoteConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        RemoteConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}
