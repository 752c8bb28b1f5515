//! Sync engine error types.

use thiserror::Error;
use vocasync_local::LocalError;
use vocasync_storage::StorageError;

/// Errors raised while running a sync cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote store error: {0}")]
    Storage(#[from] StorageError),

    #[error("local store error: {0}")]
    Local(#[from] LocalError),

    #[error("invalid data: {0}")]
    Core(#[from] vocasync_core::Error),

    #[error("no access token available")]
    NotAuthenticated,

    #[error("remote partition missing: {0}")]
    MissingPartition(String),
}

impl SyncError {
    /// Whether the same operation may succeed on a later cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            Self::MissingPartition(_) => true,
            _ => false,
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
