//! Local store error types.

use thiserror::Error;

/// Local store operation errors.
#[derive(Debug, Error)]
pub enum LocalError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid record: {0}")]
    InvalidRecord(#[from] vocasync_core::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for LocalError {
    fn from(e: std::io::Error) -> Self {
        LocalError::Config(e.to_string())
    }
}

/// Result type for local store operations.
pub type LocalResult<T> = std::result::Result<T, LocalError>;
