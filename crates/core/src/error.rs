//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid partition key: {0}")]
    InvalidPartitionKey(String),

    #[error("invalid partition name: {0}")]
    InvalidPartitionName(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
