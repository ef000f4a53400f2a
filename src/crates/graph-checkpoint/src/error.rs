//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
///
/// A missing checkpoint is not an error: lookups return `Ok(None)` and
/// history streams are simply empty.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary encoding or decoding failed
    #[error("Binary serialization error: {0}")]
    BinarySerialization(#[from] bincode::Error),

    /// The storage medium failed (connection lost, disk full, ...)
    #[error("Storage error: {0}")]
    Storage(String),

    /// The locator or checkpoint violates the store contract
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),
}
