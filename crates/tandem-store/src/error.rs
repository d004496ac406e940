//! Storage error types.

use tandem_core::TandemError;
use thiserror::Error;

/// Errors raised by storage collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store failed.
    #[error("Store operation failed: {0}")]
    Backend(String),

    /// Failed to serialize or deserialize a value.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Migration versions are not strictly increasing.
    #[error("Invalid migration list: {0}")]
    InvalidMigrations(String),

    /// A migration failed; later migrations were not attempted.
    #[error("Migration {version} ({name}) failed: {message}")]
    Migration {
        version: u64,
        name: String,
        message: String,
    },

    /// A versioned write lost against a concurrent writer.
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),
}

impl From<StoreError> for TandemError {
    fn from(err: StoreError) -> Self {
        TandemError::Storage(err.to_string())
    }
}
