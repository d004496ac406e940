//! Registry error types.

use tandem_core::TandemError;
use thiserror::Error;

/// Errors raised by reference tables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No entry for this id in the table that was asked.
    #[error("unknown {table} reference: {id}")]
    Unknown { table: &'static str, id: String },

    /// An id was registered twice in the same table.
    #[error("duplicate {table} reference: {id}")]
    Duplicate { table: &'static str, id: String },

    /// The build manifest could not be read.
    #[error("invalid module manifest: {0}")]
    Manifest(String),
}

impl From<RegistryError> for TandemError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unknown { id, .. } => TandemError::UnknownReference(id),
            other => TandemError::Config(other.to_string()),
        }
    }
}
