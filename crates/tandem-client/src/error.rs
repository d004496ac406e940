//! Client error types.

use tandem_core::TandemError;
use tandem_streaming::StreamError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// No loader is registered for a referenced module.
    #[error("unknown client module: {0}")]
    UnknownModule(String),

    /// A loader failed.
    #[error("failed to load {id}: {message}")]
    Load { id: String, message: String },

    /// The stream was malformed or truncated.
    #[error("stream decode error: {0}")]
    Decode(String),

    /// The server reported an error for a deferred subtree.
    #[error("subtree {id} failed: {message}")]
    Subtree { id: u32, message: String },

    /// Server markup and the decoded tree disagree.
    #[error("hydration mismatch: {0}")]
    Hydration(String),
}

impl From<StreamError> for ClientError {
    fn from(err: StreamError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<ClientError> for TandemError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::UnknownModule(id) => TandemError::UnknownReference(id),
            ClientError::Decode(message) => TandemError::StreamDecode(message),
            ClientError::Subtree { id, message } => TandemError::SubtreeRender { id, message },
            ClientError::Hydration(message) => TandemError::HydrationMismatch(message),
            load @ ClientError::Load { .. } => TandemError::App(anyhow::anyhow!(load)),
        }
    }
}
