//! Protocol error types.

use tandem_core::TandemError;
use thiserror::Error;

use crate::frame::FrameId;

/// Errors raised while producing or consuming a frame stream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// A line could not be parsed as a frame.
    #[error("malformed frame at line {line}: {message}")]
    Malformed { line: usize, message: String },

    /// A payload does not have the shape its kind requires.
    #[error("invalid {kind} payload for frame {id}: {message}")]
    InvalidPayload {
        id: FrameId,
        kind: &'static str,
        message: String,
    },

    /// The transport closed before the terminating frame.
    #[error("stream truncated after {frames} frames")]
    Truncated { frames: usize },

    /// A frame violates the ordering rules.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<StreamError> for TandemError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Transport(message) => TandemError::Cancelled(message),
            other => TandemError::StreamDecode(other.to_string()),
        }
    }
}
