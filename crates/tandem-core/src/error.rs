//! Error taxonomy shared across the pipeline.

use thiserror::Error;

/// Errors that can surface at a request or action boundary.
///
/// A middleware short-circuit is not represented here: it is a normal
/// terminal response. Only `SubtreeRender` is recovered locally, by
/// attaching it to the failing subtree; every other variant propagates
/// to the request/action boundary.
#[derive(Error, Debug)]
pub enum TandemError {
    /// No registered pattern matches the path.
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// A pattern matches the path but not the method.
    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed { method: String, path: String },

    /// The top-level structural render failed.
    #[error("Shell render failed: {0}")]
    ShellRender(String),

    /// A single deferred subtree failed.
    #[error("Subtree {id} failed: {message}")]
    SubtreeRender { id: u32, message: String },

    /// An action or module id that no table knows about.
    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    /// SSR markup and decoded stream disagree structurally.
    #[error("Hydration mismatch: {0}")]
    HydrationMismatch(String),

    /// Malformed or truncated frame stream.
    #[error("Stream decode error: {0}")]
    StreamDecode(String),

    /// Request-scoped access outside of any request.
    #[error("No active request context")]
    NoActiveRequest,

    /// Storage collaborator failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request was cancelled or timed out.
    #[error("Request cancelled: {0}")]
    Cancelled(String),

    /// Application error raised by user code.
    #[error(transparent)]
    App(#[from] anyhow::Error),
}

impl TandemError {
    /// HTTP status code the request boundary should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RouteNotFound(_) | Self::UnknownReference(_) => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::StreamDecode(_) => 400,
            Self::Cancelled(_) => 503,
            _ => 500,
        }
    }

    /// Whether the caller is at fault.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}
