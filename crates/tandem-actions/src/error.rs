//! Action error types.

use tandem_core::TandemError;
use tandem_render::RenderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ActionError {
    /// The body is not a valid action request.
    #[error("bad action request: {0}")]
    BadRequest(String),

    /// No server function is registered under the id.
    #[error("unknown action reference: {0}")]
    UnknownReference(String),

    /// The arguments do not decode into the function's input type.
    #[error("{0}")]
    InvalidArguments(String),

    /// The function itself failed.
    #[error("action {id} failed: {source}")]
    Failed {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// A rerender outcome could not be rendered.
    #[error("action {id} rerender failed: {source}")]
    Render {
        id: String,
        #[source]
        source: RenderError,
    },
}

impl ActionError {
    /// Stable code carried in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::UnknownReference(_) => "unknown_reference",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::Failed { .. } => "action_failed",
            Self::Render { .. } => "render_failed",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) | Self::InvalidArguments(_) => 400,
            Self::UnknownReference(_) => 404,
            Self::Render {
                source: RenderError::Cancelled,
                ..
            } => 503,
            Self::Failed { .. } | Self::Render { .. } => 500,
        }
    }

    /// Message safe to show the caller.
    ///
    /// Server-side failures are not described beyond their code.
    pub fn public_message(&self) -> String {
        match self {
            Self::Failed { .. } | Self::Render { .. } => "Action failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ActionError> for TandemError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::UnknownReference(id) => TandemError::UnknownReference(id),
            ActionError::Render { source, .. } => source.into(),
            ActionError::Failed { source, .. } => TandemError::App(source),
            other => TandemError::App(anyhow::anyhow!(other.to_string())),
        }
    }
}
