//! Render error types.

use tandem_core::TandemError;
use thiserror::Error;

/// Errors raised by either render pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A server component returned an error.
    #[error("component {component} failed: {message}")]
    Component { component: String, message: String },

    /// A client boundary names a module missing from the active table.
    #[error("unknown {table} module: {id}")]
    UnknownModule { table: &'static str, id: String },

    /// The request was cancelled mid-render.
    #[error("render cancelled")]
    Cancelled,

    /// The SSR pass and the primary pass disagree on boundary nodes.
    #[error("hydration mismatch: {0}")]
    Mismatch(String),
}

impl RenderError {
    pub(crate) fn component(component: &str, err: &anyhow::Error) -> Self {
        Self::Component {
            component: component.to_string(),
            message: format!("{:#}", err),
        }
    }
}

impl From<RenderError> for TandemError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Cancelled => TandemError::Cancelled("render cancelled".into()),
            RenderError::Mismatch(message) => TandemError::HydrationMismatch(message),
            other => TandemError::ShellRender(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_to_tandem_error() {
        let err: TandemError = RenderError::Component {
            component: "Header".into(),
            message: "db down".into(),
        }
        .into();
        assert!(matches!(err, TandemError::ShellRender(ref m) if m.contains("Header")));
        assert_eq!(err.status_code(), 500);

        let err: TandemError = RenderError::Mismatch("2 vs 1".into()).into();
        assert!(matches!(err, TandemError::HydrationMismatch(_)));
    }
}
