//! Fallback strategies for failed deferred subtrees.

use tandem_core::{Element, Node};

/// What the client receives when a deferred subtree fails.
#[derive(Debug, Clone, Default)]
pub enum FallbackStrategy {
    /// Send an `error` frame; the client's error boundary decides.
    #[default]
    ErrorFrame,

    /// Resolve the subtree with a fixed node instead.
    RenderFallback(Node),

    /// Resolve the subtree with a generic error message.
    ShowError,
}

impl FallbackStrategy {
    /// Create a fallback that renders a custom node.
    pub fn node(node: impl Into<Node>) -> Self {
        Self::RenderFallback(node.into())
    }

    /// Replacement node for a failure, or `None` for an error frame.
    pub fn replacement(&self, error: &str) -> Option<Node> {
        match self {
            Self::ErrorFrame => None,
            Self::RenderFallback(node) => Some(node.clone()),
            Self::ShowError => Some(
                Element::new("div")
                    .prop("class", "subtree-error")
                    .child(format!("Failed to load: {}", error))
                    .into(),
            ),
        }
    }
}
