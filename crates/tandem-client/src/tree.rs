//! Decoded client tree.

use std::fmt;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use tandem_core::Props;
use tandem_streaming::{FrameId, ModulePayload};

use crate::cache::ModuleCache;
use crate::component::ClientComponent;
use crate::error::ClientError;

/// Outcome of a deferred subtree.
pub type Settled = Result<ClientNode, ClientError>;

/// A node of the decoded tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientNode {
    Text(String),
    Data(Value),
    Element {
        tag: String,
        props: Props,
        children: Vec<ClientNode>,
    },
    Fragment(Vec<ClientNode>),
    Segment {
        key: String,
        child: Box<ClientNode>,
    },
    /// A client module instance, loaded on first access.
    Island(IslandRef),
    /// A subtree that settles when its resolution (or error) frame arrives.
    Lazy(LazyNode),
}

impl ClientNode {
    /// Text currently visible: lazies that have not settled yet, or
    /// settled with an error, contribute nothing.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Self::Text(t) => out.push_str(t),
            Self::Data(Value::String(s)) => out.push_str(s),
            Self::Data(_) | Self::Island(_) => {}
            Self::Element { children, .. } | Self::Fragment(children) => {
                children.iter().for_each(|c| c.collect_text(out))
            }
            Self::Segment { child, .. } => child.collect_text(out),
            Self::Lazy(lazy) => {
                if let Some(Ok(node)) = lazy.try_get() {
                    node.collect_text(out);
                }
            }
        }
    }

    /// Wait for every lazy subtree and inline the settled values.
    ///
    /// Lazies that settled with an error are kept in place as error
    /// boundaries.
    pub fn resolve_deep(&self) -> BoxFuture<'_, ClientNode> {
        async move {
            match self {
                Self::Element {
                    tag,
                    props,
                    children,
                } => {
                    let mut resolved = Vec::with_capacity(children.len());
                    for child in children {
                        resolved.push(child.resolve_deep().await);
                    }
                    Self::Element {
                        tag: tag.clone(),
                        props: props.clone(),
                        children: resolved,
                    }
                }
                Self::Fragment(children) => {
                    let mut resolved = Vec::with_capacity(children.len());
                    for child in children {
                        resolved.push(child.resolve_deep().await);
                    }
                    Self::Fragment(resolved)
                }
                Self::Segment { key, child } => Self::Segment {
                    key: key.clone(),
                    child: Box::new(child.resolve_deep().await),
                },
                Self::Lazy(lazy) => match lazy.wait().await {
                    Ok(node) => node.resolve_deep().await,
                    Err(_) => self.clone(),
                },
                other => other.clone(),
            }
        }
        .boxed()
    }

    /// Islands in tree order, following settled lazies.
    pub fn islands(&self) -> Vec<IslandRef> {
        let mut out = Vec::new();
        self.collect_islands(&mut out);
        out
    }

    fn collect_islands(&self, out: &mut Vec<IslandRef>) {
        match self {
            Self::Island(island) => out.push(island.clone()),
            Self::Element { children, .. } | Self::Fragment(children) => {
                children.iter().for_each(|c| c.collect_islands(out))
            }
            Self::Segment { child, .. } => child.collect_islands(out),
            Self::Lazy(lazy) => {
                if let Some(Ok(node)) = lazy.try_get() {
                    node.collect_islands(out);
                }
            }
            Self::Text(_) | Self::Data(_) => {}
        }
    }
}

/// A client module reference in the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct IslandRef {
    /// Frame that introduced the reference.
    pub frame: FrameId,
    pub module: ModulePayload,
}

impl IslandRef {
    pub fn module_id(&self) -> &str {
        self.module.id.as_str()
    }

    pub fn props(&self) -> &Value {
        &self.module.props
    }

    /// Load the implementation through the page's module cache.
    pub async fn load(&self, cache: &ModuleCache) -> Result<Arc<dyn ClientComponent>, ClientError> {
        cache.load(self.module_id()).await
    }
}

/// Placeholder for a deferred subtree.
///
/// Clones share one underlying value.
#[derive(Clone)]
pub struct LazyNode {
    id: FrameId,
    value: Shared<BoxFuture<'static, Settled>>,
}

impl LazyNode {
    /// Create a placeholder and the sender that settles it.
    pub(crate) fn channel(id: FrameId) -> (oneshot::Sender<Settled>, Self) {
        let (tx, rx) = oneshot::channel::<Settled>();
        let value = rx
            .map(move |received| {
                received.unwrap_or_else(|_| {
                    Err(ClientError::Decode(format!(
                        "decoder dropped before frame {} settled",
                        id
                    )))
                })
            })
            .boxed()
            .shared();
        (tx, Self { id, value })
    }

    /// Frame id this placeholder stands for.
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// The settled value, if available now.
    pub fn try_get(&self) -> Option<Settled> {
        self.value.clone().now_or_never()
    }

    pub fn is_settled(&self) -> bool {
        self.try_get().is_some()
    }

    /// Wait until the placeholder settles.
    pub async fn wait(&self) -> Settled {
        self.value.clone().await
    }
}

impl PartialEq for LazyNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for LazyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyNode")
            .field("id", &self.id)
            .field("settled", &self.is_settled())
            .finish()
    }
}
