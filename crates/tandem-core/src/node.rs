//! Component tree nodes.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};

/// Element attributes / props.
pub type Props = Map<String, Value>;

/// Future produced by a server component.
pub type NodeFuture = BoxFuture<'static, anyhow::Result<Node>>;

type ServerFn = Arc<dyn Fn() -> NodeFuture + Send + Sync>;

/// A node of the component tree.
///
/// Trees are built fresh for every render and are never shared between
/// requests. A tree may be rendered more than once (primary pass and SSR
/// pass), which is why server components are `Fn` rather than `FnOnce`.
#[derive(Clone)]
pub enum Node {
    /// Plain text.
    Text(String),
    /// Arbitrary evaluated data.
    Data(Value),
    /// A host element with props and children.
    Element(Element),
    /// An ordered list of siblings.
    Fragment(Vec<Node>),
    /// A route or layout boundary keyed for reconciliation.
    Segment { key: String, child: Box<Node> },
    /// A component evaluated on the server.
    Server(ServerNode),
    /// A component evaluated on the client only.
    Client(ClientNode),
}

impl Node {
    /// Text node.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Data node.
    pub fn data(value: Value) -> Self {
        Self::Data(value)
    }

    /// Fragment node.
    pub fn fragment(children: impl IntoIterator<Item = Node>) -> Self {
        Self::Fragment(children.into_iter().collect())
    }

    /// Segment boundary around `child`.
    pub fn segment(key: impl Into<String>, child: Node) -> Self {
        Self::Segment {
            key: key.into(),
            child: Box::new(child),
        }
    }

    /// Server component from an async function.
    pub fn server<F, Fut>(name: impl Into<String>, render: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Node>> + Send + 'static,
    {
        Self::Server(ServerNode {
            name: name.into(),
            render: Arc::new(move || render().boxed()),
        })
    }

    /// Client-boundary node referencing a client module by id.
    pub fn client(module_id: impl Into<String>, props: Value) -> Self {
        Self::Client(ClientNode {
            module_id: module_id.into(),
            props,
        })
    }

    /// Concatenated text of all evaluated text nodes, for diagnostics and
    /// tests. Server and client nodes contribute nothing.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Self::Text(t) => out.push_str(t),
            Self::Data(Value::String(s)) => out.push_str(s),
            Self::Data(_) | Self::Server(_) | Self::Client(_) => {}
            Self::Element(el) => el.children.iter().for_each(|c| c.collect_text(out)),
            Self::Fragment(children) => children.iter().for_each(|c| c.collect_text(out)),
            Self::Segment { child, .. } => child.collect_text(out),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Self::Data(v) => f.debug_tuple("Data").field(v).finish(),
            Self::Element(el) => el.fmt(f),
            Self::Fragment(children) => f.debug_tuple("Fragment").field(children).finish(),
            Self::Segment { key, child } => f
                .debug_struct("Segment")
                .field("key", key)
                .field("child", child)
                .finish(),
            Self::Server(s) => f.debug_tuple("Server").field(&s.name).finish(),
            Self::Client(c) => c.fmt(f),
        }
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Self::Element(el)
    }
}

/// A host element.
#[derive(Debug, Clone)]
pub struct Element {
    /// Tag name.
    pub tag: String,
    /// Attributes.
    pub props: Props,
    /// Children.
    pub children: Vec<Node>,
}

impl Element {
    /// Create a new element.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            props: Props::new(),
            children: Vec::new(),
        }
    }

    /// Set an attribute.
    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Append a child.
    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Append several children.
    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }
}

/// A server component.
#[derive(Clone)]
pub struct ServerNode {
    /// Component name, for logs and error messages.
    pub name: String,
    render: ServerFn,
}

impl ServerNode {
    /// Start evaluating the component.
    pub fn call(&self) -> NodeFuture {
        (self.render)()
    }
}

/// A client-boundary placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientNode {
    /// Stable module identifier (`"path#Export"`).
    pub module_id: String,
    /// Serializable props handed to the client implementation.
    pub props: Value,
}
