//! Route definitions.

use std::fmt;
use std::sync::Arc;

use http::Method;
use tandem_core::{Node, RequestContext};

use crate::middleware::Middleware;
use crate::pattern::RoutePattern;

/// Produces the page tree for a matched route.
pub trait Page: Send + Sync {
    /// Build the page's component tree.
    fn render(&self, cx: &RequestContext) -> Node;
}

impl<F> Page for F
where
    F: Fn(&RequestContext) -> Node + Send + Sync,
{
    fn render(&self, cx: &RequestContext) -> Node {
        self(cx)
    }
}

/// Wraps a nested tree (a page or an inner layout) in shared markup.
pub trait Layout: Send + Sync {
    /// Wrap `children`.
    fn wrap(&self, cx: &RequestContext, children: Node) -> Node;
}

impl<F> Layout for F
where
    F: Fn(&RequestContext, Node) -> Node + Send + Sync,
{
    fn wrap(&self, cx: &RequestContext, children: Node) -> Node {
        self(cx, children)
    }
}

/// A registered route.
///
/// Immutable once registered with a [`RouteTable`](crate::RouteTable).
pub struct Route {
    pub(crate) pattern: String,
    pub(crate) parsed: Option<RoutePattern>,
    pub(crate) methods: Vec<Method>,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) layouts: Vec<Arc<dyn Layout>>,
    pub(crate) page: Option<Arc<dyn Page>>,
    pub(crate) name: Option<String>,
}

impl Route {
    /// Start a route for `pattern` accepting GET.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            parsed: None,
            methods: vec![Method::GET],
            middleware: Vec::new(),
            layouts: Vec::new(),
            page: None,
            name: None,
        }
    }

    /// Replace the accepted methods.
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    /// Also accept `method`.
    pub fn method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    /// Append a middleware/handler to the chain.
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Append a route-level layout (inside any table-level layouts).
    pub fn layout(mut self, layout: impl Layout + 'static) -> Self {
        self.layouts.push(Arc::new(layout));
        self
    }

    /// Set the page renderer.
    pub fn page(mut self, page: impl Page + 'static) -> Self {
        self.page = Some(Arc::new(page));
        self
    }

    /// Set a name for logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The pattern as written.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Accepted methods.
    pub fn accepted_methods(&self) -> &[Method] {
        &self.methods
    }

    /// Route name, falling back to the pattern.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.pattern)
    }

    /// Middleware chain.
    pub fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    /// Whether the route renders a page.
    pub fn has_page(&self) -> bool {
        self.page.is_some()
    }

    pub(crate) fn accepts(&self, method: &Method) -> bool {
        self.methods.contains(method) || (*method == Method::HEAD && self.methods.contains(&Method::GET))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("methods", &self.methods)
            .field("middleware", &self.middleware.len())
            .field("layouts", &self.layouts.len())
            .field("page", &self.page.is_some())
            .finish()
    }
}
