//! The route table.

use std::fmt;
use std::sync::Arc;

use http::Method;
use tandem_core::{Node, RequestContext, RouteParams, TandemError};

use crate::middleware::{run_chain, Flow, Middleware};
use crate::pattern::RoutePattern;
use crate::route::{Layout, Page, Route};

struct LayoutEntry {
    prefix: RoutePattern,
    layout: Arc<dyn Layout>,
}

/// Ordered route table.
///
/// Routes, layouts and middleware are registered at startup; afterwards
/// the table is only read and can be shared across requests behind an
/// `Arc` without locking.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
    layouts: Vec<LayoutEntry>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route. Registration order is match order.
    pub fn route(&mut self, mut route: Route) -> Result<&mut Self, TandemError> {
        let parsed = RoutePattern::parse(&route.pattern)
            .map_err(|e| TandemError::Config(e.to_string()))?;
        route.parsed = Some(parsed);
        tracing::debug!(pattern = %route.pattern, methods = ?route.methods, "route registered");
        self.routes.push(Arc::new(route));
        Ok(self)
    }

    /// Register a GET route from a pattern, a handler chain and a page.
    pub fn register(
        &mut self,
        pattern: &str,
        handlers: Vec<Arc<dyn Middleware>>,
        page: impl Page + 'static,
    ) -> Result<&mut Self, TandemError> {
        let route = handlers
            .into_iter()
            .fold(Route::new(pattern), |route, handler| route.with(handler))
            .page(page);
        self.route(route)
    }

    /// Register a layout for every path under `prefix`.
    pub fn layout(
        &mut self,
        prefix: &str,
        layout: impl Layout + 'static,
    ) -> Result<&mut Self, TandemError> {
        let prefix =
            RoutePattern::parse(prefix).map_err(|e| TandemError::Config(e.to_string()))?;
        self.layouts.push(LayoutEntry {
            prefix,
            layout: Arc::new(layout),
        });
        Ok(self)
    }

    /// Register middleware that runs before every route's own chain.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Registered routes in match order.
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the first route matching `method` and `path`.
    pub fn match_route(&self, method: &Method, path: &str) -> Result<RouteMatch, TandemError> {
        let mut path_matched = false;

        for route in &self.routes {
            let Some(pattern) = route.parsed.as_ref() else {
                continue;
            };
            let Some(captures) = pattern.matches(path) else {
                continue;
            };
            if !route.accepts(method) {
                path_matched = true;
                continue;
            }

            tracing::debug!(
                method = %method,
                path,
                pattern = %route.pattern,
                "route matched"
            );
            return Ok(RouteMatch {
                route: Arc::clone(route),
                params: captures.params,
                wildcard: captures.wildcard,
                path: normalize(path),
                layouts: self.matching_layouts(route, path),
                chain: self
                    .middleware
                    .iter()
                    .chain(route.middleware.iter())
                    .cloned()
                    .collect(),
            });
        }

        if path_matched {
            Err(TandemError::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
            })
        } else {
            Err(TandemError::RouteNotFound(path.to_string()))
        }
    }

    /// Table layouts (outermost first by prefix depth, then registration
    /// order) followed by the route's own layouts.
    fn matching_layouts(&self, route: &Route, path: &str) -> Vec<MatchedLayout> {
        let mut table: Vec<(usize, MatchedLayout)> = self
            .layouts
            .iter()
            .filter_map(|entry| {
                let (_, concrete) = entry.prefix.matches_prefix(path)?;
                Some((
                    entry.prefix.depth(),
                    MatchedLayout {
                        key: format!("layout:{}@{}", entry.prefix, concrete),
                        layout: Arc::clone(&entry.layout),
                    },
                ))
            })
            .collect();
        table.sort_by_key(|(depth, _)| *depth);

        let own = route
            .layouts
            .iter()
            .enumerate()
            .map(|(index, layout)| MatchedLayout {
                key: format!("route:{}#{}", route.pattern, index),
                layout: Arc::clone(layout),
            });

        table.into_iter().map(|(_, layout)| layout).chain(own).collect()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes)
            .field("layouts", &self.layouts.len())
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

struct MatchedLayout {
    key: String,
    layout: Arc<dyn Layout>,
}

/// Result of a successful match.
pub struct RouteMatch {
    /// The matched route.
    pub route: Arc<Route>,
    /// Captured parameters.
    pub params: RouteParams,
    /// Remaining path captured by a wildcard.
    pub wildcard: Option<String>,
    /// Normalized request path.
    pub path: String,
    layouts: Vec<MatchedLayout>,
    chain: Vec<Arc<dyn Middleware>>,
}

impl RouteMatch {
    /// Get a captured parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Full handler chain: table middleware, then route middleware.
    pub fn chain(&self) -> &[Arc<dyn Middleware>] {
        &self.chain
    }

    /// Segment keys of the matched layouts, outermost first.
    pub fn layout_keys(&self) -> Vec<&str> {
        self.layouts.iter().map(|l| l.key.as_str()).collect()
    }

    /// Segment key of the page itself.
    pub fn page_key(&self) -> String {
        format!("page:{}", self.path)
    }

    /// Run the handler chain against `cx`.
    pub async fn run_middleware(&self, cx: &RequestContext) -> Result<Flow, TandemError> {
        run_chain(&self.chain, cx).await
    }

    /// Build the page tree wrapped in its layouts.
    ///
    /// The innermost layout wraps the page and the outermost layout wraps
    /// everything else. Every level is enclosed in a `Segment` keyed by
    /// its concrete boundary so clients can tell which parts changed on
    /// navigation.
    pub fn render(&self, cx: &RequestContext) -> Result<Node, TandemError> {
        let page = self.route.page.as_ref().ok_or_else(|| {
            TandemError::Config(format!("route {} has no page", self.route.pattern))
        })?;

        let tree = Node::segment(self.page_key(), page.render(cx));
        Ok(self.layouts.iter().rev().fold(tree, |children, layout| {
            Node::segment(layout.key.clone(), layout.layout.wrap(cx, children))
        }))
    }
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("pattern", &self.route.pattern)
            .field("params", &self.params)
            .field("wildcard", &self.wildcard)
            .field("layouts", &self.layout_keys())
            .finish()
    }
}

fn normalize(path: &str) -> String {
    let parts: Vec<&str> = crate::pattern::split_path(path).collect();
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::middleware_fn;
    use http::{HeaderValue, StatusCode};
    use tandem_core::Element;

    fn text_page(text: &'static str) -> impl Page {
        move |_cx: &RequestContext| Node::text(text)
    }

    fn cx(path: &str) -> RequestContext {
        RequestContext::new(Method::GET, path)
    }

    /// Flatten a tree into bracketed markup so nesting is visible.
    fn markup(node: &Node) -> String {
        match node {
            Node::Text(t) => t.clone(),
            Node::Element(el) => format!(
                "<{}>{}</{}>",
                el.tag,
                el.children.iter().map(markup).collect::<String>(),
                el.tag
            ),
            Node::Fragment(children) => children.iter().map(markup).collect(),
            Node::Segment { child, .. } => markup(child),
            _ => String::new(),
        }
    }

    // === Matching Tests ===

    #[test]
    fn test_match_params() {
        let mut table = RouteTable::new();
        table.register("/items/:id", vec![], text_page("item")).unwrap();

        let matched = table.match_route(&Method::GET, "/items/42").unwrap();
        assert_eq!(matched.param("id"), Some("42"));
        assert_eq!(matched.params.len(), 1);
        assert_eq!(matched.path, "/items/42");
    }

    #[test]
    fn test_first_registered_wins() {
        let mut table = RouteTable::new();
        table.register("/items/*", vec![], text_page("catch-all")).unwrap();
        table.register("/items/:id", vec![], text_page("specific")).unwrap();

        let matched = table.match_route(&Method::GET, "/items/42").unwrap();
        assert_eq!(matched.route.pattern(), "/items/*");
        assert!(matched.params.is_empty());
        assert_eq!(matched.wildcard.as_deref(), Some("42"));
    }

    #[test]
    fn test_specific_before_catch_all() {
        let mut table = RouteTable::new();
        table.register("/items/new", vec![], text_page("new")).unwrap();
        table.register("/items/:id", vec![], text_page("item")).unwrap();
        table.register("/*", vec![], text_page("404")).unwrap();

        assert_eq!(
            table.match_route(&Method::GET, "/items/new").unwrap().route.pattern(),
            "/items/new"
        );
        assert_eq!(
            table.match_route(&Method::GET, "/items/9").unwrap().route.pattern(),
            "/items/:id"
        );
        assert_eq!(
            table.match_route(&Method::GET, "/nowhere").unwrap().route.pattern(),
            "/*"
        );
    }

    #[test]
    fn test_route_not_found() {
        let mut table = RouteTable::new();
        table.register("/", vec![], text_page("home")).unwrap();

        assert!(matches!(
            table.match_route(&Method::GET, "/missing"),
            Err(TandemError::RouteNotFound(p)) if p == "/missing"
        ));
    }

    #[test]
    fn test_method_not_allowed() {
        let mut table = RouteTable::new();
        table.register("/form", vec![], text_page("form")).unwrap();

        assert!(matches!(
            table.match_route(&Method::POST, "/form"),
            Err(TandemError::MethodNotAllowed { .. })
        ));
        assert!(table.match_route(&Method::HEAD, "/form").is_ok());
    }

    #[test]
    fn test_method_mismatch_keeps_scanning() {
        let mut table = RouteTable::new();
        table
            .route(Route::new("/submit").methods([Method::POST]).page(text_page("post")))
            .unwrap();
        table.register("/submit", vec![], text_page("get")).unwrap();

        let matched = table.match_route(&Method::GET, "/submit").unwrap();
        assert_eq!(matched.route.accepted_methods(), &[Method::GET]);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut table = RouteTable::new();
        assert!(matches!(
            table.register("no-slash", vec![], text_page("x")),
            Err(TandemError::Config(_))
        ));
        assert!(table.is_empty());
    }

    // === Middleware Tests ===

    #[tokio::test]
    async fn test_table_middleware_runs_before_route_middleware() {
        let mut table = RouteTable::new();
        table.use_middleware(middleware_fn(|cx| async move {
            cx.insert("order", serde_json::json!(["table"]));
            Ok(Flow::Continue)
        }));
        table
            .register(
                "/",
                vec![middleware_fn(|cx| async move {
                    let mut order = cx.get("order").unwrap_or_default();
                    if let Some(list) = order.as_array_mut() {
                        list.push("route".into());
                    }
                    cx.insert("order", order);
                    cx.set_response_header(
                        http::header::CACHE_CONTROL,
                        HeaderValue::from_static("private"),
                    );
                    Ok(Flow::Continue)
                })],
                text_page("home"),
            )
            .unwrap();

        let request = cx("/");
        let matched = table.match_route(&Method::GET, "/").unwrap();
        assert_eq!(matched.chain().len(), 2);

        let flow = matched.run_middleware(&request).await.unwrap();
        assert!(!flow.is_terminal());
        assert_eq!(request.get("order"), Some(serde_json::json!(["table", "route"])));
        assert_eq!(
            request.response_headers().get(http::header::CACHE_CONTROL).unwrap(),
            "private"
        );
    }

    #[tokio::test]
    async fn test_route_middleware_short_circuit() {
        let mut table = RouteTable::new();
        table
            .register(
                "/admin",
                vec![middleware_fn(|_cx| async {
                    Ok(Flow::respond(StatusCode::FORBIDDEN, "forbidden"))
                })],
                text_page("admin"),
            )
            .unwrap();

        let matched = table.match_route(&Method::GET, "/admin").unwrap();
        let flow = matched.run_middleware(&cx("/admin")).await.unwrap();
        assert!(flow.is_terminal());
    }

    // === Layout Tests ===

    #[test]
    fn test_layouts_nest_outside_in() {
        let mut table = RouteTable::new();
        table
            .layout("/dashboard", |_cx: &RequestContext, children: Node| {
                Element::new("section").child(children).into()
            })
            .unwrap();
        table
            .layout("/", |_cx: &RequestContext, children: Node| {
                Element::new("html").child(children).into()
            })
            .unwrap();
        table
            .route(
                Route::new("/dashboard/:tab")
                    .layout(|_cx: &RequestContext, children: Node| {
                        Element::new("div").child(children).into()
                    })
                    .page(text_page("stats")),
            )
            .unwrap();

        let request = cx("/dashboard/stats");
        let matched = table.match_route(&Method::GET, "/dashboard/stats").unwrap();
        let tree = matched.render(&request).unwrap();

        assert_eq!(
            markup(&tree),
            "<html><section><div>stats</div></section></html>"
        );
        assert_eq!(
            matched.layout_keys(),
            vec![
                "layout:/@/",
                "layout:/dashboard@/dashboard",
                "route:/dashboard/:tab#0"
            ]
        );
    }

    #[test]
    fn test_render_wraps_segments() {
        let mut table = RouteTable::new();
        table
            .layout("/", |_cx: &RequestContext, children: Node| children)
            .unwrap();
        table.register("/items/:id", vec![], text_page("item")).unwrap();

        let matched = table.match_route(&Method::GET, "/items/7/").unwrap();
        let tree = matched.render(&cx("/items/7")).unwrap();

        match tree {
            Node::Segment { key, child } => {
                assert_eq!(key, "layout:/@/");
                assert!(matches!(*child, Node::Segment { ref key, .. } if key == "page:/items/7"));
            }
            other => panic!("expected segment, got {:?}", other),
        }
    }

    #[test]
    fn test_render_without_page_fails() {
        let mut table = RouteTable::new();
        table.route(Route::new("/hook")).unwrap();

        let matched = table.match_route(&Method::GET, "/hook").unwrap();
        assert!(!matched.route.has_page());
        assert!(matches!(
            matched.render(&cx("/hook")),
            Err(TandemError::Config(_))
        ));
    }
}
