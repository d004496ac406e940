//! Request context with typed parameters.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::TimingContext;
use crate::state::SlotId;

/// Unique request identifier for tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self(format!("{:x}-{:08x}", nanos, rand::random::<u32>()))
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extracted route parameters (e.g., `:id` from `/items/:id`).
pub type RouteParams = HashMap<String, String>;

/// Query string parameters.
pub type QueryParams = HashMap<String, String>;

type Slot = Arc<dyn Any + Send + Sync>;

struct ContextInner {
    request_id: RequestId,
    method: Method,
    path: String,
    query: QueryParams,
    headers: HeaderMap,
    params: RwLock<RouteParams>,
    response_headers: Mutex<HeaderMap>,
    values: Mutex<HashMap<String, Value>>,
    slots: Mutex<HashMap<SlotId, Slot>>,
    slot_init: Mutex<HashMap<SlotId, Arc<Mutex<()>>>>,
    app: Option<Arc<dyn Any + Send + Sync>>,
    session: Mutex<Option<String>>,
    cancel: CancellationToken,
    timing: Mutex<TimingContext>,
}

/// Request-scoped state handle.
///
/// Cloning is cheap and every clone refers to the same request. A context
/// is created when a request (or action invocation) starts and is dropped
/// once every clone, including the ones captured by deferred subtrees, is
/// gone. Nothing in it is shared with any other request.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

impl RequestContext {
    /// Create a new request context.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self::builder(method, path).build()
    }

    /// Start building a request context.
    pub fn builder(method: Method, path: impl Into<String>) -> RequestContextBuilder {
        RequestContextBuilder::new(method, path)
    }

    /// Build a context from an incoming HTTP request.
    pub fn from_http<B>(req: &http::Request<B>) -> Self {
        let uri = req.uri();
        let mut builder = Self::builder(req.method().clone(), uri.path())
            .headers(req.headers().clone());
        if let Some(query) = uri.query() {
            builder = builder.query(parse_query(query));
        }
        builder.build()
    }

    /// Unique request identifier.
    pub fn request_id(&self) -> &RequestId {
        &self.inner.request_id
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// Request path.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Get a query parameter by name.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.inner.query.get(name).map(|s| s.as_str())
    }

    /// All query parameters.
    pub fn query(&self) -> &QueryParams {
        &self.inner.query
    }

    /// Get an incoming header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    /// Incoming headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    /// Get a route parameter by name.
    pub fn param(&self, name: &str) -> Option<String> {
        self.inner.params.read().get(name).cloned()
    }

    /// Snapshot of the route parameters.
    pub fn params(&self) -> RouteParams {
        self.inner.params.read().clone()
    }

    /// Replace the route parameters once the route has been matched.
    pub fn set_params(&self, params: RouteParams) {
        *self.inner.params.write() = params;
    }

    /// Set an outgoing response header.
    ///
    /// Only takes effect while the response head has not been sent.
    pub fn set_response_header(&self, name: HeaderName, value: HeaderValue) {
        self.inner.response_headers.lock().insert(name, value);
    }

    /// Append an outgoing response header without replacing existing ones.
    pub fn append_response_header(&self, name: HeaderName, value: HeaderValue) {
        self.inner.response_headers.lock().append(name, value);
    }

    /// Snapshot of the outgoing response headers.
    pub fn response_headers(&self) -> HeaderMap {
        self.inner.response_headers.lock().clone()
    }

    /// Store a request-scoped value under a string key.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.inner.values.lock().insert(key.into(), value);
    }

    /// Read a request-scoped value by string key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.values.lock().get(key).cloned()
    }

    /// Remove a request-scoped value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.values.lock().remove(key)
    }

    /// Derived application context, if one was attached at build time.
    pub fn app<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.app.as_ref().and_then(|a| a.downcast_ref::<T>())
    }

    /// Session identifier carried by this request, if any.
    pub fn session_id(&self) -> Option<String> {
        self.inner.session.lock().clone()
    }

    /// Attach a session identifier to this request.
    pub fn set_session_id(&self, id: impl Into<String>) {
        *self.inner.session.lock() = Some(id.into());
    }

    /// Cancellation token tripped when the connection goes away.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Cancel all outstanding work for this request.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    /// Whether this request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Record a timing mark.
    pub fn mark(&self, name: &str) {
        self.inner.timing.lock().mark(name);
    }

    /// Snapshot of the timing context.
    pub fn timing(&self) -> TimingContext {
        self.inner.timing.lock().clone()
    }

    /// Whether two handles refer to the same request.
    pub fn same_request(&self, other: &RequestContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn slot(&self, id: SlotId) -> Option<Slot> {
        self.inner.slots.lock().get(&id).cloned()
    }

    /// Insert a slot value unless one is already present; returns the winner.
    pub(crate) fn slot_or_insert(&self, id: SlotId, value: Slot) -> Slot {
        self.inner
            .slots
            .lock()
            .entry(id)
            .or_insert(value)
            .clone()
    }

    /// Lock serializing first-time creation of one slot.
    pub(crate) fn slot_init_lock(&self, id: SlotId) -> Arc<Mutex<()>> {
        Arc::clone(self.inner.slot_init.lock().entry(id).or_default())
    }

    pub(crate) fn set_slot(&self, id: SlotId, value: Slot) {
        self.inner.slots.lock().insert(id, value);
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.inner.request_id)
            .field("method", &self.inner.method)
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RequestContext`].
pub struct RequestContextBuilder {
    request_id: Option<RequestId>,
    method: Method,
    path: String,
    query: QueryParams,
    headers: HeaderMap,
    params: RouteParams,
    app: Option<Arc<dyn Any + Send + Sync>>,
    session: Option<String>,
    cancel: Option<CancellationToken>,
}

impl RequestContextBuilder {
    /// Create a new builder.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: None,
            method,
            path: path.into(),
            query: QueryParams::new(),
            headers: HeaderMap::new(),
            params: RouteParams::new(),
            app: None,
            session: None,
            cancel: None,
        }
    }

    /// Use an explicit request ID instead of generating one.
    pub fn request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Set query parameters.
    pub fn query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    /// Set incoming headers.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set route parameters.
    pub fn params(mut self, params: RouteParams) -> Self {
        self.params = params;
        self
    }

    /// Attach derived application context.
    pub fn app<T: Any + Send + Sync>(mut self, app: T) -> Self {
        self.app = Some(Arc::new(app));
        self
    }

    /// Attach an already shared application context.
    pub fn app_shared(mut self, app: Arc<dyn Any + Send + Sync>) -> Self {
        self.app = Some(app);
        self
    }

    /// Seed the session identifier.
    pub fn session(mut self, id: impl Into<String>) -> Self {
        self.session = Some(id.into());
        self
    }

    /// Use a caller-provided cancellation token (e.g. a child of the
    /// connection's token).
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the context.
    pub fn build(self) -> RequestContext {
        RequestContext {
            inner: Arc::new(ContextInner {
                request_id: self.request_id.unwrap_or_else(RequestId::generate),
                method: self.method,
                path: self.path,
                query: self.query,
                headers: self.headers,
                params: RwLock::new(self.params),
                response_headers: Mutex::new(HeaderMap::new()),
                values: Mutex::new(HashMap::new()),
                slots: Mutex::new(HashMap::new()),
                slot_init: Mutex::new(HashMap::new()),
                app: self.app,
                session: Mutex::new(self.session),
                cancel: self.cancel.unwrap_or_default(),
                timing: Mutex::new(TimingContext::new()),
            }),
        }
    }
}

/// Parse a raw query string into key/value pairs.
///
/// Keys without a value map to an empty string; later duplicates win.
pub fn parse_query(query: &str) -> QueryParams {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}
