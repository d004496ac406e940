//! Middleware chain.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use http::{Response, StatusCode};
use tandem_core::{RequestContext, TandemError};

/// Body of a terminal response produced by middleware.
pub type TerminalResponse = Response<Vec<u8>>;

/// Outcome of one middleware step.
#[derive(Debug)]
pub enum Flow {
    /// Let the chain continue.
    Continue,
    /// Stop the chain and answer with this response.
    Respond(TerminalResponse),
}

impl Flow {
    /// Terminal response with a status and body.
    pub fn respond(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        let mut response = Response::new(body.into());
        *response.status_mut() = status;
        Self::Respond(response)
    }

    /// Terminal redirect.
    pub fn redirect(location: &str) -> Self {
        let mut response = Response::new(Vec::new());
        *response.status_mut() = StatusCode::SEE_OTHER;
        if let Ok(value) = http::HeaderValue::from_str(location) {
            response.headers_mut().insert(http::header::LOCATION, value);
        }
        Self::Respond(response)
    }

    /// Whether this step short-circuits the chain.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Respond(_))
    }
}

/// A step of a route's handler chain.
///
/// A middleware may inspect or mutate the request context (including the
/// outgoing response headers) and either continue or short-circuit.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Handle the request.
    async fn handle(&self, cx: &RequestContext) -> Result<Flow, TandemError>;

    /// Name for logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

struct FnMiddleware<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Flow, TandemError>> + Send,
{
    async fn handle(&self, cx: &RequestContext) -> Result<Flow, TandemError> {
        (self.f)(cx.clone()).await
    }

    fn name(&self) -> &str {
        "fn"
    }
}

/// Build a middleware from an async closure.
pub fn middleware_fn<F, Fut>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Flow, TandemError>> + Send + 'static,
{
    Arc::new(FnMiddleware { f })
}

/// Run a chain in order, stopping at the first terminal step.
pub async fn run_chain(
    chain: &[Arc<dyn Middleware>],
    cx: &RequestContext,
) -> Result<Flow, TandemError> {
    for middleware in chain {
        match middleware.handle(cx).await? {
            Flow::Continue => continue,
            Flow::Respond(response) => {
                tracing::debug!(
                    request_id = %cx.request_id(),
                    middleware = middleware.name(),
                    status = response.status().as_u16(),
                    "middleware short-circuited"
                );
                return Ok(Flow::Respond(response));
            }
        }
    }
    Ok(Flow::Continue)
}
