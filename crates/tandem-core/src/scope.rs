//! Request context propagation across await points.
//!
//! The current request is held in a tokio task-local that is
//! re-established on every poll of the scoped future, so a continuation
//! resumed after a suspension point always sees the request that created
//! it, even when many requests interleave on the same worker threads.
//! Work that leaves the task (spawned tasks, futures handed to another
//! driver) must capture the context explicitly with [`RequestScope`] or
//! [`spawn_scoped`].

use std::future::Future;

use tokio::task::futures::TaskLocalFuture;
use tokio::task::JoinHandle;

use crate::context::RequestContext;
use crate::error::TandemError;

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// Run `fut` with `cx` as the current request for its full dynamic extent.
pub async fn with_request<F>(cx: RequestContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(cx, fut).await
}

/// Wrap `fut` so that it runs under `cx` whenever it is polled.
///
/// Unlike [`with_request`] this does not await; the returned future can
/// be stored and driven elsewhere (e.g. in a `FuturesUnordered`).
pub fn scoped<F>(cx: RequestContext, fut: F) -> TaskLocalFuture<RequestContext, F>
where
    F: Future,
{
    CURRENT.scope(cx, fut)
}

/// Run a synchronous closure with `cx` as the current request.
pub fn with_request_sync<R>(cx: RequestContext, f: impl FnOnce() -> R) -> R {
    CURRENT.sync_scope(cx, f)
}

/// The request currently in scope, if any.
pub fn current() -> Option<RequestContext> {
    CURRENT.try_with(|cx| cx.clone()).ok()
}

/// The request currently in scope, or `NoActiveRequest`.
pub fn try_current() -> Result<RequestContext, TandemError> {
    current().ok_or(TandemError::NoActiveRequest)
}

/// Spawn a task that inherits the current request context.
pub fn spawn_scoped<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    RequestScope::capture().spawn(fut)
}

/// An explicitly captured request scope.
///
/// Capture it where the work is created and re-enter it where the work
/// runs.
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    cx: Option<RequestContext>,
}

impl RequestScope {
    /// Capture whatever request is current (possibly none).
    pub fn capture() -> Self {
        Self { cx: current() }
    }

    /// Scope bound to a specific request.
    pub fn of(cx: RequestContext) -> Self {
        Self { cx: Some(cx) }
    }

    /// The captured context.
    pub fn context(&self) -> Option<&RequestContext> {
        self.cx.as_ref()
    }

    /// Run `fut` inside the captured scope.
    pub async fn run<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        match self.cx {
            Some(cx) => with_request(cx, fut).await,
            None => fut.await,
        }
    }

    /// Spawn `fut` on the runtime inside the captured scope.
    pub fn spawn<F>(self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(self.run(fut))
    }
}
