//! Server function invocation.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;
use tandem_core::{with_request, RequestContext};
use tandem_registry::{ActionOutcome, InvalidArguments, ModuleRegistry};
use tandem_render::Renderer;

use crate::envelope::{ActionEnvelope, ActionRequest};
use crate::error::ActionError;

/// Default path of the action endpoint.
pub const DEFAULT_ACTION_PATH: &str = "/_action";

/// Ambient request state an action starts from.
///
/// Only the session and incoming headers carry over from the calling
/// request; everything else in the action's context starts empty.
#[derive(Clone, Default)]
pub struct ActionSeed {
    session_id: Option<String>,
    headers: HeaderMap,
    app: Option<Arc<dyn Any + Send + Sync>>,
}

impl ActionSeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the request that carried the action call.
    pub fn from_context(cx: &RequestContext) -> Self {
        Self {
            session_id: cx.session_id(),
            headers: cx.headers().clone(),
            app: None,
        }
    }

    pub fn with_session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Share derived application context with the action.
    pub fn with_app(mut self, app: Arc<dyn Any + Send + Sync>) -> Self {
        self.app = Some(app);
        self
    }

    fn into_context(self, path: &str) -> RequestContext {
        let mut builder = RequestContext::builder(Method::POST, path).headers(self.headers);
        if let Some(session) = self.session_id {
            builder = builder.session(session);
        }
        if let Some(app) = self.app {
            builder = builder.app_shared(app);
        }
        builder.build()
    }
}

impl std::fmt::Debug for ActionSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSeed")
            .field("session_id", &self.session_id)
            .field("headers", &self.headers.len())
            .field("app", &self.app.is_some())
            .finish()
    }
}

/// Dispatches action calls to registered server functions.
///
/// Every call is one unit of work: it runs to completion in its own
/// request context and is never resumed.
#[derive(Debug, Clone)]
pub struct ActionChannel {
    registry: Arc<ModuleRegistry>,
    renderer: Renderer,
    path: String,
}

impl ActionChannel {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            renderer: Renderer::new(Arc::clone(&registry)),
            registry,
            path: DEFAULT_ACTION_PATH.to_string(),
        }
    }

    /// Render `rerender` outcomes with this renderer.
    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Handle a raw request body.
    pub async fn handle(&self, body: &[u8], seed: ActionSeed) -> ActionEnvelope {
        match ActionRequest::from_slice(body) {
            Ok(request) => self.invoke(&request.reference_id, request.args, seed).await,
            Err(err) => {
                tracing::debug!(error = %err, "rejected action body");
                ActionEnvelope::error(&err)
            }
        }
    }

    /// Invoke the server function registered under `reference_id`.
    pub async fn invoke(&self, reference_id: &str, args: Value, seed: ActionSeed) -> ActionEnvelope {
        match self.try_invoke(reference_id, args, seed).await {
            Ok(envelope) => envelope,
            Err(err) => {
                if err.status() >= 500 {
                    tracing::error!(action = reference_id, error = %err, "action failed");
                } else {
                    tracing::debug!(action = reference_id, error = %err, "action rejected");
                }
                ActionEnvelope::error(&err)
            }
        }
    }

    /// Like [`invoke`](Self::invoke), but returns failures as errors.
    pub async fn try_invoke(
        &self,
        reference_id: &str,
        args: Value,
        seed: ActionSeed,
    ) -> Result<ActionEnvelope, ActionError> {
        let function = self
            .registry
            .server_function(reference_id)
            .map_err(|_| ActionError::UnknownReference(reference_id.to_string()))?
            .clone();

        let cx = seed.into_context(&self.path);
        let start = Instant::now();
        tracing::debug!(
            request_id = %cx.request_id(),
            action = reference_id,
            function = function.name(),
            "invoking action"
        );

        let outcome = with_request(cx.clone(), function.call(args))
            .await
            .map_err(|err| match err.downcast_ref::<InvalidArguments>() {
                Some(invalid) => ActionError::InvalidArguments(invalid.to_string()),
                None => ActionError::Failed {
                    id: reference_id.to_string(),
                    source: err,
                },
            })?;

        let envelope = match outcome {
            ActionOutcome::Value(value) => ActionEnvelope::value(value),
            ActionOutcome::Redirect(location) => ActionEnvelope::redirect(location),
            ActionOutcome::Rerender(tree) => {
                let frames = self
                    .renderer
                    .render_to_frames(tree, &cx)
                    .await
                    .map_err(|source| ActionError::Render {
                        id: reference_id.to_string(),
                        source,
                    })?;
                ActionEnvelope::rerender(&frames)
            }
        };

        tracing::info!(
            request_id = %cx.request_id(),
            action = reference_id,
            kind = ?envelope.kind,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "action completed"
        );
        Ok(envelope)
    }
}
