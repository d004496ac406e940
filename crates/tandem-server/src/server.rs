//! Request handling over `http` types.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::channel::mpsc;
use futures::StreamExt;
use http::header::{self, HeaderMap, HeaderValue};
use http::request::Parts;
use http::{Method, Request, Response, StatusCode, Uri};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tandem_actions::{ActionChannel, ActionEnvelope, ActionSeed, EnvelopeKind};
use tandem_core::{parse_query, scoped, Node, RequestContext, TandemError};
use tandem_observability::{request_span, MetricsCollector, SubtreeOutcome};
use tandem_registry::ModuleRegistry;
use tandem_render::{RenderStream, Renderer, SsrRenderer, SsrTable};
use tandem_router::{Flow, RouteTable};
use tandem_store::{SessionId, SessionStore, Storage};
use tandem_streaming::{
    escape_html, FlushController, Frame, FrameEncoder, FrameKind, FrameSink, Shell, StreamError,
    FRAME_CONTENT_TYPE,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::body::{respond, HttpResponse, ResponseBody};
use crate::config::TandemConfig;

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Encoded chunks buffered between the render task and the response body.
const FRAME_CHANNEL_CAPACITY: usize = 16;

type BodySink = FrameSink<mpsc::Sender<Vec<u8>>, mpsc::SendError>;

pub(crate) struct ServerParts {
    pub config: TandemConfig,
    pub routes: RouteTable,
    pub registry: ModuleRegistry,
    pub ssr: SsrTable,
    pub storage: Option<Arc<dyn Storage>>,
    pub state: Option<Arc<dyn Any + Send + Sync>>,
}

struct ServerInner {
    config: TandemConfig,
    routes: RouteTable,
    renderer: Renderer,
    ssr: SsrRenderer,
    actions: ActionChannel,
    shell: Shell,
    error_shell: Shell,
    storage: Option<Arc<dyn Storage>>,
    state: Option<Arc<dyn Any + Send + Sync>>,
}

/// A built application, ready to answer requests.
///
/// Cheap to clone; every table is frozen and shared without locking.
/// Each request gets its own [`RequestContext`], which is the only
/// mutable state a request touches.
#[derive(Clone)]
pub struct TandemServer {
    inner: Arc<ServerInner>,
}

impl TandemServer {
    pub(crate) fn from_parts(parts: ServerParts) -> Self {
        let ServerParts {
            config,
            routes,
            registry,
            ssr,
            storage,
            state,
        } = parts;

        let registry = Arc::new(registry);
        let renderer = Renderer::new(Arc::clone(&registry)).with_options(config.render_options());
        let ssr = SsrRenderer::new(Arc::new(ssr)).with_options(config.render_options());
        let actions = ActionChannel::new(registry)
            .with_renderer(renderer.clone())
            .with_path(config.action_path.clone());
        let shell = config.shell();
        let error_shell = Shell::new(shell.head.clone());

        Self {
            inner: Arc::new(ServerInner {
                config,
                routes,
                renderer,
                ssr,
                actions,
                shell,
                error_shell,
                storage,
                state,
            }),
        }
    }

    pub fn config(&self) -> &TandemConfig {
        &self.inner.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.inner.routes
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        self.inner.renderer.registry()
    }

    /// The primary-pass renderer.
    pub fn renderer(&self) -> &Renderer {
        &self.inner.renderer
    }

    /// The SSR-pass renderer.
    pub fn ssr(&self) -> &SsrRenderer {
        &self.inner.ssr
    }

    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        self.inner.storage.as_ref()
    }

    /// Session data of type `T`, if the app has storage.
    pub fn sessions<T>(&self) -> Option<SessionStore<T>>
    where
        T: Serialize + DeserializeOwned + Default + Clone + Send + Sync,
    {
        self.inner
            .storage
            .as_ref()
            .map(|storage| SessionStore::new(Arc::clone(storage)))
    }

    /// Handle one request.
    pub async fn handle(&self, req: Request<Vec<u8>>) -> HttpResponse {
        self.handle_with_cancellation(req, CancellationToken::new()).await
    }

    /// Handle one request. Cancelling `token` (the client went away, the
    /// server is shutting down) stops the request's outstanding subtrees
    /// and ends its frame stream.
    pub async fn handle_with_cancellation(
        &self,
        req: Request<Vec<u8>>,
        token: CancellationToken,
    ) -> HttpResponse {
        let (parts, body) = req.into_parts();
        let (cx, new_session) = self.context(&parts, token);
        let span = request_span(&cx);
        let start = Instant::now();

        let work = async {
            let mut response = if parts.method == Method::POST
                && parts.uri.path() == self.inner.config.action_path
            {
                self.action(&body, &cx).await
            } else {
                self.page(&cx, &self.stream_url(&parts.uri)).await
            };

            if let Some(id) = new_session {
                match HeaderValue::from_str(&id.to_cookie()) {
                    Ok(cookie) => cx.append_response_header(header::SET_COOKIE, cookie),
                    Err(err) => tracing::warn!(error = %err, "unusable session cookie"),
                }
            }
            merge_headers(response.headers_mut(), &cx.response_headers());

            tracing::info!(
                status = response.status().as_u16(),
                streamed = response.body().is_stream(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "request handled"
            );
            response
        };

        scoped(cx.clone(), work).instrument(span).await
    }

    fn context(&self, parts: &Parts, token: CancellationToken) -> (RequestContext, Option<SessionId>) {
        let mut builder = RequestContext::builder(parts.method.clone(), parts.uri.path())
            .headers(parts.headers.clone())
            .cancellation(token);
        if let Some(query) = parts.uri.query() {
            builder = builder.query(parse_query(query));
        }
        if let Some(state) = &self.inner.state {
            builder = builder.app_shared(Arc::clone(state));
        }

        let cookie = parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(SessionId::from_cookie_header);
        let new_session = match cookie {
            Some(id) => {
                builder = builder.session(id.as_str());
                None
            }
            None if self.inner.storage.is_some() => {
                let id = SessionId::generate();
                builder = builder.session(id.as_str());
                Some(id)
            }
            None => None,
        };

        (builder.build(), new_session)
    }

    /// Url the client entry fetches the frame stream from.
    fn stream_url(&self, uri: &Uri) -> String {
        let param = &self.inner.config.stream_param;
        match uri.query() {
            Some(query) if !query.is_empty() => format!("{}?{}&{}", uri.path(), query, param),
            _ => format!("{}?{}", uri.path(), param),
        }
    }

    fn wants_frames(&self, cx: &RequestContext) -> bool {
        cx.query().contains_key(self.inner.config.stream_param.as_str())
            || cx
                .header("accept")
                .is_some_and(|accept| accept.contains(FRAME_CONTENT_TYPE))
    }

    async fn page(&self, cx: &RequestContext, stream_url: &str) -> HttpResponse {
        let matched = match self.inner.routes.match_route(cx.method(), cx.path()) {
            Ok(matched) => matched,
            Err(err) => return self.error_page(&err),
        };
        cx.set_params(matched.params.clone());
        let route = matched.route.display_name().to_string();
        tracing::debug!(route = %route, params = ?matched.params, "route matched");

        match matched.run_middleware(cx).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Respond(response)) => {
                tracing::debug!(status = response.status().as_u16(), "middleware responded");
                return response.map(ResponseBody::Full);
            }
            Err(err) => return self.error_page(&err),
        }

        let tree = match matched.render(cx) {
            Ok(tree) => tree,
            Err(err) => return self.error_page(&err),
        };

        if self.wants_frames(cx) {
            self.frames(tree, cx, route).await
        } else {
            self.document(tree, cx, stream_url).await
        }
    }

    /// Primary pass: the frame stream.
    async fn frames(&self, tree: Node, cx: &RequestContext, route: String) -> HttpResponse {
        let stream = match self.inner.renderer.render(tree, cx) {
            Ok(stream) => stream,
            Err(err) => return self.error_page(&err.into()),
        };
        let mut metrics = MetricsCollector::new(cx.request_id().clone());
        metrics.set_route(route);

        if !self.inner.config.streaming {
            let frames: Vec<Frame> = stream.collect().await;
            metrics.record_shell_sent(frames.len());
            metrics.finalize(Some(200)).log();
            return match FrameEncoder::new().encode_all(&frames) {
                Ok(bytes) => respond(StatusCode::OK, FRAME_CONTENT_TYPE, bytes),
                Err(err) => self.error_page(&err.into()),
            };
        }

        let (tx, rx) = mpsc::channel::<Vec<u8>>(FRAME_CHANNEL_CAPACITY);
        let sink = FrameSink::new(tx, cx.timing())
            .with_flush(FlushController::new(self.inner.config.flush));
        tokio::spawn(
            scoped(cx.clone(), pump(stream, sink, metrics, cx.clone()))
                .instrument(tracing::Span::current()),
        );

        // Dropping the body cancels the request.
        let guard = cx.cancellation().clone().drop_guard();
        let body = rx
            .map(move |chunk| {
                let _guard = &guard;
                chunk
            })
            .boxed();
        respond(StatusCode::OK, FRAME_CONTENT_TYPE, ResponseBody::Stream(body))
    }

    /// SSR pass: the first-paint document.
    async fn document(&self, tree: Node, cx: &RequestContext, stream_url: &str) -> HttpResponse {
        match self.inner.ssr.render(&tree, cx).await {
            Ok(output) => {
                tracing::debug!(islands = output.islands.len(), "document rendered");
                respond(
                    StatusCode::OK,
                    HTML_CONTENT_TYPE,
                    output.into_document(&self.inner.shell, stream_url),
                )
            }
            Err(err) => self.error_page(&err.into()),
        }
    }

    async fn action(&self, body: &[u8], cx: &RequestContext) -> HttpResponse {
        let mut seed = ActionSeed::from_context(cx);
        if let Some(state) = &self.inner.state {
            seed = seed.with_app(Arc::clone(state));
        }
        envelope_response(self.inner.actions.handle(body, seed).await)
    }

    /// Error page. Server-side failures never show their detail.
    fn error_page(&self, err: &TandemError) -> HttpResponse {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if status.is_server_error() {
            tracing::error!(error = %err, status = status.as_u16(), "request failed");
            "Something went wrong"
        } else {
            tracing::debug!(error = %err, status = status.as_u16(), "request rejected");
            status.canonical_reason().unwrap_or("Error")
        };

        let body = format!("<h1>{}</h1>\n<p>{}</p>", status.as_u16(), escape_html(message));
        respond(status, HTML_CONTENT_TYPE, self.inner.error_shell.render_document(&body, ""))
    }
}

impl fmt::Debug for TandemServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TandemServer")
            .field("app", &self.inner.config.name)
            .field("routes", &self.inner.routes.len())
            .field("storage", &self.inner.storage.is_some())
            .finish_non_exhaustive()
    }
}

/// Write the render into the response body, shell first.
async fn pump(mut stream: RenderStream, mut sink: BodySink, mut metrics: MetricsCollector, cx: RequestContext) {
    let shell_len = stream.shell_len();
    let shell: Vec<Frame> = (&mut stream).take(shell_len).collect().await;

    if let Err(err) = write_frames(&mut stream, &mut sink, &mut metrics, &shell).await {
        // The body receiver is gone; nobody is waiting for the rest.
        tracing::warn!(error = %err, frames = sink.frames_sent(), "frame stream aborted");
        cx.cancel();
    }
    metrics.finalize(Some(200)).log();
}

async fn write_frames(
    stream: &mut RenderStream,
    sink: &mut BodySink,
    metrics: &mut MetricsCollector,
    shell: &[Frame],
) -> Result<(), StreamError> {
    sink.send_shell(shell).await?;
    metrics.record_shell_sent(shell.len());

    while let Some(frame) = stream.next().await {
        sink.send_frame(&frame).await?;
        metrics.record_frame();
        match frame.kind {
            FrameKind::Resolution => metrics.record_subtree(frame.id.get(), SubtreeOutcome::Resolved),
            FrameKind::Error => metrics.record_subtree(frame.id.get(), SubtreeOutcome::Failed),
            _ => {}
        }
    }
    sink.flush().await
}

fn envelope_response(envelope: ActionEnvelope) -> HttpResponse {
    let status = StatusCode::from_u16(envelope.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    match envelope.kind {
        EnvelopeKind::Redirect => {
            let mut response = Response::new(ResponseBody::empty());
            *response.status_mut() = status;
            if let Some(location) = envelope.location().and_then(|l| HeaderValue::from_str(l).ok()) {
                response.headers_mut().insert(header::LOCATION, location);
            }
            response
        }
        EnvelopeKind::Rerender => {
            let encoded = envelope
                .frames()
                .ok_or_else(|| StreamError::Protocol("malformed rerender payload".into()))
                .and_then(|frames| FrameEncoder::new().encode_all(&frames));
            match encoded {
                Ok(bytes) => respond(status, FRAME_CONTENT_TYPE, bytes),
                Err(err) => {
                    tracing::error!(error = %err, "rerender could not be encoded");
                    let body = json!({
                        "kind": "error",
                        "payload": {"code": "render_failed", "message": "Action failed"},
                    });
                    respond(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        JSON_CONTENT_TYPE,
                        body.to_string(),
                    )
                }
            }
        }
        EnvelopeKind::Value | EnvelopeKind::Error => {
            let body = serde_json::to_vec(&envelope).unwrap_or_else(|err| {
                tracing::error!(error = %err, "envelope could not be serialized");
                b"{}".to_vec()
            });
            respond(status, JSON_CONTENT_TYPE, body)
        }
    }
}

/// Headers set on the context replace same-named ones of the response.
fn merge_headers(target: &mut HeaderMap, extra: &HeaderMap) {
    for name in extra.keys() {
        target.remove(name);
    }
    for (name, value) in extra {
        target.append(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CACHE_CONTROL;

    #[test]
    fn test_merge_headers_replaces_and_appends() {
        let mut target = HeaderMap::new();
        target.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        target.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));

        let mut extra = HeaderMap::new();
        extra.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=60"));
        extra.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        extra.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));

        merge_headers(&mut target, &extra);

        assert_eq!(target.get(CACHE_CONTROL).unwrap(), "public, max-age=60");
        assert_eq!(target.get_all(header::SET_COOKIE).iter().count(), 2);
        assert_eq!(target.get(header::CONTENT_TYPE).unwrap(), "text/html");
    }

    #[test]
    fn test_envelope_responses() {
        let response = envelope_response(ActionEnvelope::value(json!(6)));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], JSON_CONTENT_TYPE);

        let response = envelope_response(ActionEnvelope::redirect("/login"));
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");

        let frames = vec![Frame::value(tandem_streaming::FrameId::ROOT, json!("x")), Frame::end(1)];
        let response = envelope_response(ActionEnvelope::rerender(&frames));
        assert_eq!(response.headers()[header::CONTENT_TYPE], FRAME_CONTENT_TYPE);
    }
}
