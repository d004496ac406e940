//! Primary render pass.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use futures::{FutureExt, Sink};
use tandem_core::{Node, RequestContext, RequestId, TandemError};
use tandem_registry::ModuleRegistry;
use tandem_streaming::{ErrorPayload, Frame, FrameId, FrameSink, StreamError};
use tokio::time::{Instant, Sleep};

use crate::error::RenderError;
use crate::fallback::FallbackStrategy;
use crate::options::{RenderOptions, RenderStats};
use crate::serializer::{Deferred, Serializer};
use crate::tracker::{SubtreeStatus, SubtreeTracker};

/// Renders component trees into frame streams.
///
/// Shared across requests; each call to [`render`](Renderer::render) owns
/// its own serializer state.
#[derive(Debug, Clone)]
pub struct Renderer {
    registry: Arc<ModuleRegistry>,
    options: RenderOptions,
}

impl Renderer {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            registry,
            options: RenderOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Render the shell of `tree`.
    ///
    /// Every server node is polled once. Whatever is ready forms the shell;
    /// an error there fails the whole render and no frame is produced.
    /// Suspended server nodes become pending references, driven by the
    /// returned stream, which yields the shell first and then resolution
    /// frames in completion order.
    pub fn render(&self, tree: Node, cx: &RequestContext) -> Result<RenderStream, RenderError> {
        let mut serializer = Serializer::new(Arc::clone(&self.registry), cx.clone());
        if let Err(err) = serializer.serialize_root(tree) {
            tracing::warn!(request_id = %cx.request_id(), error = %err, "shell render failed");
            return Err(err);
        }

        let shell: VecDeque<Frame> = serializer.take_frames().into();
        let deferred = serializer.take_deferred();
        cx.mark("shell_rendered");
        tracing::debug!(
            request_id = %cx.request_id(),
            frames = shell.len(),
            deferred = deferred.len(),
            "shell rendered"
        );

        let token = cx.cancellation().clone();
        let mut stream = RenderStream {
            request_id: cx.request_id().clone(),
            shell_len: shell.len(),
            queue: shell,
            serializer,
            in_flight: FuturesUnordered::new(),
            tracker: SubtreeTracker::new(),
            fallback: self.options.fallback.clone(),
            deadline: self.options.suspense_timeout.map(|t| Instant::now() + t),
            timer: None,
            cancelled: async move { token.cancelled().await }.boxed(),
            stats: RenderStats::default(),
            finished: false,
        };
        stream.schedule(deferred);
        Ok(stream)
    }

    /// Render and collect the whole stream.
    pub async fn render_to_frames(
        &self,
        tree: Node,
        cx: &RequestContext,
    ) -> Result<Vec<Frame>, RenderError> {
        Ok(self.render(tree, cx)?.collect().await)
    }
}

struct Settled {
    id: FrameId,
    component: String,
    result: anyhow::Result<Node>,
}

/// Frames of one render: the shell, then deferred frames as subtrees
/// settle, then `end`.
///
/// Dropping the stream abandons every outstanding subtree. If the
/// request's cancellation token fires, the stream ends without an `end`
/// frame; what was already yielded remains a valid prefix.
pub struct RenderStream {
    request_id: RequestId,
    shell_len: usize,
    queue: VecDeque<Frame>,
    serializer: Serializer,
    in_flight: FuturesUnordered<BoxFuture<'static, Settled>>,
    tracker: SubtreeTracker,
    fallback: FallbackStrategy,
    deadline: Option<Instant>,
    timer: Option<Pin<Box<Sleep>>>,
    cancelled: BoxFuture<'static, ()>,
    stats: RenderStats,
    finished: bool,
}

impl RenderStream {
    /// Number of frames in the shell.
    pub fn shell_len(&self) -> usize {
        self.shell_len
    }

    /// Counters so far.
    pub fn stats(&self) -> RenderStats {
        RenderStats {
            shell_frames: self.shell_len,
            deferred: self.tracker.len(),
            resolved: self.tracker.count(|s| *s == SubtreeStatus::Resolved),
            failed: self.tracker.count(|s| matches!(s, SubtreeStatus::Failed(_))),
            timed_out: self.tracker.count(|s| *s == SubtreeStatus::TimedOut),
            ..self.stats.clone()
        }
    }

    /// Drive the render into `sink`: shell as one batch, then every
    /// deferred frame as it settles.
    pub async fn write_to<S, E>(mut self, sink: &mut FrameSink<S, E>) -> Result<RenderStats, StreamError>
    where
        S: Sink<Vec<u8>, Error = E> + Unpin,
        E: Display,
    {
        let remaining = self
            .shell_len
            .saturating_sub(self.stats.frames)
            .min(self.queue.len());
        let shell: Vec<Frame> = self.queue.drain(..remaining).collect();
        self.stats.frames += shell.len();
        sink.send_shell(&shell).await?;

        while let Some(frame) = self.next().await {
            sink.send_frame(&frame).await?;
        }
        sink.flush().await?;
        Ok(self.stats())
    }

    fn schedule(&mut self, deferred: Vec<Deferred>) {
        for Deferred {
            id,
            component,
            future,
        } in deferred
        {
            self.tracker.defer(id, component.clone());
            self.in_flight.push(
                async move {
                    Settled {
                        id,
                        component,
                        result: future.await,
                    }
                }
                .boxed(),
            );
        }
    }

    fn settle(&mut self, settled: Settled) {
        let Settled {
            id,
            component,
            result,
        } = settled;

        let rendered = result
            .map_err(|err| RenderError::component(&component, &err))
            .and_then(|node| self.serializer.serialize(node));

        match rendered {
            Ok(model) => {
                self.queue.extend(self.serializer.take_frames());
                self.queue.push_back(Frame::resolution(id, model.to_json()));
                self.tracker.resolve(id);
                tracing::debug!(
                    request_id = %self.request_id,
                    frame = id.get(),
                    component = %component,
                    "subtree resolved"
                );
            }
            Err(RenderError::Cancelled) => {
                self.abandon();
                return;
            }
            Err(err) => self.fail(id, &component, err),
        }

        let nested = self.serializer.take_deferred();
        self.schedule(nested);
    }

    fn fail(&mut self, id: FrameId, component: &str, err: RenderError) {
        let message = err.to_string();
        let error = TandemError::SubtreeRender {
            id: id.get(),
            message: message.clone(),
        };
        tracing::warn!(
            request_id = %self.request_id,
            error = %error,
            component = %component,
            "deferred subtree failed"
        );

        self.queue.extend(self.serializer.take_frames());
        let replacement = self
            .fallback
            .replacement(&message)
            .and_then(|node| self.serializer.serialize(node).ok());
        let frame = match replacement {
            Some(model) => {
                self.queue.extend(self.serializer.take_frames());
                Frame::resolution(id, model.to_json())
            }
            None => Frame::error(id, ErrorPayload::new(message.clone()).with_component(component)),
        };
        self.queue.push_back(frame);
        self.tracker.fail(id, message);
    }

    fn deadline_elapsed(&mut self, cx: &mut Context<'_>) -> bool {
        let Some(deadline) = self.deadline else {
            return false;
        };
        let timer = self
            .timer
            .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)));
        timer.poll_unpin(cx).is_ready()
    }

    fn time_out(&mut self) {
        let ids = self.tracker.time_out_pending();
        self.in_flight = FuturesUnordered::new();
        tracing::warn!(
            request_id = %self.request_id,
            subtrees = ids.len(),
            "suspense deadline reached"
        );
        for id in ids {
            let mut payload = ErrorPayload::new("timed out");
            if let Some(component) = self.tracker.component(id) {
                payload = payload.with_component(component);
            }
            self.queue.push_back(Frame::error(id, payload));
        }
        self.finish();
    }

    fn abandon(&mut self) {
        let ids = self.tracker.abandon_pending();
        self.in_flight = FuturesUnordered::new();
        self.queue.clear();
        self.stats.cancelled = true;
        self.finished = true;
        tracing::info!(
            request_id = %self.request_id,
            abandoned = ids.len(),
            "render cancelled"
        );
    }

    fn finish(&mut self) {
        let frames = (self.stats.frames + self.queue.len()) as u32;
        self.queue.push_back(Frame::end(frames));
        self.finished = true;
        tracing::debug!(request_id = %self.request_id, frames = frames + 1, "render complete");
    }
}

impl Stream for RenderStream {
    type Item = Frame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        let this = self.get_mut();
        loop {
            if let Some(frame) = this.queue.pop_front() {
                this.stats.frames += 1;
                return Poll::Ready(Some(frame));
            }
            if this.finished {
                return Poll::Ready(None);
            }
            if this.cancelled.poll_unpin(cx).is_ready() {
                this.abandon();
                continue;
            }
            if this.in_flight.is_empty() {
                this.finish();
                continue;
            }
            if this.deadline_elapsed(cx) {
                this.time_out();
                continue;
            }
            match this.in_flight.poll_next_unpin(cx) {
                Poll::Ready(Some(settled)) => this.settle(settled),
                Poll::Ready(None) => this.finish(),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl std::fmt::Debug for RenderStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderStream")
            .field("request_id", &self.request_id)
            .field("queued", &self.queue.len())
            .field("in_flight", &self.in_flight.len())
            .field("finished", &self.finished)
            .finish()
    }
}
