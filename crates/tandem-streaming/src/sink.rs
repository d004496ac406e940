//! Order-enforcing frame sink.

use std::collections::HashSet;
use std::fmt::Display;

use futures::{Sink, SinkExt};
use tandem_core::{LifecyclePhase, TimingContext};

use crate::codec::FrameEncoder;
use crate::error::StreamError;
use crate::flush::{FlushController, FlushPolicy};
use crate::frame::{Frame, FrameId, FrameKind, Reference};
use crate::model::Model;

/// State of the frame sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    /// Shell not yet sent.
    Initial,
    /// Shell sent, deferred frames can follow.
    ShellSent,
    /// Terminating frame sent.
    Completed,
}

/// Append-only frame sink that enforces the stream's ordering rules.
///
/// - shell frames go out before any deferred frame
/// - a value frame may only reference frames already sent
/// - a `resolution` or `error` frame for X needs an unsettled pending
///   reference for X
/// - `end` requires every pending reference to be settled, and nothing
///   may follow it
///
/// Generic over any `Sink<Vec<u8>>`, so the same sink writes into an HTTP
/// body channel or an in-memory buffer.
pub struct FrameSink<S, E>
where
    S: Sink<Vec<u8>, Error = E> + Unpin,
    E: Display,
{
    inner: S,
    state: SinkState,
    timing: TimingContext,
    controller: FlushController,
    encoder: FrameEncoder,
    buffer: Vec<u8>,
    sent: HashSet<FrameId>,
    pending: HashSet<FrameId>,
    frames_sent: u32,
    last_resolved: Option<FrameId>,
}

impl<S, E> FrameSink<S, E>
where
    S: Sink<Vec<u8>, Error = E> + Unpin,
    E: Display,
{
    pub fn new(sink: S, timing: TimingContext) -> Self {
        Self {
            inner: sink,
            state: SinkState::Initial,
            timing,
            controller: FlushController::default(),
            encoder: FrameEncoder::new(),
            buffer: Vec::new(),
            sent: HashSet::new(),
            pending: HashSet::new(),
            frames_sent: 0,
            last_resolved: None,
        }
    }

    /// Replace the flush controller.
    pub fn with_flush(mut self, controller: FlushController) -> Self {
        self.controller = controller;
        self
    }

    /// Send the shell: every frame produced before the first flush.
    pub async fn send_shell(&mut self, frames: &[Frame]) -> Result<(), StreamError> {
        if self.state != SinkState::Initial {
            return Err(StreamError::Protocol("shell already sent".into()));
        }

        self.timing.mark("shell_start");
        for frame in frames {
            self.append(frame)?;
            if self.controller.policy().flush_shell_frames() || self.controller.over_limit() {
                self.flush().await?;
            }
        }
        if self.controller.policy().flush_after_shell() {
            self.flush().await?;
        }
        self.timing.mark("shell_sent");
        if self.state == SinkState::Initial {
            self.state = SinkState::ShellSent;
        }

        tracing::debug!(frames = frames.len(), "shell frames sent");
        Ok(())
    }

    /// Send one frame after the shell.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), StreamError> {
        match self.state {
            SinkState::Initial => return Err(StreamError::Protocol("shell not sent".into())),
            SinkState::Completed => {
                return Err(StreamError::Protocol(format!(
                    "frame {} after end",
                    frame.id
                )))
            }
            SinkState::ShellSent => {}
        }

        self.append(frame)?;
        if matches!(frame.kind, FrameKind::Resolution | FrameKind::Error) {
            self.timing.mark_resolved(frame.id.get());
            self.last_resolved = Some(frame.id);
        }
        if self.controller.policy().flush_after_frame()
            || self.controller.over_limit()
            || frame.is_end()
        {
            self.flush().await?;
        }
        Ok(())
    }

    /// Send the terminating frame, if not already sent, and flush.
    pub async fn complete(&mut self) -> Result<(), StreamError> {
        if self.state == SinkState::Initial {
            self.send_shell(&[]).await?;
        }
        if self.state != SinkState::Completed {
            let end = Frame::end(self.frames_sent);
            self.send_frame(&end).await?;
        }
        self.flush().await?;
        self.timing.mark("complete");
        Ok(())
    }

    /// Write buffered bytes to the transport.
    pub async fn flush(&mut self) -> Result<(), StreamError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::take(&mut self.buffer);
        self.inner
            .send(chunk)
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;
        self.controller.reset();
        Ok(())
    }

    fn append(&mut self, frame: &Frame) -> Result<(), StreamError> {
        self.validate(frame)?;
        let line = self.encoder.encode(frame)?;
        self.controller.add_bytes(line.len());
        self.buffer.extend(line);
        self.frames_sent += 1;
        Ok(())
    }

    fn validate(&mut self, frame: &Frame) -> Result<(), StreamError> {
        match frame.kind {
            FrameKind::Value => {
                self.check_new(frame.id)?;
                self.check_references(frame)?;
                self.sent.insert(frame.id);
            }
            FrameKind::Reference => {
                self.check_new(frame.id)?;
                if frame.as_reference()? == Reference::Pending {
                    self.pending.insert(frame.id);
                }
                self.sent.insert(frame.id);
            }
            FrameKind::Resolution | FrameKind::Error => {
                if !self.pending.contains(&frame.id) {
                    return Err(StreamError::Protocol(format!(
                        "{} for frame {} without a pending reference",
                        frame.kind.as_str(),
                        frame.id
                    )));
                }
                if frame.kind == FrameKind::Resolution {
                    self.check_references(frame)?;
                } else {
                    frame.as_error()?;
                }
                self.pending.remove(&frame.id);
            }
            FrameKind::End => {
                if !self.pending.is_empty() {
                    return Err(StreamError::Protocol(format!(
                        "end with {} unsettled references",
                        self.pending.len()
                    )));
                }
                self.state = SinkState::Completed;
            }
        }
        Ok(())
    }

    fn check_new(&self, id: FrameId) -> Result<(), StreamError> {
        if self.sent.contains(&id) {
            return Err(StreamError::Protocol(format!("frame {} sent twice", id)));
        }
        Ok(())
    }

    fn check_references(&self, frame: &Frame) -> Result<(), StreamError> {
        let model = Model::from_json(&frame.payload).map_err(|e| StreamError::InvalidPayload {
            id: frame.id,
            kind: frame.kind.as_str(),
            message: e.to_string(),
        })?;
        if let Some(missing) = model.references().into_iter().find(|id| !self.sent.contains(id)) {
            return Err(StreamError::Protocol(format!(
                "frame {} references unsent frame {}",
                frame.id, missing
            )));
        }
        Ok(())
    }

    /// Ids of pending references not yet settled.
    pub fn unsettled(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.pending.iter().copied()
    }

    /// Number of frames written so far.
    pub fn frames_sent(&self) -> u32 {
        self.frames_sent
    }

    /// Get the current lifecycle phase.
    pub fn phase(&self) -> LifecyclePhase {
        match (self.state, self.last_resolved) {
            (SinkState::Initial, _) => LifecyclePhase::Start,
            (SinkState::ShellSent, None) => LifecyclePhase::ShellSent,
            (SinkState::ShellSent, Some(id)) => LifecyclePhase::Resolved(id.get()),
            (SinkState::Completed, _) => LifecyclePhase::Completion,
        }
    }

    pub fn timing(&self) -> &TimingContext {
        &self.timing
    }

    pub fn policy(&self) -> FlushPolicy {
        self.controller.policy()
    }

    /// Consume the sink and return the inner value.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_all;
    use crate::frame::ErrorPayload;
    use futures::channel::mpsc;
    use futures::StreamExt;
    use serde_json::json;
    use std::convert::Infallible;

    type VecSink = futures::sink::Drain<Vec<u8>>;

    fn buffer_sink() -> (
        FrameSink<mpsc::UnboundedSender<Vec<u8>>, mpsc::SendError>,
        mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        let (tx, rx) = mpsc::unbounded();
        (FrameSink::new(tx, TimingContext::new()), rx)
    }

    fn shell() -> Vec<Frame> {
        vec![
            Frame::pending(FrameId(1)),
            Frame::value(FrameId(0), json!(["$F", ["early", "$1"]])),
        ]
    }

    // === Ordering Tests ===

    #[tokio::test]
    async fn test_shell_then_resolution() {
        let (mut sink, rx) = buffer_sink();

        sink.send_shell(&shell()).await.unwrap();
        assert_eq!(sink.phase(), LifecyclePhase::ShellSent);
        sink.send_frame(&Frame::resolution(FrameId(1), json!("late")))
            .await
            .unwrap();
        assert_eq!(sink.phase(), LifecyclePhase::Resolved(1));
        sink.complete().await.unwrap();
        assert_eq!(sink.phase(), LifecyclePhase::Completion);
        assert!(sink.timing().time_to_shell().is_some());
        drop(sink);

        let chunks: Vec<Vec<u8>> = rx.collect().await;
        // shell, resolution, end
        assert_eq!(chunks.len(), 3);
        let frames = decode_all(&chunks.concat()).unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[2].payload, json!("late"));
        assert!(frames[3].is_end());
    }

    #[tokio::test]
    async fn test_frame_before_shell_rejected() {
        let (mut sink, _rx) = buffer_sink();
        let result = sink.send_frame(&Frame::value(FrameId(0), json!("A"))).await;
        assert!(matches!(result, Err(StreamError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_resolution_requires_pending_reference() {
        let (mut sink, _rx) = buffer_sink();
        sink.send_shell(&[Frame::value(FrameId(0), json!("A"))])
            .await
            .unwrap();

        let result = sink.send_frame(&Frame::resolution(FrameId(7), json!("x"))).await;
        assert!(matches!(result, Err(StreamError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_forward_reference_in_value_rejected() {
        let (mut sink, _rx) = buffer_sink();
        let result = sink
            .send_shell(&[Frame::value(FrameId(0), json!("$3"))])
            .await;
        assert!(matches!(result, Err(StreamError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_end_requires_settled_references() {
        let (mut sink, _rx) = buffer_sink();
        sink.send_shell(&shell()).await.unwrap();
        assert!(sink.complete().await.is_err());

        sink.send_frame(&Frame::error(FrameId(1), ErrorPayload::new("timed out")))
            .await
            .unwrap();
        sink.complete().await.unwrap();
        assert_eq!(sink.unsettled().count(), 0);
    }

    #[tokio::test]
    async fn test_nothing_after_end() {
        let (mut sink, _rx) = buffer_sink();
        sink.send_shell(&[Frame::value(FrameId(0), json!("A"))])
            .await
            .unwrap();
        sink.complete().await.unwrap();

        let result = sink.send_frame(&Frame::value(FrameId(1), json!("B"))).await;
        assert!(matches!(result, Err(StreamError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_duplicate_frame_id_rejected() {
        let (mut sink, _rx) = buffer_sink();
        let result = sink
            .send_shell(&[
                Frame::value(FrameId(1), json!("A")),
                Frame::value(FrameId(1), json!("B")),
            ])
            .await;
        assert!(matches!(result, Err(StreamError::Protocol(_))));
    }

    // === Flush Tests ===

    #[tokio::test]
    async fn test_every_frame_policy_flushes_shell_frames() {
        let (tx, rx) = mpsc::unbounded();
        let mut sink = FrameSink::new(tx, TimingContext::new())
            .with_flush(FlushController::new(FlushPolicy::EveryFrame));

        sink.send_shell(&shell()).await.unwrap();
        drop(sink);

        let chunks: Vec<Vec<u8>> = rx.collect().await;
        assert_eq!(chunks.len(), 2);
    }

    #[tokio::test]
    async fn test_manual_policy_buffers_until_complete() {
        let (tx, rx) = mpsc::unbounded();
        let mut sink = FrameSink::new(tx, TimingContext::new())
            .with_flush(FlushController::new(FlushPolicy::Manual));

        sink.send_shell(&shell()).await.unwrap();
        sink.send_frame(&Frame::resolution(FrameId(1), json!("late")))
            .await
            .unwrap();
        sink.complete().await.unwrap();
        drop(sink);

        let chunks: Vec<Vec<u8>> = rx.collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(decode_all(&chunks[0]).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_drain_sink() {
        let sink: VecSink = futures::sink::drain();
        let mut sink = FrameSink::<_, Infallible>::new(sink, TimingContext::new());
        sink.send_shell(&[Frame::value(FrameId(0), json!("A"))])
            .await
            .unwrap();
        sink.complete().await.unwrap();
        assert_eq!(sink.frames_sent(), 2);
    }
}
