//! Incremental frame decoder.

use std::collections::HashMap;

use futures::channel::oneshot;
use futures::{Stream, StreamExt};
use tandem_streaming::{Frame, FrameId, FrameKind, Model, ModulePayload, Reference, StreamError};

use crate::error::ClientError;
use crate::tree::{ClientNode, IslandRef, LazyNode, Settled};

const MAX_REFERENCE_DEPTH: usize = 512;

enum Slot {
    /// A value frame, materialized at each reference.
    Value(Model),
    /// A client module reference.
    Module(ModulePayload),
    /// A placeholder; `sender` is `None` once settled.
    Deferred {
        lazy: LazyNode,
        sender: Option<oneshot::Sender<Settled>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Missing,
    /// Unsettled placeholder.
    Open,
    Closed,
}

/// Decodes frames one at a time, in arrival order.
///
/// The root is itself a placeholder for frame 0, so a caller can hold on
/// to it before any frame arrives. Any reference to a frame that has not
/// arrived yet, or to a pending subtree, becomes a `Lazy` node that
/// settles when the matching frame is decoded, however many other frames
/// arrive in between.
///
/// On a malformed frame or a truncated stream every unsettled placeholder
/// is rejected with a decode error; placeholders settled before that keep
/// their values.
pub struct StreamDecoder {
    slots: HashMap<FrameId, Slot>,
    root: LazyNode,
    frames: usize,
    ended: bool,
    failed: Option<ClientError>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        let (sender, root) = LazyNode::channel(FrameId::ROOT);
        let mut slots = HashMap::new();
        slots.insert(
            FrameId::ROOT,
            Slot::Deferred {
                lazy: root.clone(),
                sender: Some(sender),
            },
        );
        Self {
            slots,
            root,
            frames: 0,
            ended: false,
            failed: None,
        }
    }

    /// Placeholder for the root tree.
    pub fn root(&self) -> LazyNode {
        self.root.clone()
    }

    /// Decode one frame.
    pub fn push_frame(&mut self, frame: Frame) -> Result<(), ClientError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.ended {
            return self.reject(StreamError::Protocol(format!("frame {} after end", frame.id)));
        }
        self.frames += 1;

        let result = match frame.kind {
            FrameKind::Value => self.on_value(&frame),
            FrameKind::Reference => self.on_reference(&frame),
            FrameKind::Resolution => self.on_resolution(&frame),
            FrameKind::Error => self.on_error(&frame),
            FrameKind::End => {
                self.ended = true;
                let unsettled = self.unsettled();
                if unsettled > 0 {
                    self.reject_pending(&format!("stream ended with {} unsettled references", unsettled));
                }
                Ok(())
            }
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) => self.reject(err),
        }
    }

    /// Decode every frame of `frames`, then check the stream ended cleanly.
    pub async fn drive<S>(&mut self, mut frames: S) -> Result<(), ClientError>
    where
        S: Stream<Item = Result<Frame, StreamError>> + Unpin,
    {
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(frame) => self.push_frame(frame)?,
                Err(err) => return self.reject(err),
            }
        }
        self.finish()
    }

    /// The transport closed; without an `end` frame this is a truncation.
    pub fn finish(&mut self) -> Result<(), ClientError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if !self.ended {
            return self.reject(StreamError::Truncated {
                frames: self.frames,
            });
        }
        Ok(())
    }

    /// Decode errors reject everything still pending.
    fn reject(&mut self, err: StreamError) -> Result<(), ClientError> {
        let err = ClientError::from(err);
        tracing::warn!(error = %err, frames = self.frames, "frame stream failed");
        self.reject_pending(&err.to_string());
        self.failed = Some(err.clone());
        Err(err)
    }

    fn reject_pending(&mut self, message: &str) {
        for slot in self.slots.values_mut() {
            if let Slot::Deferred { sender, .. } = slot {
                if let Some(sender) = sender.take() {
                    let _ = sender.send(Err(ClientError::Decode(message.to_string())));
                }
            }
        }
    }

    fn on_value(&mut self, frame: &Frame) -> Result<(), StreamError> {
        let model = parse_model(frame)?;
        match self.state(frame.id) {
            SlotState::Missing => {
                self.slots.insert(frame.id, Slot::Value(model));
                Ok(())
            }
            SlotState::Open => {
                let node = self.materialize(&model, 0)?;
                self.fulfil(frame.id, Slot::Value(model), Ok(node));
                Ok(())
            }
            SlotState::Closed => Err(duplicate(frame.id)),
        }
    }

    fn on_reference(&mut self, frame: &Frame) -> Result<(), StreamError> {
        let reference = frame.as_reference()?;
        match (reference, self.state(frame.id)) {
            (Reference::Pending, SlotState::Missing) => {
                let (sender, lazy) = LazyNode::channel(frame.id);
                self.slots.insert(
                    frame.id,
                    Slot::Deferred {
                        lazy,
                        sender: Some(sender),
                    },
                );
                Ok(())
            }
            // Already referenced ahead of its placeholder frame.
            (Reference::Pending, SlotState::Open) => Ok(()),
            (Reference::Module(module), SlotState::Missing) => {
                self.slots.insert(frame.id, Slot::Module(module));
                Ok(())
            }
            (Reference::Module(module), SlotState::Open) => {
                let island = ClientNode::Island(IslandRef {
                    frame: frame.id,
                    module: module.clone(),
                });
                self.fulfil(frame.id, Slot::Module(module), Ok(island));
                Ok(())
            }
            (_, SlotState::Closed) => Err(duplicate(frame.id)),
        }
    }

    fn on_resolution(&mut self, frame: &Frame) -> Result<(), StreamError> {
        let model = parse_model(frame)?;
        let node = self.materialize(&model, 0)?;
        self.settle(frame, Ok(node))
    }

    fn on_error(&mut self, frame: &Frame) -> Result<(), StreamError> {
        let payload = frame.as_error()?;
        self.settle(
            frame,
            Err(ClientError::Subtree {
                id: frame.id.get(),
                message: payload.message,
            }),
        )
    }

    fn settle(&mut self, frame: &Frame, value: Settled) -> Result<(), StreamError> {
        match self.slots.get_mut(&frame.id) {
            Some(Slot::Deferred { sender, .. }) => match sender.take() {
                Some(sender) => {
                    let _ = sender.send(value);
                    tracing::trace!(frame = frame.id.get(), kind = frame.kind.as_str(), "placeholder settled");
                    Ok(())
                }
                None => Err(StreamError::Protocol(format!("frame {} settled twice", frame.id))),
            },
            _ => Err(StreamError::Protocol(format!(
                "{} for frame {} without a pending reference",
                frame.kind.as_str(),
                frame.id
            ))),
        }
    }

    /// Settle a forward reference that turned out to be a plain frame.
    ///
    /// The slot now holds the frame itself, so later references
    /// materialize it directly; earlier ones keep their placeholder.
    fn fulfil(&mut self, id: FrameId, slot: Slot, value: Settled) {
        if let Some(Slot::Deferred {
            sender: Some(sender),
            ..
        }) = self.slots.insert(id, slot)
        {
            let _ = sender.send(value);
        }
    }

    fn state(&self, id: FrameId) -> SlotState {
        match self.slots.get(&id) {
            None => SlotState::Missing,
            Some(Slot::Deferred { sender: Some(_), .. }) => SlotState::Open,
            Some(_) => SlotState::Closed,
        }
    }

    fn materialize(&mut self, model: &Model, depth: usize) -> Result<ClientNode, StreamError> {
        if depth > MAX_REFERENCE_DEPTH {
            return Err(StreamError::Protocol("reference depth exceeded".into()));
        }
        Ok(match model {
            Model::Text(text) => ClientNode::Text(text.clone()),
            Model::Data(value) => ClientNode::Data(value.clone()),
            Model::Element {
                tag,
                props,
                children,
            } => ClientNode::Element {
                tag: tag.clone(),
                props: props.clone(),
                children: self.materialize_all(children, depth)?,
            },
            Model::Fragment(children) => ClientNode::Fragment(self.materialize_all(children, depth)?),
            Model::Segment { key, child } => ClientNode::Segment {
                key: key.clone(),
                child: Box::new(self.materialize(child, depth)?),
            },
            Model::Ref(id) => self.materialize_ref(*id, depth)?,
        })
    }

    fn materialize_all(&mut self, models: &[Model], depth: usize) -> Result<Vec<ClientNode>, StreamError> {
        models.iter().map(|m| self.materialize(m, depth)).collect()
    }

    fn materialize_ref(&mut self, id: FrameId, depth: usize) -> Result<ClientNode, StreamError> {
        match self.slots.get(&id) {
            Some(Slot::Value(model)) => {
                let model = model.clone();
                self.materialize(&model, depth + 1)
            }
            Some(Slot::Module(module)) => Ok(ClientNode::Island(IslandRef {
                frame: id,
                module: module.clone(),
            })),
            Some(Slot::Deferred { lazy, .. }) => Ok(ClientNode::Lazy(lazy.clone())),
            None => {
                let (sender, lazy) = LazyNode::channel(id);
                self.slots.insert(
                    id,
                    Slot::Deferred {
                        lazy: lazy.clone(),
                        sender: Some(sender),
                    },
                );
                Ok(ClientNode::Lazy(lazy))
            }
        }
    }

    /// Placeholders not yet settled.
    pub fn unsettled(&self) -> usize {
        self.slots
            .values()
            .filter(|s| matches!(s, Slot::Deferred { sender: Some(_), .. }))
            .count()
    }

    /// Frames decoded so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Whether the terminating frame has been decoded.
    pub fn is_complete(&self) -> bool {
        self.ended && self.failed.is_none()
    }

    /// Module ids of every module reference decoded so far.
    pub fn module_ids(&self) -> Vec<&str> {
        let mut ids: Vec<(FrameId, &str)> = self
            .slots
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Module(module) => Some((*id, module.id.as_str())),
                _ => None,
            })
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_model(frame: &Frame) -> Result<Model, StreamError> {
    Model::from_json(&frame.payload).map_err(|e| StreamError::InvalidPayload {
        id: frame.id,
        kind: frame.kind.as_str(),
        message: e.to_string(),
    })
}

fn duplicate(id: FrameId) -> StreamError {
    StreamError::Protocol(format!("frame {} decoded twice", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;
    use tandem_registry::ModuleReference;
    use tandem_streaming::{decode_stream, ErrorPayload, FrameEncoder};

    fn early_late() -> Vec<Frame> {
        vec![
            Frame::pending(FrameId(1)),
            Frame::value(FrameId(0), json!(["$", "main", {}, ["early", "$1"]])),
            Frame::resolution(FrameId(1), json!("late")),
            Frame::end(3),
        ]
    }

    fn root_now(decoder: &StreamDecoder) -> ClientNode {
        decoder.root().try_get().expect("root settled").expect("root ok")
    }

    // === Progressive Reveal Tests ===

    #[test]
    fn test_early_visible_before_late() {
        let mut decoder = StreamDecoder::new();
        let frames = early_late();

        decoder.push_frame(frames[0].clone()).unwrap();
        assert!(decoder.root().try_get().is_none());
        decoder.push_frame(frames[1].clone()).unwrap();

        let tree = root_now(&decoder);
        assert_eq!(tree.text_content(), "early");
        assert_eq!(decoder.unsettled(), 1);

        decoder.push_frame(frames[2].clone()).unwrap();
        assert_eq!(tree.text_content(), "earlylate");

        decoder.push_frame(frames[3].clone()).unwrap();
        assert!(decoder.is_complete());
    }

    #[test]
    fn test_forward_reference_settles_later() {
        let mut decoder = StreamDecoder::new();
        decoder
            .push_frame(Frame::value(FrameId(0), json!(["$F", ["a", "$7"]])))
            .unwrap();
        let tree = root_now(&decoder);
        assert_eq!(tree.text_content(), "a");

        for i in 1..7 {
            decoder
                .push_frame(Frame::value(FrameId(i), json!(format!("noise {}", i))))
                .unwrap();
        }
        decoder.push_frame(Frame::value(FrameId(7), json!("b"))).unwrap();
        assert_eq!(tree.text_content(), "ab");
    }

    #[test]
    fn test_islands_from_reference_frames() {
        let module = ModuleReference::from_source("btn", "Counter");
        let mut decoder = StreamDecoder::new();
        decoder
            .push_frame(Frame::module(FrameId(1), &module, json!({"count": 0})))
            .unwrap();
        decoder
            .push_frame(Frame::value(FrameId(0), json!(["$F", ["$1", "$1"]])))
            .unwrap();

        let islands = root_now(&decoder).islands();
        assert_eq!(islands.len(), 2);
        assert_eq!(islands[0].module_id(), "btn#Counter");
        assert_eq!(islands[0].props(), &json!({"count": 0}));
        assert_eq!(decoder.module_ids(), vec!["btn#Counter"]);
    }

    // === Failure Tests ===

    #[tokio::test]
    async fn test_error_frame_rejects_only_its_subtree() {
        let mut decoder = StreamDecoder::new();
        decoder.push_frame(Frame::pending(FrameId(1))).unwrap();
        decoder.push_frame(Frame::pending(FrameId(2))).unwrap();
        decoder
            .push_frame(Frame::value(FrameId(0), json!(["$F", ["$1", "$2"]])))
            .unwrap();
        decoder
            .push_frame(Frame::error(FrameId(1), ErrorPayload::new("reviews down")))
            .unwrap();
        decoder.push_frame(Frame::resolution(FrameId(2), json!("recs"))).unwrap();

        let ClientNode::Fragment(children) = root_now(&decoder) else {
            panic!("expected fragment");
        };
        let ClientNode::Lazy(reviews) = &children[0] else {
            panic!("expected lazy");
        };
        assert!(matches!(
            reviews.wait().await,
            Err(ClientError::Subtree { id: 1, .. })
        ));
        assert_eq!(children[1].text_content(), "recs");
    }

    #[tokio::test]
    async fn test_truncation_rejects_pending_but_keeps_resolved() {
        let mut decoder = StreamDecoder::new();
        let frames = early_late();
        decoder.push_frame(frames[0].clone()).unwrap();
        decoder.push_frame(frames[1].clone()).unwrap();

        assert!(matches!(decoder.finish(), Err(ClientError::Decode(_))));

        let tree = root_now(&decoder);
        assert_eq!(tree.text_content(), "early");
        let ClientNode::Element { children, .. } = &tree else {
            panic!("expected element");
        };
        let ClientNode::Lazy(late) = &children[1] else {
            panic!("expected lazy");
        };
        assert!(matches!(late.wait().await, Err(ClientError::Decode(_))));
    }

    #[tokio::test]
    async fn test_malformed_frame_rejects_pending() {
        let mut decoder = StreamDecoder::new();
        decoder.push_frame(Frame::pending(FrameId(1))).unwrap();
        decoder
            .push_frame(Frame::value(FrameId(0), json!(["$F", ["$1"]])))
            .unwrap();

        let bad = Frame::resolution(FrameId(1), json!({"not": "a model"}));
        assert!(decoder.push_frame(bad).is_err());
        assert!(decoder.push_frame(Frame::end(4)).is_err());

        let ClientNode::Fragment(children) = root_now(&decoder) else {
            panic!("expected fragment");
        };
        let ClientNode::Lazy(pending) = &children[0] else {
            panic!("expected lazy");
        };
        assert!(pending.wait().await.is_err());
    }

    #[test]
    fn test_resolution_without_placeholder() {
        let mut decoder = StreamDecoder::new();
        decoder.push_frame(Frame::value(FrameId(3), json!("x"))).unwrap();
        assert!(decoder
            .push_frame(Frame::resolution(FrameId(3), json!("y")))
            .is_err());
    }

    #[test]
    fn test_frames_after_end_rejected() {
        let mut decoder = StreamDecoder::new();
        decoder.push_frame(Frame::value(FrameId(0), json!("A"))).unwrap();
        decoder.push_frame(Frame::end(1)).unwrap();
        assert!(decoder.push_frame(Frame::value(FrameId(1), json!("B"))).is_err());
    }

    // === Replay Tests ===

    #[tokio::test]
    async fn test_replay_yields_identical_tree() {
        let bytes = FrameEncoder::new().encode_all(&early_late()).unwrap();

        let mut trees = Vec::new();
        for _ in 0..2 {
            let mut decoder = StreamDecoder::new();
            let root = decoder.root();
            let chunks: Vec<Vec<u8>> = bytes.chunks(9).map(<[u8]>::to_vec).collect();
            decoder.drive(decode_stream(stream::iter(chunks)).boxed()).await.unwrap();
            trees.push(root.wait().await.unwrap().resolve_deep().await);
        }

        assert_eq!(trees[0], trees[1]);
        assert_eq!(trees[0].text_content(), "earlylate");
    }

    #[tokio::test]
    async fn test_drive_reports_truncation() {
        let frames = early_late();
        let bytes = FrameEncoder::new().encode_all(&frames[..2]).unwrap();
        let mut decoder = StreamDecoder::new();

        let result = decoder.drive(decode_stream(stream::iter(vec![bytes])).boxed()).await;
        assert!(matches!(result, Err(ClientError::Decode(_))));
        assert_eq!(decoder.unsettled(), 0);
    }
}
