//! Tree to frame serialization for the primary pass.

use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::task::noop_waker_ref;
use futures::FutureExt;
use tandem_core::{scoped, Node, NodeFuture, RequestContext};
use tandem_registry::ModuleRegistry;
use tandem_streaming::{Frame, FrameId, Model};

use crate::error::RenderError;

/// A server node that did not resolve on its first poll.
pub(crate) struct Deferred {
    pub id: FrameId,
    pub component: String,
    pub future: NodeFuture,
}

/// Walks trees into models, emitting the frames they reference.
///
/// One serializer lives for the whole render so frame ids and value
/// dedup span the shell and every later resolution.
pub(crate) struct Serializer {
    registry: Arc<ModuleRegistry>,
    cx: RequestContext,
    next_id: u32,
    values: HashMap<String, FrameId>,
    frames: Vec<Frame>,
    deferred: Vec<Deferred>,
}

impl Serializer {
    pub fn new(registry: Arc<ModuleRegistry>, cx: RequestContext) -> Self {
        Self {
            registry,
            cx,
            // Frame 0 is reserved for the root.
            next_id: 1,
            values: HashMap::new(),
            frames: Vec::new(),
            deferred: Vec::new(),
        }
    }

    /// Serialize the root tree; the root value frame is emitted last.
    pub fn serialize_root(&mut self, tree: Node) -> Result<(), RenderError> {
        let model = self.serialize(tree)?;
        self.frames.push(Frame::value(FrameId::ROOT, model.to_json()));
        Ok(())
    }

    pub fn serialize(&mut self, node: Node) -> Result<Model, RenderError> {
        if self.cx.is_cancelled() {
            return Err(RenderError::Cancelled);
        }

        match node {
            Node::Text(text) => Ok(Model::Text(text)),
            Node::Data(value) => Ok(Model::Data(value)),
            Node::Element(el) => Ok(Model::Element {
                tag: el.tag,
                props: el.props,
                children: self.serialize_all(el.children)?,
            }),
            Node::Fragment(children) => Ok(Model::Fragment(self.serialize_all(children)?)),
            Node::Segment { key, child } => Ok(Model::Segment {
                key,
                child: Box::new(self.serialize(*child)?),
            }),
            Node::Client(client) => {
                let registry = Arc::clone(&self.registry);
                let reference = registry
                    .client_reference(&client.module_id)
                    .map_err(|_| RenderError::UnknownModule {
                        table: "client",
                        id: client.module_id.clone(),
                    })?;
                let id = self.alloc();
                self.frames.push(Frame::module(id, reference, client.props));
                Ok(Model::Ref(id))
            }
            Node::Server(server) => {
                let mut future = scoped(self.cx.clone(), server.call()).boxed();
                match poll_once(&mut future) {
                    Poll::Ready(Ok(node)) => {
                        let model = self.serialize(node)?;
                        Ok(Model::Ref(self.outline(model)))
                    }
                    Poll::Ready(Err(err)) => Err(RenderError::component(&server.name, &err)),
                    Poll::Pending => {
                        let id = self.alloc();
                        tracing::trace!(frame = id.get(), component = %server.name, "subtree deferred");
                        self.frames.push(Frame::pending(id));
                        self.deferred.push(Deferred {
                            id,
                            component: server.name,
                            future,
                        });
                        Ok(Model::Ref(id))
                    }
                }
            }
        }
    }

    fn serialize_all(&mut self, nodes: Vec<Node>) -> Result<Vec<Model>, RenderError> {
        nodes.into_iter().map(|node| self.serialize(node)).collect()
    }

    /// Emit `model` as a value frame, reusing the frame of an identical
    /// earlier value.
    fn outline(&mut self, model: Model) -> FrameId {
        let payload = model.to_json();
        let key = payload.to_string();
        if let Some(id) = self.values.get(&key) {
            return *id;
        }
        let id = self.alloc();
        self.frames.push(Frame::value(id, payload));
        self.values.insert(key, id);
        id
    }

    fn alloc(&mut self) -> FrameId {
        let id = FrameId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Frames produced since the last call.
    pub fn take_frames(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }

    /// Subtrees deferred since the last call.
    pub fn take_deferred(&mut self) -> Vec<Deferred> {
        std::mem::take(&mut self.deferred)
    }
}

/// Poll a server component once without blocking.
///
/// A pending future is later driven by the render stream, which polls it
/// again with a real waker.
pub(crate) fn poll_once(future: &mut NodeFuture) -> Poll<anyhow::Result<Node>> {
    let mut cx = Context::from_waker(noop_waker_ref());
    future.poll_unpin(&mut cx)
}
