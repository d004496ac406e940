//! SSR bridge: the second render pass.
//!
//! The same tree is rendered again, but client boundaries are resolved
//! through the SSR table and rendered to HTML right away. Each one is
//! wrapped in island markers carrying its module id, so hydration can
//! pair the markup with the `reference` frames of the primary pass.

use std::collections::HashMap;
use std::sync::Arc;
use std::task::Poll;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tandem_core::{scoped, Node, NodeFuture, RequestContext};
use tandem_registry::ReferenceTable;
use tandem_streaming::{
    escape_html, island_open, Frame, FrameId, FrameKind, Model, Reference, Shell, ISLAND_CLOSE,
};
use tokio::time::Instant;

use crate::error::RenderError;
use crate::html::{is_void, render_attributes, render_data};
use crate::options::RenderOptions;
use crate::serializer::poll_once;

/// Server-side implementation of a client module, used for first paint.
pub trait SsrComponent: Send + Sync {
    /// Render the non-interactive markup for `props`.
    fn render(&self, props: &Value) -> anyhow::Result<Node>;
}

impl<F> SsrComponent for F
where
    F: Fn(&Value) -> Node + Send + Sync,
{
    fn render(&self, props: &Value) -> anyhow::Result<Node> {
        Ok(self(props))
    }
}

/// SSR resolution table, keyed by the same module ids as the client table.
pub type SsrTable = ReferenceTable<Arc<dyn SsrComponent>>;

/// A client boundary as rendered by the SSR pass.
#[derive(Debug, Clone, PartialEq)]
pub struct IslandMarker {
    pub module_id: String,
    pub props: Value,
}

/// Output of the SSR pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SsrOutput {
    pub html: String,
    /// Islands in document order.
    pub islands: Vec<IslandMarker>,
}

impl SsrOutput {
    /// Module ids of the islands, in document order.
    pub fn island_ids(&self) -> Vec<&str> {
        self.islands.iter().map(|i| i.module_id.as_str()).collect()
    }

    /// Wrap the markup in a full document.
    pub fn into_document(self, shell: &Shell, stream_url: &str) -> String {
        shell.render_document(&self.html, stream_url)
    }

    fn append(&mut self, other: SsrOutput) {
        self.html.push_str(&other.html);
        self.islands.extend(other.islands);
    }
}

/// Renders trees to HTML for first paint.
///
/// Server nodes follow the rules of the primary pass. A node that is
/// ready on its first poll belongs to the shell, and its failure fails
/// the render. A node that suspends is awaited up to the suspense
/// deadline; if it fails or times out, only that subtree is replaced.
#[derive(Clone)]
pub struct SsrRenderer {
    table: Arc<SsrTable>,
    options: RenderOptions,
}

impl SsrRenderer {
    pub fn new(table: Arc<SsrTable>) -> Self {
        Self {
            table,
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

    pub fn table(&self) -> &SsrTable {
        &self.table
    }

    /// Render `tree` to HTML.
    pub async fn render(&self, tree: &Node, cx: &RequestContext) -> Result<SsrOutput, RenderError> {
        let deadline = self.options.suspense_timeout.map(|t| Instant::now() + t);
        let mut output = SsrOutput::default();
        if let Err(err) = self.walk(tree, cx, false, deadline, &mut output).await {
            tracing::warn!(request_id = %cx.request_id(), error = %err, "ssr pass failed");
            return Err(err);
        }
        tracing::debug!(
            request_id = %cx.request_id(),
            bytes = output.html.len(),
            islands = output.islands.len(),
            "ssr pass rendered"
        );
        Ok(output)
    }

    fn walk<'a>(
        &'a self,
        node: &'a Node,
        cx: &'a RequestContext,
        in_island: bool,
        deadline: Option<Instant>,
        out: &'a mut SsrOutput,
    ) -> BoxFuture<'a, Result<(), RenderError>> {
        async move {
            if cx.is_cancelled() {
                return Err(RenderError::Cancelled);
            }

            match node {
                Node::Text(text) => out.html.push_str(&escape_html(text)),
                Node::Data(value) => out.html.push_str(&render_data(value)),
                Node::Element(el) => {
                    out.html.push_str(&format!("<{}{}>", el.tag, render_attributes(&el.props)));
                    if !is_void(&el.tag) {
                        for child in &el.children {
                            self.walk(child, cx, in_island, deadline, out).await?;
                        }
                        out.html.push_str(&format!("</{}>", el.tag));
                    }
                }
                Node::Fragment(children) => {
                    for child in children {
                        self.walk(child, cx, in_island, deadline, out).await?;
                    }
                }
                Node::Segment { child, .. } => {
                    self.walk(child, cx, in_island, deadline, out).await?
                }
                Node::Server(server) => {
                    let mut future = scoped(cx.clone(), server.call()).boxed();
                    match poll_once(&mut future) {
                        Poll::Ready(result) => {
                            let child =
                                result.map_err(|err| RenderError::component(&server.name, &err))?;
                            self.walk(&child, cx, in_island, deadline, out).await?;
                        }
                        Poll::Pending => {
                            self.suspended(&server.name, future, cx, in_island, deadline, out)
                                .await?
                        }
                    }
                }
                Node::Client(client) => {
                    let component = self.table.resolve(&client.module_id).map_err(|_| {
                        RenderError::UnknownModule {
                            table: "ssr",
                            id: client.module_id.clone(),
                        }
                    })?;
                    let rendered = component
                        .render(&client.props)
                        .map_err(|err| RenderError::component(&client.module_id, &err))?;

                    // Client nodes inside an island belong to that island's
                    // own markup.
                    if in_island {
                        return self.walk(&rendered, cx, true, deadline, out).await;
                    }
                    out.islands.push(IslandMarker {
                        module_id: client.module_id.clone(),
                        props: client.props.clone(),
                    });
                    out.html.push_str(&island_open(&client.module_id));
                    self.walk(&rendered, cx, true, deadline, out).await?;
                    out.html.push_str(ISLAND_CLOSE);
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Await a server node that suspended, then render its subtree.
    ///
    /// Failures inside the subtree stay inside it; only cancellation
    /// escapes.
    async fn suspended(
        &self,
        component: &str,
        future: NodeFuture,
        cx: &RequestContext,
        in_island: bool,
        deadline: Option<Instant>,
        out: &mut SsrOutput,
    ) -> Result<(), RenderError> {
        let settled = tokio::select! {
            biased;
            _ = cx.cancellation().cancelled() => return Err(RenderError::Cancelled),
            result = future => Some(result),
            _ = expiry(deadline) => None,
        };

        let message = match settled {
            Some(Ok(child)) => {
                let mut rendered = SsrOutput::default();
                match self.walk(&child, cx, in_island, deadline, &mut rendered).await {
                    Ok(()) => {
                        out.append(rendered);
                        return Ok(());
                    }
                    Err(RenderError::Cancelled) => return Err(RenderError::Cancelled),
                    Err(err) => err.to_string(),
                }
            }
            Some(Err(err)) => RenderError::component(component, &err).to_string(),
            None => "timed out".to_string(),
        };
        tracing::warn!(
            request_id = %cx.request_id(),
            component = %component,
            error = %message,
            "deferred subtree failed during ssr pass"
        );

        if let Some(node) = self.options.fallback.replacement(&message) {
            let mut rendered = SsrOutput::default();
            match self.walk(&node, cx, in_island, deadline, &mut rendered).await {
                Ok(()) => {
                    out.append(rendered);
                    return Ok(());
                }
                Err(RenderError::Cancelled) => return Err(RenderError::Cancelled),
                Err(_) => {}
            }
        }
        out.html.push_str(&format!(
            "<template data-tandem-error=\"{}\"></template>",
            escape_html(component)
        ));
        Ok(())
    }
}

/// Resolves at the suspense deadline, or never.
async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

const MAX_REFERENCE_DEPTH: usize = 512;

/// Client boundaries of a primary-pass stream, in tree order.
///
/// Pending references are followed into their resolutions; subtrees that
/// failed or never resolved contribute nothing.
pub fn primary_islands(frames: &[Frame]) -> Result<Vec<String>, RenderError> {
    let mut by_id: HashMap<FrameId, &Frame> = HashMap::new();
    let mut resolutions: HashMap<FrameId, &Frame> = HashMap::new();
    for frame in frames {
        match frame.kind {
            FrameKind::Value | FrameKind::Reference => {
                by_id.insert(frame.id, frame);
            }
            FrameKind::Resolution => {
                resolutions.insert(frame.id, frame);
            }
            FrameKind::Error | FrameKind::End => {}
        }
    }

    let root = by_id
        .get(&FrameId::ROOT)
        .ok_or_else(|| RenderError::Mismatch("primary stream has no root frame".into()))?;
    let mut islands = Vec::new();
    collect_islands(&payload_model(root)?, &by_id, &resolutions, 0, &mut islands)?;
    Ok(islands)
}

fn payload_model(frame: &Frame) -> Result<Model, RenderError> {
    Model::from_json(&frame.payload)
        .map_err(|e| RenderError::Mismatch(format!("frame {}: {}", frame.id, e)))
}

fn collect_islands(
    model: &Model,
    by_id: &HashMap<FrameId, &Frame>,
    resolutions: &HashMap<FrameId, &Frame>,
    depth: usize,
    out: &mut Vec<String>,
) -> Result<(), RenderError> {
    if depth > MAX_REFERENCE_DEPTH {
        return Err(RenderError::Mismatch("reference depth exceeded".into()));
    }
    match model {
        Model::Text(_) | Model::Data(_) => Ok(()),
        Model::Element { children, .. } | Model::Fragment(children) => children
            .iter()
            .try_for_each(|c| collect_islands(c, by_id, resolutions, depth, out)),
        Model::Segment { child, .. } => collect_islands(child, by_id, resolutions, depth, out),
        Model::Ref(id) => {
            let Some(frame) = by_id.get(id) else {
                return Err(RenderError::Mismatch(format!("dangling reference to frame {}", id)));
            };
            match frame.kind {
                FrameKind::Value => {
                    collect_islands(&payload_model(frame)?, by_id, resolutions, depth + 1, out)
                }
                _ => match frame.as_reference() {
                    Ok(Reference::Module(module)) => {
                        out.push(module.id.as_str().to_string());
                        Ok(())
                    }
                    Ok(Reference::Pending) => match resolutions.get(id) {
                        Some(resolution) => collect_islands(
                            &payload_model(resolution)?,
                            by_id,
                            resolutions,
                            depth + 1,
                            out,
                        ),
                        None => Ok(()),
                    },
                    Err(e) => Err(RenderError::Mismatch(e.to_string())),
                },
            }
        }
    }
}

/// Check that the SSR pass and the primary pass agree on client
/// boundaries: same count, same module ids, same order.
pub fn check_shapes(ssr: &SsrOutput, primary: &[Frame]) -> Result<(), RenderError> {
    let expected = primary_islands(primary)?;
    let actual = ssr.island_ids();

    if expected.len() != actual.len() {
        return Err(RenderError::Mismatch(format!(
            "primary pass has {} boundary nodes, ssr pass rendered {}",
            expected.len(),
            actual.len()
        )));
    }
    if let Some((index, (want, got))) = expected
        .iter()
        .zip(actual.iter())
        .enumerate()
        .find(|(_, (want, got))| want.as_str() != **got)
    {
        return Err(RenderError::Mismatch(format!(
            "boundary {} is {} in the primary pass but {} in the ssr pass",
            index, want, got
        )));
    }
    Ok(())
}
