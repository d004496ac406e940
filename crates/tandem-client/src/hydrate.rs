//! Hydration of server markup and reconciliation on navigation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;
use tandem_streaming::{ISLAND_CLOSE, ISLAND_OPEN_PREFIX};

use crate::cache::ModuleCache;
use crate::component::ClientComponent;
use crate::error::ClientError;
use crate::tree::{ClientNode, IslandRef};

/// Module ids of the outermost island markers in `markup`, in order.
///
/// Markers nested inside an island belong to that island's own markup
/// and are skipped.
pub fn markup_islands(markup: &str) -> Result<Vec<String>, ClientError> {
    let mut islands = Vec::new();
    let mut depth = 0usize;
    let mut rest = markup;

    loop {
        let open = rest.find(ISLAND_OPEN_PREFIX);
        let close = rest.find(ISLAND_CLOSE);
        match (open, close) {
            (Some(o), c) if c.map_or(true, |c| o < c) => {
                let after = &rest[o + ISLAND_OPEN_PREFIX.len()..];
                let end = after
                    .find("-->")
                    .ok_or_else(|| ClientError::Hydration("unterminated island marker".into()))?;
                if depth == 0 {
                    islands.push(after[..end].to_string());
                }
                depth += 1;
                rest = &after[end + 3..];
            }
            (_, Some(c)) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ClientError::Hydration("island close marker without opening".into()))?;
                rest = &rest[c + ISLAND_CLOSE.len()..];
            }
            _ => break,
        }
    }

    if depth != 0 {
        return Err(ClientError::Hydration(format!("{} island markers left open", depth)));
    }
    Ok(islands)
}

/// Islands of a resolved tree with their placement keys.
///
/// A placement key is the chain of enclosing segment keys plus the
/// island's ordinal within its innermost segment.
fn placements(tree: &ClientNode) -> Vec<(String, IslandRef)> {
    let mut counters = HashMap::new();
    let mut out = Vec::new();
    collect_placements(tree, "", &mut counters, &mut out);
    out
}

fn collect_placements(
    node: &ClientNode,
    scope: &str,
    counters: &mut HashMap<String, usize>,
    out: &mut Vec<(String, IslandRef)>,
) {
    match node {
        ClientNode::Island(island) => {
            let ordinal = counters.entry(scope.to_string()).or_insert(0);
            out.push((format!("{}#{}", scope, ordinal), island.clone()));
            *ordinal += 1;
        }
        ClientNode::Element { children, .. } | ClientNode::Fragment(children) => {
            for child in children {
                collect_placements(child, scope, counters, out);
            }
        }
        ClientNode::Segment { key, child } => {
            let scope = format!("{}>{}", scope, key);
            collect_placements(child, &scope, counters, out);
        }
        ClientNode::Lazy(lazy) => {
            if let Some(Ok(node)) = lazy.try_get() {
                collect_placements(&node, scope, counters, out);
            }
        }
        ClientNode::Text(_) | ClientNode::Data(_) => {}
    }
}

/// An island bound to its loaded component and state.
pub struct MountedIsland {
    key: String,
    module_id: String,
    props: Value,
    state: Value,
    component: Arc<dyn ClientComponent>,
}

impl MountedIsland {
    async fn mount(key: String, island: &IslandRef, cache: &ModuleCache) -> Result<Self, ClientError> {
        let component = island.load(cache).await?;
        let state = component.mount(island.props());
        Ok(Self {
            key,
            module_id: island.module_id().to_string(),
            props: island.props().clone(),
            state,
            component,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn props(&self) -> &Value {
        &self.props
    }

    pub fn state(&self) -> &Value {
        &self.state
    }
}

impl fmt::Debug for MountedIsland {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountedIsland")
            .field("key", &self.key)
            .field("module_id", &self.module_id)
            .field("state", &self.state)
            .finish()
    }
}

/// What a navigation did to the mounted islands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavigationReport {
    /// Islands whose state survived.
    pub kept: usize,
    /// Islands mounted fresh.
    pub mounted: usize,
    /// Previously mounted islands that were dropped.
    pub removed: usize,
}

/// A hydrated page.
#[derive(Debug)]
pub struct MountedTree {
    tree: ClientNode,
    islands: Vec<MountedIsland>,
}

/// Attach the islands of `tree` to server-rendered `markup`.
///
/// Waits for every deferred subtree, then checks that the markup's island
/// markers and the tree's islands agree in count, order and module id
/// before loading any component.
pub async fn hydrate(markup: &str, tree: &ClientNode, cache: &ModuleCache) -> Result<MountedTree, ClientError> {
    let resolved = tree.resolve_deep().await;
    let placed = placements(&resolved);
    let markers = markup_islands(markup)?;

    if markers.len() != placed.len() {
        return Err(ClientError::Hydration(format!(
            "markup has {} islands, tree has {}",
            markers.len(),
            placed.len()
        )));
    }
    if let Some((index, (marker, (_, island)))) = markers
        .iter()
        .zip(placed.iter())
        .enumerate()
        .find(|(_, (marker, (_, island)))| marker.as_str() != island.module_id())
    {
        return Err(ClientError::Hydration(format!(
            "island {} is {} in markup but {} in tree",
            index,
            marker,
            island.module_id()
        )));
    }

    let islands = try_join_all(
        placed
            .iter()
            .map(|(key, island)| MountedIsland::mount(key.clone(), island, cache)),
    )
    .await?;

    tracing::debug!(islands = islands.len(), "hydrated");
    Ok(MountedTree {
        tree: resolved,
        islands,
    })
}

impl MountedTree {
    /// The resolved tree currently mounted.
    pub fn tree(&self) -> &ClientNode {
        &self.tree
    }

    pub fn islands(&self) -> &[MountedIsland] {
        &self.islands
    }

    pub fn island(&self, key: &str) -> Option<&MountedIsland> {
        self.islands.iter().find(|i| i.key == key)
    }

    /// State of the island at `key`.
    pub fn state(&self, key: &str) -> Option<&Value> {
        self.island(key).map(|i| &i.state)
    }

    /// Replace an island's state, as an interaction would.
    pub fn set_state(&mut self, key: &str, state: Value) -> bool {
        match self.islands.iter_mut().find(|i| i.key == key) {
            Some(island) => {
                island.state = state;
                true
            }
            None => false,
        }
    }

    /// Move to the page described by `new_tree`.
    ///
    /// An island keeps its state when the new tree has an island of the
    /// same module at the same placement; it then receives the new props.
    /// Islands under a segment whose key changed get fresh placements and
    /// are mounted again. On a load failure the current page is left as
    /// it was.
    pub async fn navigate(&mut self, new_tree: &ClientNode, cache: &ModuleCache) -> Result<NavigationReport, ClientError> {
        let resolved = new_tree.resolve_deep().await;
        let placed = placements(&resolved);

        let fresh = try_join_all(
            placed
                .iter()
                .filter(|(key, island)| !self.keeps(key, island))
                .map(|(key, island)| MountedIsland::mount(key.clone(), island, cache)),
        )
        .await?;

        let mut fresh: HashMap<String, MountedIsland> = fresh.into_iter().map(|i| (i.key.clone(), i)).collect();
        let mut previous: HashMap<String, MountedIsland> = std::mem::take(&mut self.islands)
            .into_iter()
            .map(|i| (i.key.clone(), i))
            .collect();

        let mut report = NavigationReport::default();
        let mut islands = Vec::with_capacity(placed.len());
        for (key, island) in &placed {
            if let Some(mounted) = fresh.remove(key) {
                report.mounted += 1;
                islands.push(mounted);
            } else if let Some(mut kept) = previous.remove(key) {
                kept.component.update(&mut kept.state, island.props());
                kept.props = island.props().clone();
                report.kept += 1;
                islands.push(kept);
            }
        }
        report.removed = previous.len();

        tracing::debug!(
            kept = report.kept,
            mounted = report.mounted,
            removed = report.removed,
            "navigated"
        );
        self.islands = islands;
        self.tree = resolved;
        Ok(report)
    }

    fn keeps(&self, key: &str, island: &IslandRef) -> bool {
        self.islands
            .iter()
            .any(|m| m.key == key && m.module_id == island.module_id())
    }
}
