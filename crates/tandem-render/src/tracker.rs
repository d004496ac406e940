//! Bookkeeping for deferred subtrees.

use std::collections::HashMap;

use tandem_streaming::FrameId;

/// Status of a deferred subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtreeStatus {
    /// Placeholder sent, value not yet available.
    Pending,
    /// Resolution frame sent.
    Resolved,
    /// Failed with error.
    Failed(String),
    /// Abandoned by the suspense deadline.
    TimedOut,
    /// Abandoned because the request was cancelled.
    Abandoned,
}

#[derive(Debug)]
struct TrackedSubtree {
    component: String,
    status: SubtreeStatus,
}

/// Tracks every deferred subtree of one render.
#[derive(Debug, Default)]
pub struct SubtreeTracker {
    subtrees: HashMap<FrameId, TrackedSubtree>,
    /// Order subtrees were deferred.
    order: Vec<FrameId>,
}

impl SubtreeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly deferred subtree.
    pub fn defer(&mut self, id: FrameId, component: impl Into<String>) {
        self.subtrees.insert(
            id,
            TrackedSubtree {
                component: component.into(),
                status: SubtreeStatus::Pending,
            },
        );
        self.order.push(id);
    }

    pub fn resolve(&mut self, id: FrameId) {
        self.set(id, SubtreeStatus::Resolved);
    }

    pub fn fail(&mut self, id: FrameId, error: impl Into<String>) {
        self.set(id, SubtreeStatus::Failed(error.into()));
    }

    /// Mark every pending subtree as timed out, returning their ids in
    /// deferral order.
    pub fn time_out_pending(&mut self) -> Vec<FrameId> {
        self.close_pending(SubtreeStatus::TimedOut)
    }

    /// Mark every pending subtree as abandoned.
    pub fn abandon_pending(&mut self) -> Vec<FrameId> {
        self.close_pending(SubtreeStatus::Abandoned)
    }

    fn close_pending(&mut self, status: SubtreeStatus) -> Vec<FrameId> {
        let pending = self.pending();
        for id in &pending {
            self.set(*id, status.clone());
        }
        pending
    }

    fn set(&mut self, id: FrameId, status: SubtreeStatus) {
        if let Some(subtree) = self.subtrees.get_mut(&id) {
            subtree.status = status;
        }
    }

    /// Pending subtree ids in deferral order.
    pub fn pending(&self) -> Vec<FrameId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.status(*id) == Some(&SubtreeStatus::Pending))
            .collect()
    }

    pub fn status(&self, id: FrameId) -> Option<&SubtreeStatus> {
        self.subtrees.get(&id).map(|s| &s.status)
    }

    /// Component name of a deferred subtree.
    pub fn component(&self, id: FrameId) -> Option<&str> {
        self.subtrees.get(&id).map(|s| s.component.as_str())
    }

    /// Check if no subtree is still pending.
    pub fn is_complete(&self) -> bool {
        self.subtrees
            .values()
            .all(|s| s.status != SubtreeStatus::Pending)
    }

    /// Number of subtrees with a status matching `f`.
    pub fn count(&self, f: impl Fn(&SubtreeStatus) -> bool) -> usize {
        self.subtrees.values().filter(|s| f(&s.status)).count()
    }

    /// Total deferred subtrees.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
