//! Request lifecycle tracking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Lifecycle phases for a streamed render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Request received, processing started.
    Start,
    /// Shell frames have been flushed to the client.
    ShellSent,
    /// A deferred subtree's resolution (or error) frame was sent.
    Resolved(u32),
    /// Terminating frame sent.
    Completion,
    /// An error occurred.
    Error(String),
}

/// Timing context for observability.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: HashMap<String, Instant>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: HashMap::new(),
        }
    }

    /// Record a timing mark.
    pub fn mark(&mut self, name: &str) {
        self.marks.insert(name.to_string(), Instant::now());
    }

    /// Mark a deferred subtree as resolved.
    pub fn mark_resolved(&mut self, id: u32) {
        self.mark(&format!("resolved_{}", id));
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time from start to a named mark.
    pub fn since_start(&self, name: &str) -> Option<Duration> {
        self.marks.get(name).map(|t| t.duration_since(self.start))
    }

    /// Get time to shell flush.
    pub fn time_to_shell(&self) -> Option<Duration> {
        self.since_start("shell_sent")
    }

    /// Get time to the first deferred resolution.
    pub fn time_to_first_resolution(&self) -> Option<Duration> {
        self.marks
            .iter()
            .filter(|(k, _)| k.starts_with("resolved_"))
            .map(|(_, t)| t.duration_since(self.start))
            .min()
    }

    /// Timing for a specific deferred subtree.
    pub fn resolution_time(&self, id: u32) -> Option<Duration> {
        self.since_start(&format!("resolved_{}", id))
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}
