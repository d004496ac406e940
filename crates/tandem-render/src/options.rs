//! Render options and statistics.

use std::time::Duration;

use crate::fallback::FallbackStrategy;

/// Default bound on how long deferred subtrees may stay pending.
pub const DEFAULT_SUSPENSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for one primary render.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Deadline for deferred subtrees, measured from the start of the
    /// render. Subtrees still pending at the deadline get an error frame.
    /// `None` waits indefinitely.
    pub suspense_timeout: Option<Duration>,
    /// What to send when a deferred subtree fails.
    pub fallback: FallbackStrategy,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suspense_timeout(mut self, timeout: Duration) -> Self {
        self.suspense_timeout = Some(timeout);
        self
    }

    /// Wait for deferred subtrees without a deadline.
    pub fn without_timeout(mut self) -> Self {
        self.suspense_timeout = None;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            suspense_timeout: Some(DEFAULT_SUSPENSE_TIMEOUT),
            fallback: FallbackStrategy::default(),
        }
    }
}

/// Counters for a finished (or abandoned) render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames in the shell.
    pub shell_frames: usize,
    /// Frames yielded in total, shell included.
    pub frames: usize,
    /// Subtrees deferred past the shell.
    pub deferred: usize,
    pub resolved: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Whether the stream stopped because the request was cancelled.
    pub cancelled: bool,
}
