//! Explicit flush control.

use serde::{Deserialize, Serialize};

/// When the sink pushes buffered frames to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Flush the shell as one write, then every later frame as it comes.
    #[default]
    AfterShell,
    /// Flush after every frame, shell included.
    EveryFrame,
    /// Flush only when asked, or when the buffer limit is reached.
    Manual,
}

impl FlushPolicy {
    /// Check if should flush once the shell is complete.
    pub fn flush_after_shell(&self) -> bool {
        matches!(self, Self::AfterShell | Self::EveryFrame)
    }

    /// Check if should flush after each deferred frame.
    pub fn flush_after_frame(&self) -> bool {
        matches!(self, Self::AfterShell | Self::EveryFrame)
    }

    /// Check if shell frames are written one by one.
    pub fn flush_shell_frames(&self) -> bool {
        matches!(self, Self::EveryFrame)
    }
}

/// Controller for managing flush behavior.
#[derive(Debug)]
pub struct FlushController {
    policy: FlushPolicy,
    pending_bytes: usize,
    /// Maximum bytes to buffer before a forced flush (0 = no limit).
    max_buffer: usize,
    flushes: usize,
}

impl FlushController {
    pub fn new(policy: FlushPolicy) -> Self {
        Self {
            policy,
            pending_bytes: 0,
            max_buffer: 0,
            flushes: 0,
        }
    }

    /// Set maximum buffer size before auto-flush.
    pub fn with_max_buffer(mut self, bytes: usize) -> Self {
        self.max_buffer = bytes;
        self
    }

    /// Record bytes added to buffer.
    pub fn add_bytes(&mut self, count: usize) {
        self.pending_bytes += count;
    }

    /// Bytes buffered since the last flush.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Whether the buffer limit forces a flush.
    pub fn over_limit(&self) -> bool {
        self.max_buffer > 0 && self.pending_bytes >= self.max_buffer
    }

    /// Reset pending byte count after flush.
    pub fn reset(&mut self) {
        self.pending_bytes = 0;
        self.flushes += 1;
    }

    /// Number of flushes so far.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }
}

impl Default for FlushController {
    fn default() -> Self {
        Self::new(FlushPolicy::default())
    }
}
