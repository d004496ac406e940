//! Per-request streaming metrics.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tandem_core::RequestId;

/// How a deferred subtree ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtreeOutcome {
    Resolved,
    Failed,
}

/// Metrics for one deferred subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreeMetrics {
    /// Frame id of the subtree.
    pub frame: u32,
    /// Time from request start to the subtree's frame (microseconds).
    pub settled_us: u64,
    pub outcome: SubtreeOutcome,
}

/// Metrics for a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetrics {
    /// Request ID for correlation.
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Time to shell flush (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_shell_us: Option<u64>,
    /// Time to the first deferred subtree (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_first_subtree_us: Option<u64>,
    /// Frames written, shell included.
    pub frames: usize,
    /// Deferred subtrees by frame id.
    pub subtrees: BTreeMap<u32, SubtreeMetrics>,
    /// Total request duration (microseconds).
    pub total_duration_us: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// Collector for request metrics.
#[derive(Debug)]
pub struct MetricsCollector {
    request_id: RequestId,
    route: Option<String>,
    start: Instant,
    shell_sent: Option<Instant>,
    first_subtree: Option<Instant>,
    frames: usize,
    subtrees: BTreeMap<u32, SubtreeMetrics>,
}

impl MetricsCollector {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            route: None,
            start: Instant::now(),
            shell_sent: None,
            first_subtree: None,
            frames: 0,
            subtrees: BTreeMap::new(),
        }
    }

    /// Set route pattern.
    pub fn set_route(&mut self, route: impl Into<String>) {
        self.route = Some(route.into());
    }

    /// Record the shell flush.
    pub fn record_shell_sent(&mut self, frames: usize) {
        self.shell_sent = Some(Instant::now());
        self.frames += frames;
    }

    /// Record a frame written after the shell.
    pub fn record_frame(&mut self) {
        self.frames += 1;
    }

    /// Record a deferred subtree's resolution or error frame.
    pub fn record_subtree(&mut self, frame: u32, outcome: SubtreeOutcome) {
        let now = Instant::now();
        if self.first_subtree.is_none() {
            self.first_subtree = Some(now);
        }
        self.subtrees.insert(
            frame,
            SubtreeMetrics {
                frame,
                settled_us: micros(now.duration_since(self.start)),
                outcome,
            },
        );
    }

    /// Finalize and return the metrics.
    pub fn finalize(self, status_code: Option<u16>) -> RequestMetrics {
        let start = self.start;
        RequestMetrics {
            request_id: self.request_id.to_string(),
            route: self.route,
            time_to_shell_us: self.shell_sent.map(|t| micros(t.duration_since(start))),
            time_to_first_subtree_us: self.first_subtree.map(|t| micros(t.duration_since(start))),
            frames: self.frames,
            subtrees: self.subtrees,
            total_duration_us: micros(start.elapsed()),
            status_code,
        }
    }

    /// Time-to-shell so far.
    pub fn time_to_shell(&self) -> Option<Duration> {
        self.shell_sent.map(|t| t.duration_since(self.start))
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

fn micros(duration: Duration) -> u64 {
    duration.as_micros() as u64
}

impl RequestMetrics {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Subtrees that ended with an error frame.
    pub fn failed_subtrees(&self) -> usize {
        self.subtrees
            .values()
            .filter(|s| s.outcome == SubtreeOutcome::Failed)
            .count()
    }

    /// Emit as one structured log event.
    pub fn log(&self) {
        tracing::info!(
            request_id = %self.request_id,
            route = self.route.as_deref().unwrap_or("-"),
            time_to_shell_us = self.time_to_shell_us,
            time_to_first_subtree_us = self.time_to_first_subtree_us,
            frames = self.frames,
            subtrees = self.subtrees.len(),
            failed = self.failed_subtrees(),
            total_us = self.total_duration_us,
            status = self.status_code,
            "request metrics"
        );
    }

    /// Format as human-readable summary.
    pub fn to_summary(&self) -> String {
        let mut lines = vec![format!("Request: {}", self.request_id)];

        if let Some(tts) = self.time_to_shell_us {
            lines.push(format!("  Time to shell: {}us ({:.2}ms)", tts, tts as f64 / 1000.0));
        }
        if let Some(ttfs) = self.time_to_first_subtree_us {
            lines.push(format!(
                "  Time to first subtree: {}us ({:.2}ms)",
                ttfs,
                ttfs as f64 / 1000.0
            ));
        }
        lines.push(format!("  Frames: {}", self.frames));

        for subtree in self.subtrees.values() {
            let failed = match subtree.outcome {
                SubtreeOutcome::Failed => " [error]",
                SubtreeOutcome::Resolved => "",
            };
            lines.push(format!(
                "    ${}: {}us ({:.2}ms){}",
                subtree.frame,
                subtree.settled_us,
                subtree.settled_us as f64 / 1000.0,
                failed
            ));
        }

        lines.join("\n")
    }
}
