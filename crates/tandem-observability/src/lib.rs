//! Observability for the Tandem pipeline.
//!
//! This crate provides:
//! - `init_logging` - Installs a `tracing` subscriber (JSON or human
//!   format, env filter)
//! - `request_span` - Span carrying a request's id, method and path
//! - `MetricsCollector` - Per-request streaming timings (shell, frames,
//!   deferred subtrees)

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;

pub use tandem_core::{RequestId, TimingContext};
