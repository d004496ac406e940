//! Core abstractions for the Tandem dual-phase rendering pipeline.
//!
//! This crate provides the request-scoped building blocks every other
//! crate leans on:
//! - `Node` - Component tree model (server, client-boundary and value nodes)
//! - `RequestContext` - Per-request state handle
//! - `with_request` / `current` - Context propagation across await points
//! - `RequestState` - Typed, lazily created request-scoped slots
//! - `TimingContext` / `LifecyclePhase` - Request lifecycle tracking
//! - `TandemError` - Error taxonomy shared across the pipeline

mod context;
mod error;
mod lifecycle;
mod node;
mod scope;
mod state;

pub use context::*;
pub use error::*;
pub use lifecycle::*;
pub use node::*;
pub use scope::*;
pub use state::*;
