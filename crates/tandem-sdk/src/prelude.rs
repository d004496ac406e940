//! Prelude for convenient imports.
//!
//! ```rust,ignore
//! use tandem_sdk::prelude::*;
//! ```
//!
//! This imports all commonly used items:
//! - Tree: `Node`, `Element`, `RequestContext`, request state
//! - Routing: `Route`, `Flow`, `middleware_fn`
//! - Modules: `ModuleReference`, `ServerFunction`, `ActionOutcome`
//! - App: `TandemApp`, `TandemConfig`, `TandemServer`

// Core types
pub use tandem_core::{
    current, define_request_state, try_current, with_request, Element, Node, Props, RequestContext,
    RequestState, TandemError,
};

// Routing
pub use tandem_router::{middleware_fn, Flow, Layout, Middleware, Page, Route};

// Modules and actions
pub use tandem_registry::{ActionOutcome, ModuleReference, ServerFunction};
pub use tandem_render::SsrComponent;

// Storage
pub use tandem_store::{Migration, SessionId, SessionStore, Storage};

// App
pub use tandem_observability::{init_logging, LoggingConfig};
pub use tandem_server::{TandemApp, TandemConfig, TandemServer};
