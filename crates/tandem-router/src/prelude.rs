//! Prelude for convenient imports.
//!
//! ```rust,ignore
//! use tandem_router::prelude::*;
//! ```

pub use crate::{
    middleware_fn, Flow, Layout, Middleware, Page, Route, RouteMatch, RoutePattern, RouteTable,
};
pub use tandem_core::{Element, Node, RequestContext};
