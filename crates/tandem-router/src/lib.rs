//! Ordered routing for Tandem.
//!
//! Routes are matched by a linear scan in registration order; the first
//! pattern that matches wins, so specific patterns must be registered
//! before catch-alls:
//!
//! ```text
//! /                -> home
//! /items/:id       -> item detail   (params: id)
//! /docs/*path      -> docs          (wildcard: path)
//! /*               -> not-found page
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use tandem_router::prelude::*;
//!
//! let mut table = RouteTable::new();
//! table.layout("/", |_cx: &RequestContext, children: Node| {
//!     Element::new("main").child(children).into()
//! })?;
//! table.route(
//!     Route::new("/items/:id")
//!         .with(middleware_fn(|cx| async move {
//!             cx.set_response_header(CACHE_CONTROL, HeaderValue::from_static("no-store"));
//!             Ok(Flow::Continue)
//!         }))
//!         .page(|cx: &RequestContext| Node::text(cx.param("id").unwrap_or_default())),
//! )?;
//! ```

mod config;
mod middleware;
mod pattern;
pub mod prelude;
mod route;
mod table;

pub use config::*;
pub use middleware::*;
pub use pattern::*;
pub use route::*;
pub use table::*;
