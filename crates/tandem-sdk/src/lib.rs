//! # Tandem SDK
//!
//! Server-first rendering that streams: pages are component trees whose
//! server parts run on the server and stream out as they settle, while
//! client-marked parts travel as module references and hydrate on the
//! client.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tandem_sdk::prelude::*;
//!
//! fn product_page(cx: &RequestContext) -> Node {
//!     let id = cx.param("id").unwrap_or_default();
//!     Element::new("main")
//!         .child(Node::text(format!("Product {}", id)))
//!         .child(Node::server("Reviews", move || reviews(id.clone())))
//!         .child(Node::client("cart#AddToCart", json!({ "sku": "sku-1" })))
//!         .into()
//! }
//!
//! let server = TandemApp::new("store")
//!     .page("/product/:id", product_page)
//!     .client_module(ModuleReference::new("cart#AddToCart", "AddToCart"))
//!     .ssr_component("cart#AddToCart", add_to_cart_markup)
//!     .server_fn("cart#addItem", ServerFunction::unary("addItem", add_item))
//!     .build()
//!     .await?;
//! ```
//!
//! ## Features
//!
//! - **Streaming**: shell first, deferred subtrees as they resolve
//! - **Routing**: first-match patterns with layouts and middleware
//! - **Actions**: server functions called by reference id
//! - **SSR bridge**: first-paint HTML for client modules
//!
//! ## Crate Features
//!
//! - `client` - Stream decoding and hydration (`tandem_client`)

pub mod prelude;

// Re-export core crates
pub use tandem_actions;
pub use tandem_core;
pub use tandem_observability;
pub use tandem_registry;
pub use tandem_render;
pub use tandem_router;
pub use tandem_server;
pub use tandem_store;
pub use tandem_streaming;

#[cfg(feature = "client")]
pub use tandem_client;

// Re-export core types
pub use tandem_core::{Element, Node, RequestContext, TandemError};
pub use tandem_server::{TandemApp, TandemConfig, TandemServer};
