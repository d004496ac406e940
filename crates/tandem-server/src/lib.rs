//! HTTP surface of a Tandem application.
//!
//! - `TandemConfig` - App settings, loadable from TOML
//! - `TandemApp` - Builder registering routes, modules, server functions,
//!   storage and migrations
//! - `TandemServer` - Answers `http::Request`s: the SSR document, the
//!   frame stream (`Accept: text/x-component` or `?_rsc`), and action
//!   calls on the action path
//!
//! # Example
//!
//! ```rust,ignore
//! let server = TandemApp::from_config(TandemConfig::from_file("tandem.toml")?)
//!     .page("/items/:id", item_page)
//!     .build()
//!     .await?;
//!
//! let response = server.handle(request).await;
//! ```

mod app;
mod body;
mod config;
mod server;

pub use app::*;
pub use body::{HttpResponse, ResponseBody};
pub use config::*;
pub use server::TandemServer;
