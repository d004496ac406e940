//! Client half of the rendering pipeline.
//!
//! - `ClientManifest` / `ModuleCache` - id to loader table, and
//!   deduplicated on-demand loading of client modules
//! - `StreamDecoder` - consumes frames in arrival order into a
//!   `ClientNode` tree whose deferred parts are `Lazy` placeholders
//! - `hydrate` / `MountedTree` - attach islands to server markup, and
//!   reconcile on client-side navigation

mod cache;
mod component;
mod decoder;
mod error;
mod hydrate;
mod tree;

pub use cache::*;
pub use component::*;
pub use decoder::*;
pub use error::*;
pub use hydrate::*;
pub use tree::*;
