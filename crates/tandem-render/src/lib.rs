//! Server-side rendering of component trees.
//!
//! Two passes share one tree:
//! - `Renderer` - primary pass; walks the tree, defers suspended server
//!   nodes and turns client boundaries into module references, producing
//!   a `RenderStream` of frames in resolution order
//! - `SsrRenderer` - bridge pass; awaits everything and renders client
//!   boundaries through the SSR table into HTML islands
//!
//! `check_shapes` compares the two passes' boundary nodes.

mod error;
mod fallback;
mod html;
mod options;
mod serializer;
mod ssr;
mod stream;
mod tracker;

pub use error::*;
pub use fallback::*;
pub use html::*;
pub use options::*;
pub use ssr::*;
pub use stream::*;
pub use tracker::*;
