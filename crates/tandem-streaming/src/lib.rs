//! Streaming primitives for the frame protocol.
//!
//! A render is carried as an append-only sequence of frames:
//! - `Frame` - One `value`, `reference`, `resolution`, `error` or `end` unit
//! - `Model` - Tree encoding inside value/resolution payloads, with
//!   `"$<id>"` references to other frames
//! - `FrameEncoder` / `FrameDecoder` - Newline-delimited JSON wire codec
//! - `FrameSink` - Order-enforcing sink over any byte sink
//! - `FlushPolicy` - Explicit flush control
//! - `Shell` - HTML document template for the SSR response

mod codec;
mod error;
mod flush;
mod frame;
mod model;
mod shell;
mod sink;

pub use codec::*;
pub use error::*;
pub use flush::*;
pub use frame::*;
pub use model::*;
pub use shell::*;
pub use sink::*;

/// Content type of a frame stream.
pub const FRAME_CONTENT_TYPE: &str = "text/x-component";
