//! Action invocation channel.
//!
//! After the initial load a client calls server functions by reference
//! id through a single endpoint:
//! - `ActionRequest` - `{referenceId, args}` request body
//! - `ActionChannel` - resolves the id, runs the function in a fresh
//!   request context and folds the outcome into an envelope
//! - `ActionEnvelope` - `{kind, payload}` response, with the HTTP status
//!   it should be sent with

mod channel;
mod envelope;
mod error;

pub use channel::*;
pub use envelope::*;
pub use error::*;
