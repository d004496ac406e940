//! Module reference registry.
//!
//! The registry is an arena of stable string identifiers. Every side of
//! the pipeline keeps its own table keyed by the same ids:
//! - `ReferenceTable<ModuleReference>` - client modules, as the server
//!   describes them in reference frames
//! - `ReferenceTable<ServerFunction>` - server-only functions callable as
//!   actions
//! - the client loader table and the SSR component table, defined by the
//!   crates that own those passes
//!
//! Resolution is always a pure lookup of id plus which table is asked;
//! no table hands out live objects belonging to another side.

mod error;
mod module;
mod registry;
mod server_fn;
mod table;

pub use error::*;
pub use module::*;
pub use registry::*;
pub use server_fn::*;
pub use table::*;
