//! Storage collaborators for Tandem apps.
//!
//! The pipeline only needs a narrow keyed interface:
//! - `Storage` - async get/set/delete of JSON values, with
//!   `MemoryStore` as the in-process implementation
//! - `Migrator` - ordered migrations applied exactly once, tracked by a
//!   persisted schema version
//! - `SessionStore` - opaque per-session data keyed by `SessionId`
//!
//! # Example
//!
//! ```rust,ignore
//! use tandem_store::{MemoryStore, SessionId, SessionStore};
//!
//! let store = Arc::new(MemoryStore::new());
//! let sessions = SessionStore::<Cart>::new(store);
//!
//! let id = SessionId::generate();
//! let cart = sessions.get_or_create(&id).await?;
//! ```

mod error;
mod memory;
mod migrate;
mod session;
mod storage;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use migrate::{Migration, MigrationReport, Migrator, SCHEMA_VERSION_KEY};
pub use session::{SessionData, SessionId, SessionStore, SESSION_COOKIE};
pub use storage::{Storage, StorageExt};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{MemoryStore, SessionId, SessionStore, Storage, StorageExt, StoreError};
}
