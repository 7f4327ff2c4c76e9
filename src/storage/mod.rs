//! Storage backends for chronicle
//!
//! Versions and the handle table are persisted through the `VersionStore`
//! trait. `SqliteStore` is the durable backend; `MemoryStore` keeps
//! everything in process and can inject commit failures for tests.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CommitBatch, OpenStore, StorageError, StorageResult, VersionStore};
