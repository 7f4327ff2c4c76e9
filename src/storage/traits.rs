//! Storage trait definitions

use crate::graph::{Chronicle, Version};
use crate::identity::{Handle, IdentityDelta, IdentityRecord};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    /// The backend refused the write
    #[error("Write rejected: {0}")]
    Rejected(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Everything one commit writes: new versions plus the identity changes they need
#[derive(Debug, Clone, Default)]
pub struct CommitBatch {
    /// Global commit sequence number shared by every version in the batch
    pub sequence: u64,
    pub versions: Vec<Version>,
    pub identities: IdentityDelta,
}

impl CommitBatch {
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty() && self.identities.is_empty()
    }
}

/// Trait for version storage backends
///
/// Implementations must be thread-safe (Send + Sync). The engine serializes
/// writes under its commit lock, but reads may arrive from any thread.
pub trait VersionStore: Send + Sync {
    /// Persist a single version. Durable once this returns `Ok`.
    fn put_version(&self, version: &Version) -> StorageResult<()>;

    /// All versions of one entity, ordered by commit sequence
    fn get_chronicle(&self, handle: Handle) -> StorageResult<Chronicle>;

    /// Write a whole commit atomically: every version and identity change, or nothing.
    fn commit_batch(&self, batch: &CommitBatch) -> StorageResult<()>;

    /// Every persisted identity, for restoring the handle table on open
    fn load_identities(&self) -> StorageResult<Vec<IdentityRecord>>;

    /// Every persisted version, ordered by commit sequence
    fn load_all_versions(&self) -> StorageResult<Vec<Version>>;

    fn version_count(&self) -> StorageResult<usize>;

    /// Called when a load phase opens. Backends may suspend their own indexing.
    fn begin_bulk_load(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Called when the outermost load phase closes.
    fn end_bulk_load(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Extension trait for opening stores from paths
pub trait OpenStore: VersionStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
