//! In-memory storage backend
//!
//! Keeps everything in `RwLock`-guarded maps. Useful for tests and for
//! throwaway engines; nothing survives the process.

use super::traits::{CommitBatch, OpenStore, StorageError, StorageResult, VersionStore};
use crate::graph::{Chronicle, Version};
use crate::identity::{Handle, HandleState, IdentityRecord};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct MemoryState {
    identities: BTreeMap<Handle, IdentityRecord>,
    versions: BTreeMap<Handle, Vec<Version>>,
    count: usize,
}

/// Volatile version store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    fail_next_commit: AtomicBool,
    bulk_loading: AtomicBool,
    bulk_loads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit_batch` fail with `StorageError::Rejected`.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Whether a bulk load is currently open
    pub fn is_bulk_loading(&self) -> bool {
        self.bulk_loading.load(Ordering::SeqCst)
    }

    /// Number of bulk loads completed so far
    pub fn bulk_loads(&self) -> usize {
        self.bulk_loads.load(Ordering::SeqCst)
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| StorageError::LockPoisoned)
    }
}

impl MemoryState {
    fn insert_version(&mut self, version: &Version) {
        let chronicle = self.versions.entry(version.handle).or_default();
        let at = chronicle.partition_point(|v| v.commit <= version.commit);
        chronicle.insert(at, version.clone());
        self.count += 1;
    }
}

impl OpenStore for MemoryStore {
    /// There is no file behind a memory store; the path is ignored.
    fn open(_path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::new())
    }

    fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::new())
    }
}

impl VersionStore for MemoryStore {
    fn put_version(&self, version: &Version) -> StorageResult<()> {
        self.write()?.insert_version(version);
        Ok(())
    }

    fn get_chronicle(&self, handle: Handle) -> StorageResult<Chronicle> {
        let versions = self.read()?.versions.get(&handle).cloned().unwrap_or_default();
        Ok(Chronicle::new(handle, versions))
    }

    fn commit_batch(&self, batch: &CommitBatch) -> StorageResult<()> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Rejected(format!(
                "injected failure for commit {}",
                batch.sequence
            )));
        }

        let mut state = self.write()?;
        for record in &batch.identities.allocated {
            state.identities.insert(record.handle, record.clone());
        }
        for (handle, uuid) in &batch.identities.aliases {
            if let Some(record) = state.identities.get_mut(handle) {
                record.uuids.push(*uuid);
            }
        }
        for (handle, kind) in &batch.identities.defined {
            if let Some(record) = state.identities.get_mut(handle) {
                record.state = HandleState::Defined(*kind);
            }
        }
        for version in &batch.versions {
            state.insert_version(version);
        }
        Ok(())
    }

    fn load_identities(&self) -> StorageResult<Vec<IdentityRecord>> {
        Ok(self.read()?.identities.values().cloned().collect())
    }

    fn load_all_versions(&self) -> StorageResult<Vec<Version>> {
        let state = self.read()?;
        let mut versions: Vec<Version> = state.versions.values().flatten().cloned().collect();
        versions.sort_by_key(|v| v.commit);
        Ok(versions)
    }

    fn version_count(&self) -> StorageResult<usize> {
        Ok(self.read()?.count)
    }

    fn begin_bulk_load(&self) -> StorageResult<()> {
        self.bulk_loading.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn end_bulk_load(&self) -> StorageResult<()> {
        self.bulk_loading.store(false, Ordering::SeqCst);
        self.bulk_loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
