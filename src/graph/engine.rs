//! Engine: the main entry point for authoring and reading the graph

use super::stamp::{ResolvedStamp, Stamp};
use super::version::{Chronicle, DescriptionVersion, EntityKind, ReadHorizon, Version, VersionData};
use crate::export::{ExportError, ExportSummary, GraphExporter};
use crate::identity::{Handle, HandleState, IdentityDelta, IdentityError, IdentityResolver, PublicId};
use crate::index::{LoadPhaseCoordinator, PhaseExit, SecondaryIndex, UnconfirmedHint};
use crate::schema::{
    check_fields, FieldData, FieldDefinitions, FieldSchemaRegistry, SchemaError,
};
use crate::session::AuthoringSession;
use crate::storage::{CommitBatch, MemoryStore, StorageError, VersionStore};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors that can occur in engine operations outside a session commit
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no load phase is active")]
    LoadPhaseNotActive,

    #[error("a load phase is active; close it before exporting")]
    LoadPhaseActive,

    #[error("unknown handle: {0}")]
    UnknownHandle(Handle),

    #[error("{handle} is a {found}, expected a {expected}")]
    WrongKind {
        handle: Handle,
        expected: EntityKind,
        found: EntityKind,
    },

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Whether commits check the `is-a` hierarchy for cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CyclePolicy {
    /// Cycles are left to downstream classification
    #[default]
    Allow,
    /// A commit whose `is-a` edges close a cycle fails with `CommitConflict`
    Reject,
}

/// When semantics are checked against patterns that have no definition yet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PatternPolicy {
    /// At commit: an undefined pattern fails with `UnknownPattern`
    #[default]
    Eager,
    /// At read: commit accepts the semantic and `Engine::read_semantic` validates it
    Deferred,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub cycle_policy: CyclePolicy,
    pub pattern_policy: PatternPolicy,
    /// Warn about child hints the child's own `is-a` axioms do not confirm
    pub verify_navigation_hints: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_policy: CyclePolicy::Allow,
            pattern_policy: PatternPolicy::Eager,
            verify_navigation_hints: true,
        }
    }
}

impl EngineConfig {
    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }

    pub fn with_pattern_policy(mut self, policy: PatternPolicy) -> Self {
        self.pattern_policy = policy;
        self
    }

    pub fn with_navigation_checks(mut self, enabled: bool) -> Self {
        self.verify_navigation_hints = enabled;
        self
    }
}

/// Counts describing the current graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub handles: usize,
    pub pending: usize,
    pub defined: BTreeMap<EntityKind, usize>,
    pub versions: usize,
    pub patterns: usize,
    pub last_commit: u64,
    pub load_phase_depth: usize,
}

/// A semantic and the pattern version it was validated against
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticRead {
    pub semantic: Version,
    pub pattern: Version,
}

impl SemanticRead {
    pub fn fields(&self) -> &[FieldData] {
        self.semantic
            .as_semantic()
            .map(|s| s.fields.as_slice())
            .unwrap_or_default()
    }
}

/// The authoring engine
///
/// Owns the handle table, the field schema registry, the version cache and
/// the secondary indexes, all restored from and persisted to one
/// [`VersionStore`]. Sessions commit one at a time under the commit lock;
/// reads wait on the publish gate so they see a commit entirely or not at all.
pub struct Engine {
    store: Arc<dyn VersionStore>,
    config: EngineConfig,
    pub(crate) resolver: IdentityResolver,
    pub(crate) schema: FieldSchemaRegistry,
    chronicles: DashMap<Handle, Vec<Version>>,
    index: RwLock<SecondaryIndex>,
    load_phase: LoadPhaseCoordinator,
    commit_lock: Mutex<()>,
    publish_gate: RwLock<()>,
    sequence: AtomicU64,
    sessions: AtomicU64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine over a fresh in-memory store with default configuration
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// An engine over a fresh in-memory store
    pub fn with_config(config: EngineConfig) -> Self {
        Self::empty(Arc::new(MemoryStore::new()), config)
    }

    /// Open an engine over `store`, restoring everything it already holds.
    pub fn open(store: Arc<dyn VersionStore>, config: EngineConfig) -> EngineResult<Self> {
        let engine = Self::empty(store, config);
        engine.restore()?;
        Ok(engine)
    }

    fn empty(store: Arc<dyn VersionStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            resolver: IdentityResolver::new(),
            schema: FieldSchemaRegistry::new(),
            chronicles: DashMap::new(),
            index: RwLock::new(SecondaryIndex::new()),
            load_phase: LoadPhaseCoordinator::new(),
            commit_lock: Mutex::new(()),
            publish_gate: RwLock::new(()),
            sequence: AtomicU64::new(0),
            sessions: AtomicU64::new(0),
        }
    }

    fn restore(&self) -> EngineResult<()> {
        self.resolver.restore(self.store.load_identities()?)?;

        let versions = self.store.load_all_versions()?;
        let last = versions.iter().map(|v| v.commit).max().unwrap_or(0);
        for version in &versions {
            self.chronicles.entry(version.handle).or_default().push(version.clone());
        }
        let patterns: BTreeSet<Handle> = versions
            .iter()
            .filter(|v| v.kind() == EntityKind::Pattern)
            .map(|v| v.handle)
            .collect();
        for pattern in patterns {
            self.refresh_pattern(pattern);
        }
        self.index_mut().apply(&versions);
        self.sequence.store(last, Ordering::SeqCst);

        info!(
            handles = self.resolver.len(),
            versions = versions.len(),
            last_commit = last,
            "engine restored"
        );
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn VersionStore {
        self.store.as_ref()
    }

    // === Locks ===

    pub(crate) fn lock_commits(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self) -> RwLockReadGuard<'_, ()> {
        self.publish_gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate_mut(&self) -> RwLockWriteGuard<'_, ()> {
        self.publish_gate.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn index(&self) -> RwLockReadGuard<'_, SecondaryIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn index_mut(&self) -> RwLockWriteGuard<'_, SecondaryIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    // === Sessions ===

    /// Open an authoring session against `stamp`.
    pub fn open_session(&self, stamp: Stamp) -> AuthoringSession<'_> {
        let id = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(session = id, status = %stamp.status, "session opened");
        AuthoringSession::new(self, id, stamp)
    }

    /// Sequence number the next commit will carry. Only meaningful under the commit lock.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst) + 1
    }

    /// Make a durable commit visible to readers.
    ///
    /// Called with the commit lock held, after the store accepted the batch.
    pub(crate) fn publish(&self, batch: CommitBatch) -> Result<(), IdentityError> {
        let _gate = self.gate_mut();
        self.resolver.apply(&batch.identities)?;
        if batch.sequence > 0 {
            self.sequence.fetch_max(batch.sequence, Ordering::SeqCst);
        }

        let mut patterns = Vec::new();
        for version in &batch.versions {
            if version.kind() == EntityKind::Pattern {
                patterns.push(version.handle);
            }
            self.chronicles.entry(version.handle).or_default().push(version.clone());
        }
        for pattern in patterns {
            self.refresh_pattern(pattern);
        }

        if batch.versions.is_empty() {
            return Ok(());
        }
        if let Some(versions) = self.load_phase.defer(batch.versions) {
            self.apply_index(&versions);
        }
        Ok(())
    }

    /// Point the registry at the latest visible definition of `pattern`.
    ///
    /// A back-dated version does not replace a later one, and a pattern with
    /// only cancelled versions has no definition at all.
    fn refresh_pattern(&self, pattern: Handle) {
        let latest = self
            .latest_unlocked(pattern, &ReadHorizon::latest())
            .and_then(|v| v.as_pattern().map(|p| FieldDefinitions::from(p.fields.clone())));
        match latest {
            Some(fields) => self.schema.register_pattern(pattern, fields),
            None => self.schema.remove_pattern(pattern),
        }
    }

    /// Whether a pattern version committed under `stamp` would become the visible definition
    pub(crate) fn pattern_superseded_by(&self, pattern: Handle, stamp: &ResolvedStamp) -> bool {
        stamp.is_visible()
            && self
                .latest_unlocked(pattern, &ReadHorizon::latest())
                .map_or(true, |current| current.stamp.time <= stamp.time)
    }

    /// A description the owner's latest version carries with the same type, language and text
    pub(crate) fn carried_description(&self, owner: Handle, description: &DescriptionVersion) -> Option<Handle> {
        let horizon = ReadHorizon::latest();
        let latest = self.latest_unlocked(owner, &horizon)?;
        let carried = match &latest.data {
            VersionData::Concept(concept) => &concept.descriptions,
            VersionData::Pattern(pattern) => &pattern.descriptions,
            _ => return None,
        };
        carried.iter().copied().find(|handle| {
            self.latest_unlocked(*handle, &horizon).is_some_and(|v| {
                v.as_description().is_some_and(|d| {
                    d.description_type == description.description_type
                        && d.language == description.language
                        && d.text == description.text
                })
            })
        })
    }

    fn apply_index(&self, versions: &[Version]) {
        let mut index = self.index_mut();
        let touched = index.apply(versions);
        if self.config.verify_navigation_hints {
            for hint in index.unconfirmed_hints(&touched) {
                warn!(
                    parent = %hint.parent,
                    child = %hint.child,
                    "navigation hint not confirmed by the child's is-a axioms"
                );
            }
        }
    }

    /// Latest committed `is-a` parents of a concept
    pub(crate) fn committed_parents(&self, handle: Handle) -> Option<BTreeSet<Handle>> {
        let versions = self.chronicles.get(&handle)?;
        let chronicle = Chronicle::new(handle, versions.clone());
        chronicle
            .latest(&ReadHorizon::latest())
            .and_then(Version::as_concept)
            .map(|c| c.parents.clone())
    }

    // === Identity ===

    /// Resolve a reference outside any session, allocating a pending handle if needed.
    pub fn resolve(&self, reference: &PublicId) -> EngineResult<Handle> {
        let _commit = self.lock_commits();
        let mut scope = self.resolver.scope();
        let handle = scope.resolve(reference)?;
        self.persist_identities(scope.into_delta())?;
        Ok(handle)
    }

    /// Give an existing handle another UUID.
    pub fn attach_alias(&self, handle: Handle, uuid: Uuid) -> EngineResult<()> {
        let _commit = self.lock_commits();
        let mut scope = self.resolver.scope();
        scope.attach_alias(handle, uuid)?;
        self.persist_identities(scope.into_delta())
    }

    fn persist_identities(&self, identities: IdentityDelta) -> EngineResult<()> {
        if identities.is_empty() {
            return Ok(());
        }
        let batch = CommitBatch {
            sequence: 0,
            versions: Vec::new(),
            identities,
        };
        self.store.commit_batch(&batch)?;
        self.publish(batch)?;
        Ok(())
    }

    // === Load phase ===

    /// Open (or re-enter) a load phase. Index maintenance is deferred until
    /// the outermost phase ends.
    pub fn begin_load_phase(&self) -> EngineResult<()> {
        let _commit = self.lock_commits();
        if self.load_phase.begin() {
            if let Err(e) = self.store.begin_bulk_load() {
                self.load_phase.end();
                return Err(e.into());
            }
            info!("load phase started");
        } else {
            debug!(depth = self.load_phase.depth(), "load phase re-entered");
        }
        Ok(())
    }

    /// Close the innermost load phase; the outermost close catches the indexes up.
    pub fn end_load_phase(&self) -> EngineResult<()> {
        let _commit = self.lock_commits();
        match self.load_phase.end() {
            PhaseExit::Inactive => Err(EngineError::LoadPhaseNotActive),
            PhaseExit::Nested { depth } => {
                debug!(depth, "nested load phase closed");
                Ok(())
            }
            PhaseExit::Closed { queued, commits } => {
                {
                    let _gate = self.gate_mut();
                    self.apply_index(&queued);
                }
                self.store.end_bulk_load()?;
                info!(commits, versions = queued.len(), "load phase ended, indexes caught up");
                Ok(())
            }
        }
    }

    pub fn in_load_phase(&self) -> bool {
        self.load_phase.is_active()
    }

    // === Reads ===

    /// Handle a reference resolves to, without allocating
    pub fn lookup(&self, reference: &PublicId) -> EngineResult<Option<Handle>> {
        let _gate = self.gate();
        Ok(self.resolver.lookup(reference)?)
    }

    pub fn public_id(&self, handle: Handle) -> Option<PublicId> {
        let _gate = self.gate();
        self.resolver.public_id(handle)
    }

    pub fn handle_state(&self, handle: Handle) -> Option<HandleState> {
        let _gate = self.gate();
        self.resolver.state(handle)
    }

    /// Every committed version of an entity, in commit order
    pub fn chronicle(&self, handle: Handle) -> Chronicle {
        let _gate = self.gate();
        let versions = self
            .chronicles
            .get(&handle)
            .map(|v| v.clone())
            .unwrap_or_default();
        Chronicle::new(handle, versions)
    }

    /// The version of an entity visible at `horizon`
    pub fn latest(&self, handle: Handle, horizon: &ReadHorizon) -> Option<Version> {
        self.chronicle(handle).latest(horizon).cloned()
    }

    /// `is-a` parents of a concept's latest version
    pub fn parents(&self, handle: Handle) -> Vec<Handle> {
        self.latest(handle, &ReadHorizon::latest())
            .and_then(|v| v.as_concept().map(|c| c.parents.iter().copied().collect()))
            .unwrap_or_default()
    }

    /// Concepts whose latest version names `handle` as a parent
    pub fn children(&self, handle: Handle) -> Vec<Handle> {
        let _gate = self.gate();
        self.index().children(handle)
    }

    /// Latest versions of the descriptions owned by a concept or pattern
    pub fn descriptions(&self, owner: Handle) -> Vec<Version> {
        let handles = {
            let _gate = self.gate();
            self.index().descriptions(owner)
        };
        handles
            .into_iter()
            .filter_map(|h| self.latest(h, &ReadHorizon::latest()))
            .collect()
    }

    /// Semantics annotating `component`
    pub fn semantics_for(&self, component: Handle) -> Vec<Handle> {
        let _gate = self.gate();
        self.index().semantics_for(component)
    }

    /// Semantics instantiating `pattern`
    pub fn semantics_of(&self, pattern: Handle) -> Vec<Handle> {
        let _gate = self.gate();
        self.index().semantics_of(pattern)
    }

    /// Owners of descriptions containing every word of `query`
    pub fn search(&self, query: &str) -> Vec<Handle> {
        let _gate = self.gate();
        self.index().search(query)
    }

    /// Child hints not confirmed by the child's latest `is-a` axioms
    pub fn navigation_report(&self) -> Vec<UnconfirmedHint> {
        let _gate = self.gate();
        self.index().navigation_report()
    }

    /// Read a semantic and validate it against the pattern visible at the same horizon.
    pub fn read_semantic(&self, handle: Handle, horizon: &ReadHorizon) -> EngineResult<Option<SemanticRead>> {
        let _gate = self.gate();
        let Some(semantic) = self.latest_unlocked(handle, horizon) else {
            return Ok(None);
        };
        let Some(data) = semantic.as_semantic() else {
            return Err(EngineError::WrongKind {
                handle,
                expected: EntityKind::Semantic,
                found: semantic.kind(),
            });
        };
        let pattern = self
            .latest_unlocked(data.pattern, horizon)
            .filter(|p| p.kind() == EntityKind::Pattern)
            .ok_or(SchemaError::UnknownPattern(data.pattern))?;
        if let VersionData::Pattern(definition) = &pattern.data {
            let found: Vec<_> = data.fields.iter().map(FieldData::field_type).collect();
            check_fields(data.pattern, &definition.fields, &found)?;
        }
        Ok(Some(SemanticRead { semantic, pattern }))
    }

    fn latest_unlocked(&self, handle: Handle, horizon: &ReadHorizon) -> Option<Version> {
        let versions = self.chronicles.get(&handle)?.clone();
        Chronicle::new(handle, versions).latest(horizon).cloned()
    }

    pub fn stats(&self) -> EngineStats {
        let _gate = self.gate();
        let defined: BTreeMap<EntityKind, usize> = self.resolver.defined_counts().into_iter().collect();
        EngineStats {
            handles: self.resolver.len(),
            pending: self.resolver.pending().len(),
            defined,
            versions: self.chronicles.iter().map(|c| c.len()).sum(),
            patterns: self.schema.len(),
            last_commit: self.sequence.load(Ordering::SeqCst),
            load_phase_depth: self.load_phase.depth(),
        }
    }

    // === Export ===

    /// Drive `exporter` over the committed graph. Refused while a load phase is open.
    pub fn export(&self, exporter: &mut dyn GraphExporter) -> EngineResult<ExportSummary> {
        let _commit = self.lock_commits();
        if self.load_phase.is_active() {
            return Err(EngineError::LoadPhaseActive);
        }
        let _gate = self.gate();

        let identities = self.resolver.records();
        let mut versions: Vec<Version> = self
            .chronicles
            .iter()
            .flat_map(|c| c.value().clone())
            .collect();
        versions.sort_by_key(|v| (v.commit, v.handle));

        let summary = ExportSummary {
            identities: identities.len(),
            versions: versions.len(),
            last_commit: self.sequence.load(Ordering::SeqCst),
        };
        exporter.begin(&summary)?;
        for record in &identities {
            exporter.identity(record)?;
        }
        for version in &versions {
            exporter.version(version)?;
        }
        exporter.finish()?;
        info!(identities = summary.identities, versions = summary.versions, "export finished");
        Ok(summary)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("handles", &self.resolver.len())
            .field("last_commit", &self.sequence.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Status;
    use chrono::Utc;

    fn stamp() -> Stamp {
        Stamp::new(
            Status::Active,
            Utc::now(),
            PublicId::from_name("author"),
            PublicId::from_name("module"),
            PublicId::from_name("path"),
        )
    }

    #[test]
    fn test_create_engine() {
        let engine = Engine::new();
        let stats = engine.stats();
        assert_eq!(stats.handles, 0);
        assert_eq!(stats.last_commit, 0);
    }

    #[test]
    fn test_config_builders() {
        let config = EngineConfig::default()
            .with_cycle_policy(CyclePolicy::Reject)
            .with_pattern_policy(PatternPolicy::Deferred)
            .with_navigation_checks(false);
        assert_eq!(config.cycle_policy, CyclePolicy::Reject);
        assert_eq!(config.pattern_policy, PatternPolicy::Deferred);
        assert!(!config.verify_navigation_hints);
    }

    #[test]
    fn test_resolve_outside_session_is_pending_and_idempotent() {
        let engine = Engine::new();
        let reference = PublicId::from_name("later");
        let handle = engine.resolve(&reference).unwrap();
        assert_eq!(engine.resolve(&reference).unwrap(), handle);
        assert_eq!(engine.handle_state(handle), Some(HandleState::Pending));
        assert_eq!(engine.store().load_identities().unwrap().len(), 1);
    }

    #[test]
    fn test_attach_alias_extends_public_id() {
        let engine = Engine::new();
        let handle = engine.resolve(&PublicId::from_name("x")).unwrap();
        let alias = Uuid::new_v4();
        engine.attach_alias(handle, alias).unwrap();
        assert_eq!(engine.lookup(&PublicId::new(alias)).unwrap(), Some(handle));
        assert!(engine.public_id(handle).unwrap().uuids().contains(&alias));
    }

    #[test]
    fn test_end_without_begin_fails() {
        let engine = Engine::new();
        assert!(matches!(engine.end_load_phase(), Err(EngineError::LoadPhaseNotActive)));
    }

    #[test]
    fn test_sessions_get_distinct_ids() {
        let engine = Engine::new();
        let a = engine.open_session(stamp());
        let b = engine.open_session(stamp());
        assert_ne!(a.id(), b.id());
    }
}
