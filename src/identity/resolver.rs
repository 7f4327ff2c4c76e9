//! IdentityResolver: maps references to dense handles
//!
//! Reads (`lookup`, `state`, `public_id`) are lock-free on the UUID map and
//! take a shared lock on the handle table. Mutation happens only through a
//! [`ResolutionScope`], which stages every allocation, alias and definition
//! privately and is published with [`IdentityResolver::apply`]. A scope that
//! is dropped without being applied leaves the resolver untouched, so an
//! aborted commit consumes no handles.

use super::handle::{Handle, HandleState, IdentityDelta, IdentityRecord};
use super::public_id::PublicId;
use crate::graph::EntityKind;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while resolving references
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdentityError {
    /// A UUID is claimed by two previously distinct handles. Merging is not supported.
    #[error("identity conflict: {uuid} resolves to {existing} but the reference also resolves to {other}")]
    IdentityConflict {
        uuid: Uuid,
        existing: Handle,
        other: Handle,
    },

    #[error("{handle} is already defined as a {existing}, cannot define it as a {requested}")]
    KindConflict {
        handle: Handle,
        existing: EntityKind,
        requested: EntityKind,
    },

    #[error("unknown handle: {0}")]
    UnknownHandle(Handle),

    #[error("handle table out of sequence: expected {expected}, got {actual}")]
    OutOfSequence { expected: Handle, actual: Handle },
}

#[derive(Debug, Clone)]
struct HandleEntry {
    public_id: PublicId,
    state: HandleState,
}

/// The shared handle table
#[derive(Debug, Default)]
pub struct IdentityResolver {
    by_uuid: DashMap<Uuid, Handle>,
    entries: RwLock<Vec<HandleEntry>>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> RwLockReadGuard<'_, Vec<HandleEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries_mut(&self) -> RwLockWriteGuard<'_, Vec<HandleEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Find the handle a reference resolves to without allocating.
    pub fn lookup(&self, reference: &PublicId) -> Result<Option<Handle>, IdentityError> {
        let mut found: Option<Handle> = None;
        for uuid in reference.uuids() {
            if let Some(handle) = self.by_uuid.get(uuid).map(|h| *h) {
                match found {
                    Some(existing) if existing != handle => {
                        return Err(IdentityError::IdentityConflict {
                            uuid: *uuid,
                            existing,
                            other: handle,
                        });
                    }
                    _ => found = Some(handle),
                }
            }
        }
        Ok(found)
    }

    /// Handle for a single UUID
    pub fn lookup_uuid(&self, uuid: &Uuid) -> Option<Handle> {
        self.by_uuid.get(uuid).map(|h| *h)
    }

    /// Every UUID known for a handle
    pub fn public_id(&self, handle: Handle) -> Option<PublicId> {
        self.entries().get(handle.slot()).map(|e| e.public_id.clone())
    }

    pub fn state(&self, handle: Handle) -> Option<HandleState> {
        self.entries().get(handle.slot()).map(|e| e.state)
    }

    /// Number of handles allocated so far
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles that have been mentioned but never declared
    pub fn pending(&self) -> Vec<Handle> {
        self.entries()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.state == HandleState::Pending)
            .map(|(slot, _)| Handle::from_slot(slot))
            .collect()
    }

    /// Count defined handles per entity kind
    pub fn defined_counts(&self) -> HashMap<EntityKind, usize> {
        let mut counts = HashMap::new();
        for entry in self.entries().iter() {
            if let HandleState::Defined(kind) = entry.state {
                *counts.entry(kind).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Snapshot of the table in persisted form
    pub fn records(&self) -> Vec<IdentityRecord> {
        self.entries()
            .iter()
            .enumerate()
            .map(|(slot, e)| IdentityRecord {
                handle: Handle::from_slot(slot),
                uuids: e.public_id.uuids().to_vec(),
                state: e.state,
            })
            .collect()
    }

    /// Open a staging scope. Callers must serialize scopes (the commit lock does).
    pub fn scope(&self) -> ResolutionScope<'_> {
        ResolutionScope {
            resolver: self,
            next: self.len() as u32 + 1,
            staged_uuids: HashMap::new(),
            staged_states: HashMap::new(),
            delta: IdentityDelta::default(),
        }
    }

    /// Publish a staged delta.
    pub fn apply(&self, delta: &IdentityDelta) -> Result<(), IdentityError> {
        let mut entries = self.entries_mut();

        // Validate everything before touching the table
        let mut fresh = Vec::with_capacity(delta.allocated.len());
        for (offset, record) in delta.allocated.iter().enumerate() {
            let expected = Handle::from_slot(entries.len() + offset);
            if record.handle != expected {
                return Err(IdentityError::OutOfSequence {
                    expected,
                    actual: record.handle,
                });
            }
            let public_id = PublicId::from_uuids(record.uuids.iter().copied())
                .ok_or(IdentityError::UnknownHandle(record.handle))?;
            fresh.push(HandleEntry {
                public_id,
                state: record.state,
            });
        }
        let known = entries.len() + fresh.len();
        let touched = delta
            .aliases
            .iter()
            .map(|(h, _)| *h)
            .chain(delta.defined.iter().map(|(h, _)| *h));
        for handle in touched {
            if handle.slot() >= known || handle.value() == 0 {
                return Err(IdentityError::UnknownHandle(handle));
            }
        }

        entries.extend(fresh);
        for (handle, uuid) in &delta.aliases {
            let entry = &mut entries[handle.slot()];
            entry.public_id = entry.public_id.clone().with_uuid(*uuid);
        }
        for (handle, kind) in &delta.defined {
            entries[handle.slot()].state = HandleState::Defined(*kind);
        }

        for record in &delta.allocated {
            for uuid in &record.uuids {
                self.by_uuid.insert(*uuid, record.handle);
            }
        }
        for (handle, uuid) in &delta.aliases {
            self.by_uuid.insert(*uuid, *handle);
        }
        Ok(())
    }

    /// Rebuild the table from persisted records (sorted by handle).
    pub fn restore(&self, mut records: Vec<IdentityRecord>) -> Result<(), IdentityError> {
        records.sort_by_key(|r| r.handle);
        let delta = IdentityDelta {
            allocated: records,
            ..Default::default()
        };
        self.apply(&delta)
    }
}

/// Staged resolution state for one commit
pub struct ResolutionScope<'a> {
    resolver: &'a IdentityResolver,
    next: u32,
    staged_uuids: HashMap<Uuid, Handle>,
    staged_states: HashMap<Handle, HandleState>,
    delta: IdentityDelta,
}

impl<'a> ResolutionScope<'a> {
    fn mapped(&self, uuid: &Uuid) -> Option<Handle> {
        self.staged_uuids
            .get(uuid)
            .copied()
            .or_else(|| self.resolver.lookup_uuid(uuid))
    }

    /// Resolve a reference, allocating a pending handle if it was never seen.
    ///
    /// UUIDs of the reference that are not yet mapped become aliases of the
    /// handle the other UUIDs resolve to.
    pub fn resolve(&mut self, reference: &PublicId) -> Result<Handle, IdentityError> {
        let mut found: Option<Handle> = None;
        let mut unmapped = Vec::new();
        for uuid in reference.uuids() {
            match self.mapped(uuid) {
                Some(handle) => match found {
                    Some(existing) if existing != handle => {
                        return Err(IdentityError::IdentityConflict {
                            uuid: *uuid,
                            existing,
                            other: handle,
                        });
                    }
                    _ => found = Some(handle),
                },
                None => unmapped.push(*uuid),
            }
        }

        match found {
            Some(handle) => {
                for uuid in unmapped {
                    self.stage_alias(handle, uuid);
                }
                Ok(handle)
            }
            None => {
                let handle = Handle::new(self.next);
                self.next += 1;
                for uuid in reference.uuids() {
                    self.staged_uuids.insert(*uuid, handle);
                }
                self.staged_states.insert(handle, HandleState::Pending);
                self.delta.allocated.push(IdentityRecord {
                    handle,
                    uuids: reference.uuids().to_vec(),
                    state: HandleState::Pending,
                });
                Ok(handle)
            }
        }
    }

    /// Give an existing handle another UUID.
    pub fn attach_alias(&mut self, handle: Handle, uuid: Uuid) -> Result<(), IdentityError> {
        if self.state(handle).is_none() {
            return Err(IdentityError::UnknownHandle(handle));
        }
        match self.mapped(&uuid) {
            Some(existing) if existing == handle => Ok(()),
            Some(existing) => Err(IdentityError::IdentityConflict {
                uuid,
                existing,
                other: handle,
            }),
            None => {
                self.stage_alias(handle, uuid);
                Ok(())
            }
        }
    }

    fn stage_alias(&mut self, handle: Handle, uuid: Uuid) {
        self.staged_uuids.insert(uuid, handle);
        if let Some(record) = self.delta.allocated.iter_mut().find(|r| r.handle == handle) {
            record.uuids.push(uuid);
        } else {
            self.delta.aliases.push((handle, uuid));
        }
    }

    /// State as seen from inside this scope
    pub fn state(&self, handle: Handle) -> Option<HandleState> {
        self.staged_states
            .get(&handle)
            .copied()
            .or_else(|| self.resolver.state(handle))
    }

    /// Mark a handle as carrying a version of `kind`.
    ///
    /// Returns true if the handle transitioned from pending in this call.
    pub fn define(&mut self, handle: Handle, kind: EntityKind) -> Result<bool, IdentityError> {
        match self.state(handle) {
            None => Err(IdentityError::UnknownHandle(handle)),
            Some(HandleState::Defined(existing)) if existing != kind => {
                Err(IdentityError::KindConflict {
                    handle,
                    existing,
                    requested: kind,
                })
            }
            Some(HandleState::Defined(_)) => Ok(false),
            Some(HandleState::Pending) => {
                let state = HandleState::Defined(kind);
                self.staged_states.insert(handle, state);
                if let Some(record) = self.delta.allocated.iter_mut().find(|r| r.handle == handle) {
                    record.state = state;
                } else {
                    self.delta.defined.push((handle, kind));
                }
                Ok(true)
            }
        }
    }

    /// Number of handles allocated inside this scope
    pub fn allocated_count(&self) -> usize {
        self.delta.allocated.len()
    }

    /// Finish staging and hand back the delta to publish.
    pub fn into_delta(self) -> IdentityDelta {
        let mut delta = self.delta;
        for record in &mut delta.allocated {
            record.uuids.sort_unstable();
            record.uuids.dedup();
        }
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(resolver: &IdentityResolver, references: &[PublicId]) -> Vec<Handle> {
        let mut scope = resolver.scope();
        let handles = references
            .iter()
            .map(|r| scope.resolve(r).unwrap())
            .collect();
        let delta = scope.into_delta();
        resolver.apply(&delta).unwrap();
        handles
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let resolver = IdentityResolver::new();
        let a = PublicId::random();
        let first = commit(&resolver, &[a.clone(), a.clone()]);
        assert_eq!(first[0], first[1]);
        let second = commit(&resolver, &[a.clone()]);
        assert_eq!(first[0], second[0]);
        assert_eq!(resolver.lookup(&a).unwrap(), Some(first[0]));
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn test_handles_are_dense() {
        let resolver = IdentityResolver::new();
        let handles = commit(&resolver, &[PublicId::random(), PublicId::random()]);
        assert_eq!(handles, vec![Handle::new(1), Handle::new(2)]);
        let more = commit(&resolver, &[PublicId::random()]);
        assert_eq!(more, vec![Handle::new(3)]);
    }

    #[test]
    fn test_new_handles_start_pending() {
        let resolver = IdentityResolver::new();
        let handles = commit(&resolver, &[PublicId::random()]);
        assert_eq!(resolver.state(handles[0]), Some(HandleState::Pending));
        assert_eq!(resolver.pending(), handles);
    }

    #[test]
    fn test_alias_resolves_to_same_handle() {
        let resolver = IdentityResolver::new();
        let primary = Uuid::new_v4();
        let legacy = Uuid::new_v4();
        let handle = commit(&resolver, &[PublicId::new(primary)])[0];

        let both = PublicId::new(primary).with_uuid(legacy);
        assert_eq!(commit(&resolver, &[both])[0], handle);
        assert_eq!(resolver.lookup(&PublicId::new(legacy)).unwrap(), Some(handle));
        assert_eq!(resolver.public_id(handle).unwrap().uuids().len(), 2);
    }

    #[test]
    fn test_attach_alias() {
        let resolver = IdentityResolver::new();
        let handle = commit(&resolver, &[PublicId::random()])[0];
        let extra = Uuid::new_v4();

        let mut scope = resolver.scope();
        scope.attach_alias(handle, extra).unwrap();
        resolver.apply(&scope.into_delta()).unwrap();

        assert_eq!(resolver.lookup_uuid(&extra), Some(handle));
    }

    #[test]
    fn test_conflicting_aliases_fail() {
        let resolver = IdentityResolver::new();
        let a = PublicId::random();
        let b = PublicId::random();
        commit(&resolver, &[a.clone(), b.clone()]);

        let mut scope = resolver.scope();
        let merged = PublicId::from_uuids([a.primary(), b.primary()]).unwrap();
        let err = scope.resolve(&merged).unwrap_err();
        assert!(matches!(err, IdentityError::IdentityConflict { .. }));
    }

    #[test]
    fn test_attach_alias_owned_by_other_handle_fails() {
        let resolver = IdentityResolver::new();
        let a = PublicId::random();
        let b = PublicId::random();
        let handles = commit(&resolver, &[a, b.clone()]);

        let mut scope = resolver.scope();
        let err = scope.attach_alias(handles[0], b.primary()).unwrap_err();
        assert_eq!(
            err,
            IdentityError::IdentityConflict {
                uuid: b.primary(),
                existing: handles[1],
                other: handles[0],
            }
        );
    }

    #[test]
    fn test_dropped_scope_consumes_nothing() {
        let resolver = IdentityResolver::new();
        let a = PublicId::random();
        {
            let mut scope = resolver.scope();
            scope.resolve(&a).unwrap();
            scope.resolve(&PublicId::random()).unwrap();
        }
        assert!(resolver.is_empty());
        assert_eq!(resolver.lookup(&a).unwrap(), None);
        assert_eq!(commit(&resolver, &[a])[0], Handle::FIRST);
    }

    #[test]
    fn test_define_transitions_pending() {
        let resolver = IdentityResolver::new();
        let a = PublicId::random();
        let handle = commit(&resolver, &[a])[0];

        let mut scope = resolver.scope();
        assert!(scope.define(handle, EntityKind::Concept).unwrap());
        assert!(!scope.define(handle, EntityKind::Concept).unwrap());
        resolver.apply(&scope.into_delta()).unwrap();
        assert_eq!(
            resolver.state(handle),
            Some(HandleState::Defined(EntityKind::Concept))
        );
        assert!(resolver.pending().is_empty());
    }

    #[test]
    fn test_define_with_other_kind_conflicts() {
        let resolver = IdentityResolver::new();
        let mut scope = resolver.scope();
        let handle = scope.resolve(&PublicId::random()).unwrap();
        scope.define(handle, EntityKind::Pattern).unwrap();
        let err = scope.define(handle, EntityKind::Concept).unwrap_err();
        assert!(matches!(err, IdentityError::KindConflict { .. }));
    }

    #[test]
    fn test_restore_from_records() {
        let resolver = IdentityResolver::new();
        let a = PublicId::random();
        let b = PublicId::random();
        let handles = commit(&resolver, &[a.clone(), b.clone()]);

        let restored = IdentityResolver::new();
        let mut records = resolver.records();
        records.reverse();
        restored.restore(records).unwrap();
        assert_eq!(restored.lookup(&a).unwrap(), Some(handles[0]));
        assert_eq!(restored.lookup(&b).unwrap(), Some(handles[1]));
    }

    #[test]
    fn test_stale_delta_is_rejected() {
        let resolver = IdentityResolver::new();
        let stale = {
            let mut scope = resolver.scope();
            scope.resolve(&PublicId::random()).unwrap();
            scope.into_delta()
        };
        commit(&resolver, &[PublicId::random()]);
        assert!(matches!(
            resolver.apply(&stale),
            Err(IdentityError::OutOfSequence { .. })
        ));
    }
}
