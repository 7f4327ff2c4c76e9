//! Commit pipeline: resolve, validate, write, publish
//!
//! Everything up to the storage write is staged privately: new handles live
//! in a resolution scope, new patterns in a schema overlay and new versions
//! in a draft list. Any failure simply drops the staging, so the resolver,
//! the registry, the store and the indexes are exactly as they were.

use super::error::{BuilderRef, CommitError, Offender};
use crate::builder::{Builder, ConceptBuilder, DescriptionFacet, PatternBuilder, SemanticBuilder};
use crate::graph::{
    ConceptVersion, CyclePolicy, DescriptionVersion, DialectAcceptability, Engine, EntityKind,
    Identifier, PatternPolicy, PatternVersion, ResolvedStamp, SemanticVersion, Stamp, Version,
    VersionData,
};
use crate::identity::{Handle, PublicId, ResolutionScope};
use crate::schema::{
    FieldData, FieldType, FieldValue, ResolvedFieldDefinition, SchemaError, SchemaOverlay,
};
use crate::storage::CommitBatch;
use serde::Serialize;
use std::collections::{hash_map::Entry, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of a successful commit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitReceipt {
    /// Global commit sequence number
    pub sequence: u64,
    /// The stamp every version of this commit carries
    pub stamp: ResolvedStamp,
    /// Handle of each builder, in composition order
    pub handles: Vec<Handle>,
    /// Description entities committed alongside their owners
    pub descriptions: Vec<Handle>,
    /// Handles first allocated by this commit, pending ones included
    pub allocated: usize,
    pub versions: usize,
}

struct StagedSemantic {
    at: BuilderRef,
    pattern: Handle,
    found: Vec<FieldType>,
}

struct Staging<'e> {
    engine: &'e Engine,
    scope: ResolutionScope<'e>,
    overlay: SchemaOverlay<'e>,
    /// Handle -> index of the builder that composed it
    composed: HashMap<Handle, usize>,
    drafts: Vec<(Handle, VersionData)>,
    descriptions: Vec<Handle>,
    concepts: Vec<(BuilderRef, Handle, BTreeSet<Handle>)>,
    semantics: Vec<StagedSemantic>,
}

impl<'e> Staging<'e> {
    fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            scope: engine.resolver.scope(),
            overlay: engine.schema.overlay(),
            composed: HashMap::new(),
            drafts: Vec::new(),
            descriptions: Vec::new(),
            concepts: Vec::new(),
            semantics: Vec::new(),
        }
    }

    fn resolve(&mut self, reference: &PublicId, offender: &Offender) -> Result<Handle, CommitError> {
        self.scope
            .resolve(reference)
            .map_err(|e| CommitError::identity(offender.clone(), e))
    }

    fn resolve_all<'r>(
        &mut self,
        references: impl IntoIterator<Item = &'r PublicId>,
        offender: &Offender,
    ) -> Result<Vec<Handle>, CommitError> {
        references
            .into_iter()
            .map(|r| self.resolve(r, offender))
            .collect()
    }

    /// Resolve a composed entity's own reference and mark it as defined.
    fn claim(
        &mut self,
        reference: &PublicId,
        kind: EntityKind,
        at: &BuilderRef,
    ) -> Result<Handle, CommitError> {
        let handle = self.resolve(reference, &Offender::Builder(at.clone()))?;
        self.claim_handle(handle, kind, at)
    }

    fn claim_handle(&mut self, handle: Handle, kind: EntityKind, at: &BuilderRef) -> Result<Handle, CommitError> {
        let offender = Offender::Builder(at.clone());
        match self.composed.entry(handle) {
            Entry::Occupied(first) => {
                return Err(CommitError::DuplicateComposition {
                    offender,
                    handle,
                    first: *first.get(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(at.index);
            }
        }
        self.scope
            .define(handle, kind)
            .map_err(|e| CommitError::identity(offender, e))?;
        Ok(handle)
    }

    fn stage_description(
        &mut self,
        at: &BuilderRef,
        owner: Handle,
        owner_reference: &PublicId,
        facet: &DescriptionFacet,
    ) -> Result<Handle, CommitError> {
        let offender = Offender::Builder(at.clone());
        let language = self.resolve(&facet.language, &offender)?;
        let case_significance = self.resolve(&facet.case_significance, &offender)?;
        let mut dialects = Vec::with_capacity(facet.dialects.len());
        for (dialect, acceptability) in &facet.dialects {
            dialects.push(DialectAcceptability {
                dialect: self.resolve(dialect, &offender)?,
                acceptability: *acceptability,
            });
        }
        let description = DescriptionVersion {
            concept: owner,
            description_type: facet.description_type,
            text: facet.text.clone(),
            language,
            case_significance,
            dialects,
        };

        // An unreferenced description the owner already carries keeps its entity
        let carried = match facet.reference {
            Some(_) => None,
            None => self.engine.carried_description(owner, &description),
        };
        let handle = match carried {
            Some(handle) => handle,
            None => self.resolve(&facet.reference_for(owner_reference), &offender)?,
        };
        let data = VersionData::Description(description);
        if self.composed.contains_key(&handle) {
            // The same description declared twice is one description
            let same = self.drafts.iter().any(|(h, d)| *h == handle && *d == data);
            if same {
                return Ok(handle);
            }
        }
        let handle = self.claim_handle(handle, EntityKind::Description, at)?;
        self.drafts.push((handle, data));
        self.descriptions.push(handle);
        Ok(handle)
    }

    fn stage_descriptions(
        &mut self,
        at: &BuilderRef,
        owner: Handle,
        owner_reference: &PublicId,
        facets: &[DescriptionFacet],
    ) -> Result<Vec<Handle>, CommitError> {
        let mut handles = Vec::with_capacity(facets.len());
        for facet in facets {
            let handle = self.stage_description(at, owner, owner_reference, facet)?;
            if !handles.contains(&handle) {
                handles.push(handle);
            }
        }
        Ok(handles)
    }

    fn stage_concept(
        &mut self,
        at: &BuilderRef,
        handle: Handle,
        builder: &ConceptBuilder,
    ) -> Result<(), CommitError> {
        let offender = Offender::Builder(at.clone());
        for uuid in &builder.aliases {
            self.scope
                .attach_alias(handle, *uuid)
                .map_err(|e| CommitError::identity(offender.clone(), e))?;
        }
        let parents: BTreeSet<Handle> = self.resolve_all(&builder.parents, &offender)?.into_iter().collect();
        let child_hints: BTreeSet<Handle> =
            self.resolve_all(&builder.child_hints, &offender)?.into_iter().collect();
        let mut identifiers = Vec::with_capacity(builder.identifiers.len());
        for (source, value) in &builder.identifiers {
            identifiers.push(Identifier {
                source: self.resolve(source, &offender)?,
                value: value.clone(),
            });
        }
        let descriptions = self.stage_descriptions(at, handle, builder.reference(), &builder.descriptions)?;

        self.concepts.push((at.clone(), handle, parents.clone()));
        self.drafts.push((
            handle,
            VersionData::Concept(ConceptVersion {
                descriptions,
                parents,
                child_hints,
                identifiers,
            }),
        ));
        Ok(())
    }

    fn stage_pattern(
        &mut self,
        at: &BuilderRef,
        handle: Handle,
        builder: &PatternBuilder,
        stamp: &ResolvedStamp,
    ) -> Result<(), CommitError> {
        let offender = Offender::Builder(at.clone());
        let meaning = builder.meaning.as_ref().ok_or_else(|| CommitError::IncompleteBuilder {
            offender: offender.clone(),
            missing: "meaning",
        })?;
        let purpose = builder.purpose.as_ref().ok_or_else(|| CommitError::IncompleteBuilder {
            offender: offender.clone(),
            missing: "purpose",
        })?;
        let meaning = self.resolve(meaning, &offender)?;
        let purpose = self.resolve(purpose, &offender)?;

        let mut fields = Vec::with_capacity(builder.fields.len());
        for field in &builder.fields {
            let type_concept = match &field.type_concept {
                Some(concept) => Some(self.resolve(concept, &offender)?),
                None => None,
            };
            fields.push(ResolvedFieldDefinition {
                name: field.name.clone(),
                meaning: self.resolve(&field.meaning, &offender)?,
                purpose: self.resolve(&field.purpose, &offender)?,
                field_type: field.field_type,
                type_concept,
            });
        }
        let descriptions = self.stage_descriptions(at, handle, builder.reference(), &builder.descriptions)?;

        // Semantics of this commit validate against the definition readers will see next
        if self.engine.pattern_superseded_by(handle, stamp) {
            self.overlay.register_pattern(handle, Arc::from(fields.clone()));
        }
        self.drafts.push((
            handle,
            VersionData::Pattern(PatternVersion {
                meaning,
                purpose,
                fields,
                descriptions,
            }),
        ));
        Ok(())
    }

    fn stage_semantic(
        &mut self,
        at: &BuilderRef,
        handle: Handle,
        builder: &SemanticBuilder,
    ) -> Result<(), CommitError> {
        let offender = Offender::Builder(at.clone());
        let pattern = builder.pattern.as_ref().ok_or_else(|| CommitError::IncompleteBuilder {
            offender: offender.clone(),
            missing: "pattern",
        })?;
        let component = builder
            .referenced_component
            .as_ref()
            .ok_or_else(|| CommitError::IncompleteBuilder {
                offender: offender.clone(),
                missing: "referenced component",
            })?;
        let pattern = self.resolve(pattern, &offender)?;
        let referenced_component = self.resolve(component, &offender)?;

        let mut fields = Vec::with_capacity(builder.fields.len());
        for (slot, value) in builder.fields.iter().enumerate() {
            fields.push(self.resolve_value(value, slot, &offender)?);
        }

        self.semantics.push(StagedSemantic {
            at: at.clone(),
            pattern,
            found: fields.iter().map(FieldData::field_type).collect(),
        });
        self.drafts.push((
            handle,
            VersionData::Semantic(SemanticVersion {
                pattern,
                referenced_component,
                fields,
            }),
        ));
        Ok(())
    }

    fn resolve_value(
        &mut self,
        value: &FieldValue,
        slot: usize,
        offender: &Offender,
    ) -> Result<FieldData, CommitError> {
        Ok(match value {
            FieldValue::String(s) => FieldData::String(s.clone()),
            FieldValue::Integer(v) => FieldData::Integer(*v),
            // JSON has no NaN or infinity; such a row could never be read back
            FieldValue::Float(v) if !v.is_finite() => {
                return Err(CommitError::InvalidFieldValue {
                    offender: offender.clone(),
                    slot,
                    reason: "float is not finite",
                })
            }
            FieldValue::Float(v) => FieldData::Float(*v),
            FieldValue::Boolean(v) => FieldData::Boolean(*v),
            FieldValue::Instant(t) => FieldData::Instant(*t),
            FieldValue::Component(r) => FieldData::Component(self.resolve(r, offender)?),
            FieldValue::ComponentList(rs) => FieldData::ComponentList(self.resolve_all(rs, offender)?),
            FieldValue::ComponentSet(rs) => {
                let mut handles = self.resolve_all(rs, offender)?;
                handles.sort_unstable();
                handles.dedup();
                FieldData::ComponentSet(handles)
            }
        })
    }

    /// Check every staged semantic against the pattern visible to this commit.
    fn validate_semantics(&self, policy: PatternPolicy) -> Result<(), CommitError> {
        for semantic in &self.semantics {
            match self.overlay.validate(semantic.pattern, &semantic.found) {
                Ok(()) => {}
                Err(SchemaError::UnknownPattern(pattern)) if policy == PatternPolicy::Deferred => {
                    debug!(builder = %semantic.at, %pattern, "pattern not yet defined, validation deferred to read");
                }
                Err(e) => return Err(CommitError::schema(Offender::Builder(semantic.at.clone()), e)),
            }
        }
        Ok(())
    }

    /// Reject staged `is-a` edges that close a cycle with the committed hierarchy.
    fn check_cycles(&self, engine: &Engine) -> Result<(), CommitError> {
        let staged: HashMap<Handle, &BTreeSet<Handle>> =
            self.concepts.iter().map(|(_, h, parents)| (*h, parents)).collect();
        let parents_of = |handle: Handle| -> Vec<Handle> {
            match staged.get(&handle) {
                Some(parents) => parents.iter().copied().collect(),
                None => engine
                    .committed_parents(handle)
                    .map(|p| p.into_iter().collect())
                    .unwrap_or_default(),
            }
        };

        for (at, start, _) in &self.concepts {
            if let Some(path) = cycle_through(*start, &parents_of) {
                let chain: Vec<String> = path.iter().map(Handle::to_string).collect();
                return Err(CommitError::CommitConflict {
                    offender: Offender::Builder(at.clone()),
                    reason: format!("is-a cycle {}", chain.join(" -> ")),
                });
            }
        }
        Ok(())
    }
}

/// Depth-first search up the `is-a` edges for a path leading back to `start`.
fn cycle_through(start: Handle, parents_of: &impl Fn(Handle) -> Vec<Handle>) -> Option<Vec<Handle>> {
    let mut visited = HashSet::new();
    let mut path = vec![start];
    let mut frames = vec![parents_of(start)];
    while let Some(frame) = frames.last_mut() {
        match frame.pop() {
            Some(next) if next == start => {
                path.push(start);
                return Some(path);
            }
            Some(next) => {
                if visited.insert(next) {
                    path.push(next);
                    frames.push(parents_of(next));
                }
            }
            None => {
                frames.pop();
                path.pop();
            }
        }
    }
    None
}

/// Run one session's commit against the engine.
///
/// Holds the engine's commit lock for the whole pipeline, so commits are
/// totally ordered and no two scopes ever stage against the same resolver
/// state.
pub(crate) fn commit(
    engine: &Engine,
    stamp: &Stamp,
    builders: &[Builder],
) -> Result<CommitReceipt, CommitError> {
    let started = Instant::now();
    let _commit = engine.lock_commits();
    let mut staging = Staging::new(engine);

    let stamp = ResolvedStamp {
        status: stamp.status,
        time: stamp.time,
        author: staging.resolve(&stamp.author, &Offender::Stamp)?,
        module: staging.resolve(&stamp.module, &Offender::Stamp)?,
        path: staging.resolve(&stamp.path, &Offender::Stamp)?,
    };

    let mut handles = Vec::with_capacity(builders.len());
    for (index, builder) in builders.iter().enumerate() {
        let at = BuilderRef::of(index, builder);
        let handle = staging.claim(builder.reference(), builder.kind(), &at)?;
        match builder {
            Builder::Concept(b) => staging.stage_concept(&at, handle, b)?,
            Builder::Pattern(b) => staging.stage_pattern(&at, handle, b, &stamp)?,
            Builder::Semantic(b) => staging.stage_semantic(&at, handle, b)?,
        }
        debug!(builder = %at, %handle, "builder resolved");
        handles.push(handle);
    }

    staging.validate_semantics(engine.config().pattern_policy)?;
    if engine.config().cycle_policy == CyclePolicy::Reject {
        staging.check_cycles(engine)?;
    }

    let Staging {
        scope,
        drafts,
        descriptions,
        ..
    } = staging;
    let sequence = engine.next_sequence();
    let identities = scope.into_delta();
    let allocated = identities.allocated.len();
    let versions: Vec<Version> = drafts
        .into_iter()
        .map(|(handle, data)| Version {
            handle,
            commit: sequence,
            stamp,
            data,
        })
        .collect();
    let receipt = CommitReceipt {
        sequence,
        stamp,
        handles,
        descriptions,
        allocated,
        versions: versions.len(),
    };

    let batch = CommitBatch {
        sequence,
        versions,
        identities,
    };
    engine
        .store()
        .commit_batch(&batch)
        .map_err(CommitError::StorageFailure)?;
    engine
        .publish(batch)
        .map_err(|e| CommitError::identity(Offender::Session, e))?;

    info!(
        sequence,
        status = %stamp.status,
        versions = receipt.versions,
        allocated,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "session committed"
    );
    Ok(receipt)
}
