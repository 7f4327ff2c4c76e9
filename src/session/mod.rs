//! Authoring sessions: the unit of atomicity
//!
//! A session is opened against one stamp, accumulates builders and commits
//! them together. Either every version of the session becomes visible or
//! none does.

mod commit;
mod error;
mod state;

pub use commit::CommitReceipt;
pub use error::{BuilderRef, CommitError, Offender};
pub use state::SessionState;

use crate::builder::{Builder, ConceptBuilder, PatternBuilder, SemanticBuilder};
use crate::graph::{Engine, EntityKind, Stamp};
use crate::identity::PublicId;
use tracing::{info_span, warn};

/// Accumulates builders under one stamp until commit.
///
/// Not meant to be shared between threads: builders are filled in through
/// `&mut` borrows. Independent builders may still be built elsewhere in
/// parallel and handed over with [`AuthoringSession::add`].
pub struct AuthoringSession<'e> {
    engine: &'e Engine,
    id: u64,
    stamp: Stamp,
    state: SessionState,
    builders: Vec<Builder>,
}

impl<'e> AuthoringSession<'e> {
    pub(crate) fn new(engine: &'e Engine, id: u64, stamp: Stamp) -> Self {
        Self {
            engine,
            id,
            stamp,
            state: SessionState::Open,
            builders: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Builders accumulated so far, in composition order
    pub fn builders(&self) -> &[Builder] {
        &self.builders
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    fn push(&mut self, builder: Builder) -> &mut Builder {
        self.builders.push(builder);
        let last = self.builders.len() - 1;
        &mut self.builders[last]
    }

    /// Start a fresh builder of `kind` bound to `reference`.
    ///
    /// Returns `None` for [`EntityKind::Description`]: descriptions are
    /// composed through their owner's `DescriptionFacet`.
    pub fn compose(&mut self, kind: EntityKind, reference: PublicId) -> Option<&mut Builder> {
        let builder = Builder::for_kind(kind, reference)?;
        Some(self.push(builder))
    }

    pub fn compose_concept(&mut self, reference: PublicId) -> &mut ConceptBuilder {
        match self.push(ConceptBuilder::new(reference).into()) {
            Builder::Concept(b) => b,
            _ => unreachable!("just pushed a concept builder"),
        }
    }

    pub fn compose_pattern(&mut self, reference: PublicId) -> &mut PatternBuilder {
        match self.push(PatternBuilder::new(reference).into()) {
            Builder::Pattern(b) => b,
            _ => unreachable!("just pushed a pattern builder"),
        }
    }

    pub fn compose_semantic(&mut self, reference: PublicId) -> &mut SemanticBuilder {
        match self.push(SemanticBuilder::new(reference).into()) {
            Builder::Semantic(b) => b,
            _ => unreachable!("just pushed a semantic builder"),
        }
    }

    /// Hand over a builder that was filled in outside the session.
    pub fn add(&mut self, builder: impl Into<Builder>) -> &mut Builder {
        self.push(builder.into())
    }

    /// Commit every accumulated builder under this session's stamp.
    ///
    /// On failure the session is aborted and the store is left untouched.
    pub fn commit(&mut self) -> Result<CommitReceipt, CommitError> {
        if self.state != SessionState::Open {
            return Err(CommitError::InvalidState { state: self.state });
        }
        let span = info_span!("commit", session = self.id, builders = self.builders.len());
        let _enter = span.enter();

        self.state = SessionState::Committing;
        let builders = std::mem::take(&mut self.builders);
        match commit::commit(self.engine, &self.stamp, &builders) {
            Ok(receipt) => {
                self.state = SessionState::Closed;
                Ok(receipt)
            }
            Err(e) => {
                self.state = SessionState::Aborted;
                warn!(error = %e, "commit aborted");
                Err(e)
            }
        }
    }

    /// Discard every accumulated builder.
    pub fn abort(&mut self) -> Result<(), CommitError> {
        if self.state != SessionState::Open {
            return Err(CommitError::InvalidState { state: self.state });
        }
        self.state = SessionState::Aborted;
        let discarded = std::mem::take(&mut self.builders).len();
        warn!(session = self.id, discarded, "session aborted");
        Ok(())
    }
}

impl std::fmt::Debug for AuthoringSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthoringSession")
            .field("id", &self.id)
            .field("stamp", &self.stamp)
            .field("state", &self.state)
            .field("builders", &self.builders.len())
            .finish()
    }
}
