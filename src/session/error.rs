//! Commit failures

use super::state::SessionState;
use crate::builder::Builder;
use crate::graph::EntityKind;
use crate::identity::{Handle, IdentityError, PublicId};
use crate::schema::{FieldMismatch, SchemaError};
use crate::storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

/// Identifies one builder of a session: its position, kind and reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderRef {
    /// Zero-based position in composition order
    pub index: usize,
    pub kind: EntityKind,
    pub reference: PublicId,
}

impl BuilderRef {
    pub fn of(index: usize, builder: &Builder) -> Self {
        Self {
            index,
            kind: builder.kind(),
            reference: builder.reference().clone(),
        }
    }
}

impl std::fmt::Display for BuilderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} builder {} ({})", self.kind, self.index, self.reference)
    }
}

/// What part of a session a failure is attributed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offender {
    /// The session stamp's author, module or path reference
    Stamp,
    Builder(BuilderRef),
    /// The session as a whole, when no single builder is at fault
    Session,
}

impl Offender {
    pub fn builder(&self) -> Option<&BuilderRef> {
        match self {
            Self::Builder(b) => Some(b),
            _ => None,
        }
    }
}

impl std::fmt::Display for Offender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stamp => f.write_str("session stamp"),
            Self::Builder(b) => b.fmt(f),
            Self::Session => f.write_str("session"),
        }
    }
}

/// Why a session failed to commit. Every failure leaves the store unchanged.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("identity conflict in {offender}: {uuid} resolves to {existing} but the reference also resolves to {other}")]
    IdentityConflict {
        offender: Offender,
        uuid: Uuid,
        existing: Handle,
        other: Handle,
    },

    #[error("field type mismatch in {offender} against pattern {pattern}: {mismatch}")]
    FieldTypeMismatch {
        offender: Offender,
        pattern: Handle,
        mismatch: FieldMismatch,
    },

    /// A field value that cannot be stored, such as a NaN or infinite float
    #[error("invalid value in {offender} at slot {slot}: {reason}")]
    InvalidFieldValue {
        offender: Offender,
        slot: usize,
        reason: &'static str,
    },

    #[error("{offender} uses pattern {pattern}, which has no committed definition")]
    UnknownPattern { offender: Offender, pattern: Handle },

    #[error("commit conflict in {offender}: {reason}")]
    CommitConflict { offender: Offender, reason: String },

    #[error("storage failure: {0}")]
    StorageFailure(#[source] StorageError),

    /// Two builders of one session resolve to the same entity
    #[error("{offender} composes {handle}, already composed by builder {first}")]
    DuplicateComposition {
        offender: Offender,
        handle: Handle,
        first: usize,
    },

    #[error("{offender}: {handle} is already a {existing}, cannot compose it as a {requested}")]
    KindConflict {
        offender: Offender,
        handle: Handle,
        existing: EntityKind,
        requested: EntityKind,
    },

    #[error("{offender} is missing its {missing}")]
    IncompleteBuilder {
        offender: Offender,
        missing: &'static str,
    },

    #[error("session is {state}, expected open")]
    InvalidState { state: SessionState },
}

impl CommitError {
    /// Attribute an identity failure to part of the session.
    pub(crate) fn identity(offender: Offender, error: IdentityError) -> Self {
        match error {
            IdentityError::IdentityConflict {
                uuid,
                existing,
                other,
            } => Self::IdentityConflict {
                offender,
                uuid,
                existing,
                other,
            },
            IdentityError::KindConflict {
                handle,
                existing,
                requested,
            } => Self::KindConflict {
                offender,
                handle,
                existing,
                requested,
            },
            other => Self::CommitConflict {
                offender,
                reason: other.to_string(),
            },
        }
    }

    pub(crate) fn schema(offender: Offender, error: SchemaError) -> Self {
        match error {
            SchemaError::FieldTypeMismatch { pattern, mismatch } => Self::FieldTypeMismatch {
                offender,
                pattern,
                mismatch,
            },
            SchemaError::UnknownPattern(pattern) => Self::UnknownPattern { offender, pattern },
        }
    }

    /// The part of the session the failure is attributed to, if any
    pub fn offender(&self) -> Option<&Offender> {
        match self {
            Self::IdentityConflict { offender, .. }
            | Self::FieldTypeMismatch { offender, .. }
            | Self::InvalidFieldValue { offender, .. }
            | Self::UnknownPattern { offender, .. }
            | Self::CommitConflict { offender, .. }
            | Self::DuplicateComposition { offender, .. }
            | Self::KindConflict { offender, .. }
            | Self::IncompleteBuilder { offender, .. } => Some(offender),
            Self::StorageFailure(_) | Self::InvalidState { .. } => None,
        }
    }

    /// The offending builder, when the failure is attributed to one
    pub fn builder(&self) -> Option<&BuilderRef> {
        self.offender().and_then(Offender::builder)
    }
}
