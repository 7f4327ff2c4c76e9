//! Dense internal handles and their pending/defined state

use crate::graph::EntityKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dense integer identity assigned on first mention of a reference.
///
/// Handles start at 1 and are never reused or destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(u32);

impl Handle {
    pub const FIRST: Handle = Handle(1);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Position in a dense table indexed from zero
    pub(crate) fn slot(self) -> usize {
        (self.0 as usize).saturating_sub(1)
    }

    pub(crate) fn from_slot(slot: usize) -> Self {
        Self(slot as u32 + 1)
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a handle has a committed version yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "kind", rename_all = "lowercase")]
pub enum HandleState {
    /// Mentioned (as a parent, field value, stamp coordinate...) but not declared
    Pending,
    /// At least one version of the given kind has been committed
    Defined(EntityKind),
}

impl HandleState {
    pub fn is_defined(&self) -> bool {
        matches!(self, Self::Defined(_))
    }

    pub fn kind(&self) -> Option<EntityKind> {
        match self {
            Self::Pending => None,
            Self::Defined(kind) => Some(*kind),
        }
    }
}

/// A handle together with every UUID that resolves to it.
///
/// This is the persisted form of one row of the handle table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub handle: Handle,
    pub uuids: Vec<Uuid>,
    pub state: HandleState,
}

/// Changes a commit makes to the handle table.
///
/// Built up by a resolution scope and applied in one step once the
/// commit's versions are durable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityDelta {
    /// Handles allocated by this commit, in allocation order
    pub allocated: Vec<IdentityRecord>,
    /// New UUID aliases for handles that existed before this commit
    pub aliases: Vec<(Handle, Uuid)>,
    /// Handles that received their first version in this commit
    pub defined: Vec<(Handle, EntityKind)>,
}

impl IdentityDelta {
    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty() && self.aliases.is_empty() && self.defined.is_empty()
    }
}
