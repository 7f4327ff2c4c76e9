//! FieldSchemaRegistry: pattern field definitions and value validation

use super::field::{FieldType, ResolvedFieldDefinition};
use crate::identity::Handle;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// How a list of field values disagrees with a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMismatch {
    /// Wrong number of values
    Arity { expected: usize, found: usize },
    /// Value at `slot` (zero-based) has the wrong type
    Slot {
        slot: usize,
        expected: FieldType,
        found: FieldType,
    },
}

impl std::fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Arity { expected, found } => {
                write!(f, "expected {} field values, found {}", expected, found)
            }
            Self::Slot {
                slot,
                expected,
                found,
            } => write!(f, "slot {} expects {}, found {}", slot, expected, found),
        }
    }
}

/// Errors from schema validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("field type mismatch against pattern {pattern}: {mismatch}")]
    FieldTypeMismatch {
        pattern: Handle,
        mismatch: FieldMismatch,
    },

    /// No definition for the pattern anywhere in the visible history
    #[error("unknown pattern: {0}")]
    UnknownPattern(Handle),
}

/// Shared field definitions
pub type FieldDefinitions = Arc<[ResolvedFieldDefinition]>;

/// Check runtime field types against a pattern's definitions, slot by slot.
pub fn check_fields(
    pattern: Handle,
    definitions: &[ResolvedFieldDefinition],
    found: &[FieldType],
) -> Result<(), SchemaError> {
    if definitions.len() != found.len() {
        return Err(SchemaError::FieldTypeMismatch {
            pattern,
            mismatch: FieldMismatch::Arity {
                expected: definitions.len(),
                found: found.len(),
            },
        });
    }
    for (slot, (definition, found)) in definitions.iter().zip(found).enumerate() {
        if !definition.field_type.accepts(*found) {
            return Err(SchemaError::FieldTypeMismatch {
                pattern,
                mismatch: FieldMismatch::Slot {
                    slot,
                    expected: definition.field_type,
                    found: *found,
                },
            });
        }
    }
    Ok(())
}

/// Latest committed field definitions per pattern handle
#[derive(Debug, Default)]
pub struct FieldSchemaRegistry {
    patterns: DashMap<Handle, FieldDefinitions>,
}

impl FieldSchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the field definitions of a committed pattern version.
    ///
    /// A later version of the same pattern replaces the earlier definitions.
    pub fn register_pattern(&self, pattern: Handle, definitions: FieldDefinitions) {
        self.patterns.insert(pattern, definitions);
    }

    pub fn remove_pattern(&self, pattern: Handle) {
        self.patterns.remove(&pattern);
    }

    pub fn definitions(&self, pattern: Handle) -> Option<FieldDefinitions> {
        self.patterns.get(&pattern).map(|d| Arc::clone(d.value()))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Validate field types against a committed pattern.
    pub fn validate(&self, pattern: Handle, found: &[FieldType]) -> Result<(), SchemaError> {
        let definitions = self
            .definitions(pattern)
            .ok_or(SchemaError::UnknownPattern(pattern))?;
        check_fields(pattern, &definitions, found)
    }

    /// Open a staging overlay for one commit
    pub fn overlay(&self) -> SchemaOverlay<'_> {
        SchemaOverlay {
            registry: self,
            staged: HashMap::new(),
        }
    }
}

/// Patterns declared in the commit being validated, layered over the registry
pub struct SchemaOverlay<'a> {
    registry: &'a FieldSchemaRegistry,
    staged: HashMap<Handle, FieldDefinitions>,
}

impl<'a> SchemaOverlay<'a> {
    pub fn register_pattern(&mut self, pattern: Handle, definitions: FieldDefinitions) {
        self.staged.insert(pattern, definitions);
    }

    pub fn definitions(&self, pattern: Handle) -> Option<FieldDefinitions> {
        self.staged
            .get(&pattern)
            .cloned()
            .or_else(|| self.registry.definitions(pattern))
    }

    /// Validate against the staged pattern if there is one, else the registry.
    pub fn validate(&self, pattern: Handle, found: &[FieldType]) -> Result<(), SchemaError> {
        let definitions = self
            .definitions(pattern)
            .ok_or(SchemaError::UnknownPattern(pattern))?;
        check_fields(pattern, &definitions, found)
    }
}
