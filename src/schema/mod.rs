//! Pattern field schemas and the registry that validates semantic field values

mod field;
mod registry;

pub use field::{FieldData, FieldDefinition, FieldType, FieldValue, ResolvedFieldDefinition};
pub use registry::{
    check_fields, FieldDefinitions, FieldMismatch, FieldSchemaRegistry, SchemaError, SchemaOverlay,
};
