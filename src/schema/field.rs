//! Field definitions and field values

use crate::identity::{Handle, PublicId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declared data type of a pattern field slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "STRING")]
    String,
    #[serde(rename = "INTEGER_FIELD")]
    Integer,
    #[serde(rename = "FLOAT_FIELD")]
    Float,
    #[serde(rename = "BOOLEAN_FIELD")]
    Boolean,
    #[serde(rename = "INSTANT_FIELD")]
    Instant,
    #[serde(rename = "COMPONENT_FIELD")]
    Component,
    #[serde(rename = "COMPONENT_ID_LIST_FIELD")]
    ComponentList,
    #[serde(rename = "COMPONENT_ID_SET_FIELD")]
    ComponentSet,
}

impl FieldType {
    /// Whether a value of runtime type `found` may fill a slot of this type.
    ///
    /// Numeric slots take any number; everything else must match exactly.
    pub fn accepts(self, found: FieldType) -> bool {
        self == found || (self == FieldType::Float && found == FieldType::Integer)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER_FIELD",
            Self::Float => "FLOAT_FIELD",
            Self::Boolean => "BOOLEAN_FIELD",
            Self::Instant => "INSTANT_FIELD",
            Self::Component => "COMPONENT_FIELD",
            Self::ComponentList => "COMPONENT_ID_LIST_FIELD",
            Self::ComponentSet => "COMPONENT_ID_SET_FIELD",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FieldType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STRING" => Ok(Self::String),
            "INTEGER_FIELD" => Ok(Self::Integer),
            "FLOAT_FIELD" => Ok(Self::Float),
            "BOOLEAN_FIELD" => Ok(Self::Boolean),
            "INSTANT_FIELD" => Ok(Self::Instant),
            "COMPONENT_FIELD" => Ok(Self::Component),
            "COMPONENT_ID_LIST_FIELD" => Ok(Self::ComponentList),
            "COMPONENT_ID_SET_FIELD" => Ok(Self::ComponentSet),
            _ => Err(format!("unknown field type: {}", s)),
        }
    }
}

/// One field slot of a pattern, as declared by an author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Optional display name of the field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Concept giving the meaning of the field
    pub meaning: PublicId,
    /// Concept giving the purpose of the field
    pub purpose: PublicId,
    /// Runtime type values in this slot must have
    pub field_type: FieldType,
    /// Concept describing the data type; may be declared later than the pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_concept: Option<PublicId>,
}

impl FieldDefinition {
    pub fn new(meaning: PublicId, purpose: PublicId, field_type: FieldType) -> Self {
        Self {
            name: None,
            meaning,
            purpose,
            field_type,
            type_concept: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type_concept(mut self, concept: PublicId) -> Self {
        self.type_concept = Some(concept);
        self
    }
}

/// A field definition with its references resolved to handles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFieldDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub meaning: Handle,
    pub purpose: Handle,
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_concept: Option<Handle>,
}

/// A field value supplied by an author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Instant(DateTime<Utc>),
    Component(PublicId),
    ComponentList(Vec<PublicId>),
    ComponentSet(Vec<PublicId>),
}

impl FieldValue {
    /// Runtime type of this value
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::String(_) => FieldType::String,
            Self::Integer(_) => FieldType::Integer,
            Self::Float(_) => FieldType::Float,
            Self::Boolean(_) => FieldType::Boolean,
            Self::Instant(_) => FieldType::Instant,
            Self::Component(_) => FieldType::Component,
            Self::ComponentList(_) => FieldType::ComponentList,
            Self::ComponentSet(_) => FieldType::ComponentSet,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<PublicId> for FieldValue {
    fn from(r: PublicId) -> Self {
        Self::Component(r)
    }
}

/// A field value with entity references resolved to handles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldData {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Instant(DateTime<Utc>),
    Component(Handle),
    ComponentList(Vec<Handle>),
    /// Sorted and duplicate-free
    ComponentSet(Vec<Handle>),
}

impl FieldData {
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::String(_) => FieldType::String,
            Self::Integer(_) => FieldType::Integer,
            Self::Float(_) => FieldType::Float,
            Self::Boolean(_) => FieldType::Boolean,
            Self::Instant(_) => FieldType::Instant,
            Self::Component(_) => FieldType::Component,
            Self::ComponentList(_) => FieldType::ComponentList,
            Self::ComponentSet(_) => FieldType::ComponentSet,
        }
    }

    /// Handles this value points at
    pub fn handles(&self) -> Vec<Handle> {
        match self {
            Self::Component(h) => vec![*h],
            Self::ComponentList(hs) | Self::ComponentSet(hs) => hs.clone(),
            _ => Vec::new(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}
