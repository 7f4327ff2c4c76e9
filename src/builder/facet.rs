//! Facets: the attachments builders accumulate before commit

use crate::graph::{Acceptability, DescriptionType, EntityKind};
use crate::identity::PublicId;
use crate::schema::{FieldDefinition, FieldValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default case-significance concept for descriptions that do not name one
pub fn case_insensitive() -> PublicId {
    PublicId::from_name("Description not case sensitive")
}

/// A name, synonym or definition, with its language and dialect sub-facets.
///
/// Each description becomes its own entity at commit. Without an explicit
/// reference, one is derived from the owning concept, the description type,
/// the language and the text, so re-declaring the same description resolves
/// to the same entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionFacet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<PublicId>,
    pub description_type: DescriptionType,
    pub text: String,
    pub language: PublicId,
    #[serde(default = "case_insensitive")]
    pub case_significance: PublicId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dialects: Vec<(PublicId, Acceptability)>,
}

impl DescriptionFacet {
    pub fn new(description_type: DescriptionType, text: impl Into<String>, language: PublicId) -> Self {
        Self {
            reference: None,
            description_type,
            text: text.into(),
            language,
            case_significance: case_insensitive(),
            dialects: Vec::new(),
        }
    }

    pub fn fully_qualified_name(text: impl Into<String>, language: PublicId) -> Self {
        Self::new(DescriptionType::FullyQualifiedName, text, language)
    }

    pub fn synonym(text: impl Into<String>, language: PublicId) -> Self {
        Self::new(DescriptionType::Synonym, text, language)
    }

    pub fn definition(text: impl Into<String>, language: PublicId) -> Self {
        Self::new(DescriptionType::Definition, text, language)
    }

    pub fn with_reference(mut self, reference: PublicId) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_case_significance(mut self, case_significance: PublicId) -> Self {
        self.case_significance = case_significance;
        self
    }

    pub fn with_dialect(mut self, dialect: PublicId, acceptability: Acceptability) -> Self {
        self.dialects.push((dialect, acceptability));
        self
    }

    /// The reference this description commits under
    pub fn reference_for(&self, concept: &PublicId) -> PublicId {
        self.reference.clone().unwrap_or_else(|| {
            concept.derive(&format!(
                "{}:{}:{}",
                self.description_type.as_str(),
                self.language.primary(),
                self.text
            ))
        })
    }
}

/// Attachments accepted by a concept builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "facet", rename_all = "snake_case")]
pub enum ConceptFacet {
    Description(DescriptionFacet),
    /// `is-a` axiom with one or more parents
    IsA { parents: Vec<PublicId> },
    /// Navigation hint: children the author expects to declare this concept as a parent
    Children { children: Vec<PublicId> },
    Identifier { source: PublicId, value: String },
    /// Extra UUID for the concept itself
    Alias { uuid: Uuid },
}

/// Attachments accepted by a pattern builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "facet", rename_all = "snake_case")]
pub enum PatternFacet {
    Meaning { meaning: PublicId },
    Purpose { purpose: PublicId },
    /// Appends one field slot
    Field(FieldDefinition),
    /// Appends several field slots in order
    Fields { fields: Vec<FieldDefinition> },
    Description(DescriptionFacet),
}

/// Attachments accepted by a semantic builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "facet", rename_all = "snake_case")]
pub enum SemanticFacet {
    Pattern { pattern: PublicId },
    ReferencedComponent { component: PublicId },
    /// Appends one field value
    Field { value: FieldValue },
    /// Appends several field values in order
    Fields { values: Vec<FieldValue> },
}

/// Any facet, for the kind-agnostic builder surface
#[derive(Debug, Clone, PartialEq)]
pub enum Facet {
    Concept(ConceptFacet),
    Pattern(PatternFacet),
    Semantic(SemanticFacet),
}

impl Facet {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Concept(_) => EntityKind::Concept,
            Self::Pattern(_) => EntityKind::Pattern,
            Self::Semantic(_) => EntityKind::Semantic,
        }
    }
}

impl From<ConceptFacet> for Facet {
    fn from(f: ConceptFacet) -> Self {
        Self::Concept(f)
    }
}

impl From<PatternFacet> for Facet {
    fn from(f: PatternFacet) -> Self {
        Self::Pattern(f)
    }
}

impl From<SemanticFacet> for Facet {
    fn from(f: SemanticFacet) -> Self {
        Self::Semantic(f)
    }
}

/// A facet was attached to a builder of a different kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("a {facet} facet cannot be attached to a {builder} builder")]
pub struct FacetMismatch {
    pub builder: EntityKind,
    pub facet: EntityKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_description_reference_is_stable() {
        let concept = PublicId::from_name("Heart structure");
        let english = PublicId::from_name("English language");
        let a = DescriptionFacet::fully_qualified_name("Heart structure (body structure)", english.clone());
        let b = DescriptionFacet::fully_qualified_name("Heart structure (body structure)", english.clone());
        let c = DescriptionFacet::synonym("Heart structure (body structure)", english);
        assert_eq!(a.reference_for(&concept), b.reference_for(&concept));
        assert_ne!(a.reference_for(&concept), c.reference_for(&concept));
    }

    #[test]
    fn test_explicit_description_reference_wins() {
        let concept = PublicId::from_name("Heart structure");
        let explicit = PublicId::random();
        let facet = DescriptionFacet::synonym("Heart", PublicId::from_name("English language"))
            .with_reference(explicit.clone());
        assert_eq!(facet.reference_for(&concept), explicit);
    }

    #[test]
    fn test_concept_facet_deserializes_from_tagged_json() {
        let parent = PublicId::from_name("Root");
        let json = serde_json::json!({"facet": "is_a", "parents": [parent.primary()]});
        let facet: ConceptFacet = serde_json::from_value(json).unwrap();
        assert_eq!(facet, ConceptFacet::IsA { parents: vec![parent] });
    }

    #[test]
    fn test_description_defaults_case_significance() {
        let json = serde_json::json!({
            "description_type": "synonym",
            "text": "Heart",
            "language": [PublicId::from_name("English language").primary()],
        });
        let facet: DescriptionFacet = serde_json::from_value(json).unwrap();
        assert_eq!(facet.case_significance, case_insensitive());
    }
}
