//! Entity builders
//!
//! Builders accumulate one entity's attachments before commit. They are plain
//! owned values: independent builders can be filled in on separate threads
//! and handed to a session afterwards with `AuthoringSession::add`.

mod concept;
mod facet;
mod pattern;
mod semantic;

pub use concept::ConceptBuilder;
pub use facet::{
    case_insensitive, ConceptFacet, DescriptionFacet, Facet, FacetMismatch, PatternFacet,
    SemanticFacet,
};
pub use pattern::PatternBuilder;
pub use semantic::SemanticBuilder;

use crate::graph::EntityKind;
use crate::identity::PublicId;

/// A builder of any kind
#[derive(Debug, Clone, PartialEq)]
pub enum Builder {
    Concept(ConceptBuilder),
    Pattern(PatternBuilder),
    Semantic(SemanticBuilder),
}

impl Builder {
    /// A fresh, empty builder of `kind`.
    ///
    /// Descriptions are composed through their owning concept or pattern
    /// with a `DescriptionFacet`, so `Description` returns `None`.
    pub fn for_kind(kind: EntityKind, reference: PublicId) -> Option<Self> {
        match kind {
            EntityKind::Concept => Some(Self::Concept(ConceptBuilder::new(reference))),
            EntityKind::Pattern => Some(Self::Pattern(PatternBuilder::new(reference))),
            EntityKind::Semantic => Some(Self::Semantic(SemanticBuilder::new(reference))),
            EntityKind::Description => None,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Concept(_) => EntityKind::Concept,
            Self::Pattern(_) => EntityKind::Pattern,
            Self::Semantic(_) => EntityKind::Semantic,
        }
    }

    pub fn reference(&self) -> &PublicId {
        match self {
            Self::Concept(b) => b.reference(),
            Self::Pattern(b) => b.reference(),
            Self::Semantic(b) => b.reference(),
        }
    }

    /// Attach a facet of the matching kind
    pub fn attach(&mut self, facet: impl Into<Facet>) -> Result<&mut Self, FacetMismatch> {
        let facet = facet.into();
        match (&mut *self, facet) {
            (Self::Concept(b), Facet::Concept(f)) => {
                b.attach(f);
            }
            (Self::Pattern(b), Facet::Pattern(f)) => {
                b.attach(f);
            }
            (Self::Semantic(b), Facet::Semantic(f)) => {
                b.attach(f);
            }
            (builder, facet) => {
                return Err(FacetMismatch {
                    builder: builder.kind(),
                    facet: facet.kind(),
                })
            }
        }
        Ok(self)
    }

    pub fn as_concept_mut(&mut self) -> Option<&mut ConceptBuilder> {
        match self {
            Self::Concept(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_pattern_mut(&mut self) -> Option<&mut PatternBuilder> {
        match self {
            Self::Pattern(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_semantic_mut(&mut self) -> Option<&mut SemanticBuilder> {
        match self {
            Self::Semantic(b) => Some(b),
            _ => None,
        }
    }
}

impl From<ConceptBuilder> for Builder {
    fn from(b: ConceptBuilder) -> Self {
        Self::Concept(b)
    }
}

impl From<PatternBuilder> for Builder {
    fn from(b: PatternBuilder) -> Self {
        Self::Pattern(b)
    }
}

impl From<SemanticBuilder> for Builder {
    fn from(b: SemanticBuilder) -> Self {
        Self::Semantic(b)
    }
}
