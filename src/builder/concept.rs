//! ConceptBuilder: names, `is-a` axioms and navigation hints for one concept

use super::facet::{ConceptFacet, DescriptionFacet};
use crate::identity::PublicId;
use uuid::Uuid;

/// Accumulates one concept's attachments.
///
/// Purely in-memory; nothing is visible to readers until the owning session commits.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptBuilder {
    reference: PublicId,
    pub(crate) descriptions: Vec<DescriptionFacet>,
    pub(crate) parents: Vec<PublicId>,
    pub(crate) child_hints: Vec<PublicId>,
    pub(crate) identifiers: Vec<(PublicId, String)>,
    pub(crate) aliases: Vec<Uuid>,
}

impl ConceptBuilder {
    pub fn new(reference: PublicId) -> Self {
        Self {
            reference,
            descriptions: Vec::new(),
            parents: Vec::new(),
            child_hints: Vec::new(),
            identifiers: Vec::new(),
            aliases: Vec::new(),
        }
    }

    pub fn reference(&self) -> &PublicId {
        &self.reference
    }

    pub fn attach(&mut self, facet: ConceptFacet) -> &mut Self {
        match facet {
            ConceptFacet::Description(d) => self.descriptions.push(d),
            ConceptFacet::IsA { parents } => self.parents.extend(parents),
            ConceptFacet::Children { children } => self.child_hints.extend(children),
            ConceptFacet::Identifier { source, value } => self.identifiers.push((source, value)),
            ConceptFacet::Alias { uuid } => self.aliases.push(uuid),
        }
        self
    }

    pub fn description(&mut self, description: DescriptionFacet) -> &mut Self {
        self.attach(ConceptFacet::Description(description))
    }

    /// Add one `is-a` parent. Repeated calls build a polyhierarchy.
    pub fn is_a(&mut self, parent: PublicId) -> &mut Self {
        self.attach(ConceptFacet::IsA {
            parents: vec![parent],
        })
    }

    pub fn child(&mut self, child: PublicId) -> &mut Self {
        self.attach(ConceptFacet::Children {
            children: vec![child],
        })
    }

    pub fn identifier(&mut self, source: PublicId, value: impl Into<String>) -> &mut Self {
        self.attach(ConceptFacet::Identifier {
            source,
            value: value.into(),
        })
    }

    pub fn alias(&mut self, uuid: Uuid) -> &mut Self {
        self.attach(ConceptFacet::Alias { uuid })
    }
}
