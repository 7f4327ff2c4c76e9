//! SemanticBuilder: pattern-typed data attached to a referenced component

use super::facet::SemanticFacet;
use crate::identity::PublicId;
use crate::schema::FieldValue;

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticBuilder {
    reference: PublicId,
    pub(crate) pattern: Option<PublicId>,
    pub(crate) referenced_component: Option<PublicId>,
    pub(crate) fields: Vec<FieldValue>,
}

impl SemanticBuilder {
    pub fn new(reference: PublicId) -> Self {
        Self {
            reference,
            pattern: None,
            referenced_component: None,
            fields: Vec::new(),
        }
    }

    pub fn reference(&self) -> &PublicId {
        &self.reference
    }

    pub fn attach(&mut self, facet: SemanticFacet) -> &mut Self {
        match facet {
            SemanticFacet::Pattern { pattern } => self.pattern = Some(pattern),
            SemanticFacet::ReferencedComponent { component } => {
                self.referenced_component = Some(component)
            }
            SemanticFacet::Field { value } => self.fields.push(value),
            SemanticFacet::Fields { values } => self.fields.extend(values),
        }
        self
    }

    pub fn pattern(&mut self, pattern: PublicId) -> &mut Self {
        self.attach(SemanticFacet::Pattern { pattern })
    }

    pub fn referenced_component(&mut self, component: PublicId) -> &mut Self {
        self.attach(SemanticFacet::ReferencedComponent { component })
    }

    pub fn field(&mut self, value: impl Into<FieldValue>) -> &mut Self {
        self.attach(SemanticFacet::Field {
            value: value.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_append_in_order() {
        let mut builder = SemanticBuilder::new(PublicId::random());
        builder
            .pattern(PublicId::from_name("P1"))
            .referenced_component(PublicId::from_name("X"))
            .field("hello")
            .field(2.75);
        assert_eq!(
            builder.fields,
            vec![FieldValue::String("hello".into()), FieldValue::Float(2.75)]
        );
    }
}
