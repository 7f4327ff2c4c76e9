//! PatternBuilder: meaning, purpose and ordered field definitions

use super::facet::{DescriptionFacet, PatternFacet};
use crate::identity::PublicId;
use crate::schema::FieldDefinition;

#[derive(Debug, Clone, PartialEq)]
pub struct PatternBuilder {
    reference: PublicId,
    pub(crate) meaning: Option<PublicId>,
    pub(crate) purpose: Option<PublicId>,
    pub(crate) fields: Vec<FieldDefinition>,
    pub(crate) descriptions: Vec<DescriptionFacet>,
}

impl PatternBuilder {
    pub fn new(reference: PublicId) -> Self {
        Self {
            reference,
            meaning: None,
            purpose: None,
            fields: Vec::new(),
            descriptions: Vec::new(),
        }
    }

    pub fn reference(&self) -> &PublicId {
        &self.reference
    }

    /// Meaning and purpose replace earlier values; fields append in call order.
    pub fn attach(&mut self, facet: PatternFacet) -> &mut Self {
        match facet {
            PatternFacet::Meaning { meaning } => self.meaning = Some(meaning),
            PatternFacet::Purpose { purpose } => self.purpose = Some(purpose),
            PatternFacet::Field(field) => self.fields.push(field),
            PatternFacet::Fields { fields } => self.fields.extend(fields),
            PatternFacet::Description(d) => self.descriptions.push(d),
        }
        self
    }

    pub fn meaning(&mut self, meaning: PublicId) -> &mut Self {
        self.attach(PatternFacet::Meaning { meaning })
    }

    pub fn purpose(&mut self, purpose: PublicId) -> &mut Self {
        self.attach(PatternFacet::Purpose { purpose })
    }

    pub fn field(&mut self, field: FieldDefinition) -> &mut Self {
        self.attach(PatternFacet::Field(field))
    }

    pub fn description(&mut self, description: DescriptionFacet) -> &mut Self {
        self.attach(PatternFacet::Description(description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;

    #[test]
    fn test_field_order_is_call_order() {
        let mut builder = PatternBuilder::new(PublicId::from_name("Identifier pattern"));
        builder
            .meaning(PublicId::from_name("Identifier source"))
            .purpose(PublicId::from_name("Identifier purpose"))
            .field(
                FieldDefinition::new(
                    PublicId::from_name("Identifier source"),
                    PublicId::from_name("Identifier source"),
                    FieldType::Component,
                )
                .with_name("source"),
            )
            .field(
                FieldDefinition::new(
                    PublicId::from_name("Identifier value"),
                    PublicId::from_name("Identifier value"),
                    FieldType::String,
                )
                .with_name("value"),
            );
        let names: Vec<_> = builder.fields.iter().map(|f| f.name.as_deref()).collect();
        assert_eq!(names, vec![Some("source"), Some("value")]);
    }
}
