//! Semantic promotion of structurally valid cards into the canonical model.

use directory_types::{IdentifierError, ParticipantIdentifier};
use thiserror::Error;

use crate::model::{BusinessEntity, Contact, EntityIdentifier, EntityName, NormalizedBusinessCard};
use crate::schema::{RawCard, RawContact, RawEntity};

/// The card matched a schema but its content is unusable. Older schema
/// versions are not tried after this.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromotionError {
    #[error("Invalid participant identifier: {0}")]
    InvalidParticipant(#[from] IdentifierError),

    #[error("Business entity {index} has no name")]
    MissingName { index: usize },

    #[error("Business entity {index} has no country code")]
    MissingCountryCode { index: usize },
}

pub fn promote(raw: RawCard) -> Result<NormalizedBusinessCard, PromotionError> {
    let participant = ParticipantIdentifier::new(&raw.participant.scheme, &raw.participant.value)?;
    let entities = raw
        .entities
        .into_iter()
        .enumerate()
        .map(|(index, entity)| promote_entity(index, entity))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(NormalizedBusinessCard {
        participant,
        entities,
    })
}

fn promote_entity(index: usize, raw: RawEntity) -> Result<BusinessEntity, PromotionError> {
    let names: Vec<EntityName> = raw
        .names
        .into_iter()
        .filter_map(|n| {
            non_empty(n.name).map(|name| EntityName {
                name,
                language: n.language.and_then(non_empty),
            })
        })
        .collect();
    if names.is_empty() {
        return Err(PromotionError::MissingName { index });
    }

    let country_code = raw.country_code.trim().to_uppercase();
    if country_code.is_empty() {
        return Err(PromotionError::MissingCountryCode { index });
    }

    Ok(BusinessEntity {
        names,
        country_code,
        geographical_information: raw.geographical_information.and_then(non_empty),
        identifiers: raw
            .identifiers
            .into_iter()
            .filter_map(|id| {
                non_empty(id.value).map(|value| EntityIdentifier {
                    scheme: id.scheme.trim().to_string(),
                    value,
                })
            })
            .collect(),
        website_uris: raw.website_uris.into_iter().filter_map(non_empty).collect(),
        contacts: raw
            .contacts
            .into_iter()
            .map(promote_contact)
            .filter(|c| !c.is_empty())
            .collect(),
        additional_information: raw.additional_information.and_then(non_empty),
        registration_date: raw.registration_date,
    })
}

fn promote_contact(raw: RawContact) -> Contact {
    Contact {
        contact_type: raw.contact_type.and_then(non_empty),
        name: raw.name.and_then(non_empty),
        phone: raw.phone.and_then(non_empty),
        email: raw.email.and_then(non_empty),
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CardVersion, RawIdentifier, RawName};

    fn raw_card(entity: RawEntity) -> RawCard {
        RawCard {
            version: CardVersion::V2,
            participant: RawIdentifier {
                scheme: "iso6523-actorid-upis".to_string(),
                value: " 9915:TEST ".to_string(),
            },
            entities: vec![entity],
        }
    }

    fn raw_entity(name: &str, country: &str) -> RawEntity {
        RawEntity {
            names: vec![RawName {
                name: name.to_string(),
                language: None,
            }],
            country_code: country.to_string(),
            ..RawEntity::default()
        }
    }

    #[test]
    fn test_promote_normalizes_values() {
        let mut entity = raw_entity("  ACME  ", " at ");
        entity.website_uris = vec![" https://acme.example ".to_string(), "  ".to_string()];
        entity.contacts = vec![
            RawContact {
                email: Some(" info@acme.example ".to_string()),
                ..RawContact::default()
            },
            RawContact {
                name: Some(" ".to_string()),
                ..RawContact::default()
            },
        ];

        let card = promote(raw_card(entity)).unwrap();
        assert_eq!(card.participant.value(), "9915:test");
        let entity = &card.entities[0];
        assert_eq!(entity.primary_name(), "ACME");
        assert_eq!(entity.country_code, "AT");
        assert_eq!(entity.website_uris, vec!["https://acme.example"]);
        assert_eq!(entity.contacts.len(), 1);
        assert_eq!(entity.contacts[0].email.as_deref(), Some("info@acme.example"));
    }

    #[test]
    fn test_promote_rejects_empty_name() {
        assert_eq!(
            promote(raw_card(raw_entity("   ", "AT"))),
            Err(PromotionError::MissingName { index: 0 })
        );
    }

    #[test]
    fn test_promote_rejects_empty_country() {
        assert_eq!(
            promote(raw_card(raw_entity("ACME", ""))),
            Err(PromotionError::MissingCountryCode { index: 0 })
        );
    }

    #[test]
    fn test_promote_rejects_invalid_participant() {
        let mut card = raw_card(raw_entity("ACME", "AT"));
        card.participant.scheme = "not a scheme".to_string();
        assert!(matches!(
            promote(card),
            Err(PromotionError::InvalidParticipant(_))
        ));
    }
}
