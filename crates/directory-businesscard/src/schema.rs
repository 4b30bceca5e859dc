//! Business card schema versions and their structural readers.
//!
//! Each version has its own namespace and a small set of rules that differ
//! between versions. A structural reader checks an element tree against those
//! rules and produces a [`RawCard`] whose values are still untrimmed and
//! unvalidated; semantic checks happen in [`crate::promote`].

use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

use crate::xml::XmlElement;

pub const NAMESPACE_V1: &str = "http://www.peppol.eu/schema/pd/businesscard/20160112/";
pub const NAMESPACE_V2: &str = "http://www.peppol.eu/schema/pd/businesscard/20161123/";
pub const NAMESPACE_V3: &str = "http://www.peppol.eu/schema/pd/businesscard/20180621/";

const EL_PARTICIPANT: &str = "ParticipantIdentifier";
const EL_ENTITY: &str = "BusinessEntity";
const EL_NAME: &str = "Name";
const EL_COUNTRY: &str = "CountryCode";
const EL_GEO: &str = "GeographicalInformation";
const EL_IDENTIFIER: &str = "Identifier";
const EL_WEBSITE: &str = "WebsiteURI";
const EL_CONTACT: &str = "Contact";
const EL_ADDITIONAL: &str = "AdditionalInformation";
const EL_REGISTRATION: &str = "RegistrationDate";

const CONTACT_ATTRIBUTES: [&str; 4] = ["type", "name", "phone", "email"];

/// Supported business card schema versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardVersion {
    V1,
    V2,
    V3,
}

impl CardVersion {
    /// Newest first. The first version that reads a document wins.
    pub const PRIORITY: [CardVersion; 3] = [CardVersion::V3, CardVersion::V2, CardVersion::V1];

    pub fn namespace(&self) -> &'static str {
        match self {
            CardVersion::V1 => NAMESPACE_V1,
            CardVersion::V2 => NAMESPACE_V2,
            CardVersion::V3 => NAMESPACE_V3,
        }
    }

    pub fn root_element(&self) -> &'static str {
        match self {
            CardVersion::V1 => "BusinessInformation",
            CardVersion::V2 | CardVersion::V3 => "BusinessCard",
        }
    }

    /// V3 allows several names per entity, each with an optional language.
    fn multilingual_names(&self) -> bool {
        matches!(self, CardVersion::V3)
    }

    /// V1 contacts must carry every attribute.
    fn contact_attributes_required(&self) -> bool {
        matches!(self, CardVersion::V1)
    }

    /// Structurally read `root` as a card of this version.
    pub fn read(&self, root: &XmlElement) -> Result<RawCard, StructureError> {
        let ns = self.namespace();
        if !root.is(ns, self.root_element()) {
            return Err(StructureError::UnexpectedRoot {
                namespace: root.namespace.clone(),
                name: root.name.clone(),
            });
        }

        let mut participant = None;
        let mut entities = Vec::new();
        for child in &root.children {
            self.expect_namespace(child)?;
            match child.name.as_str() {
                EL_PARTICIPANT => {
                    if participant.is_some() {
                        return Err(StructureError::Duplicate(EL_PARTICIPANT));
                    }
                    participant = Some(RawIdentifier {
                        scheme: required_attribute(child, "scheme")?,
                        value: child.text.clone(),
                    });
                }
                EL_ENTITY => entities.push(self.read_entity(child)?),
                other => return Err(StructureError::UnexpectedElement(other.to_string())),
            }
        }

        Ok(RawCard {
            version: *self,
            participant: participant.ok_or(StructureError::Missing(EL_PARTICIPANT))?,
            entities,
        })
    }

    fn read_entity(&self, element: &XmlElement) -> Result<RawEntity, StructureError> {
        let mut entity = RawEntity::default();
        let mut country_code = None;

        for child in &element.children {
            self.expect_namespace(child)?;
            match child.name.as_str() {
                EL_NAME => {
                    let language = child.attribute("language").map(str::to_string);
                    if language.is_some() && !self.multilingual_names() {
                        return Err(StructureError::UnexpectedAttribute {
                            element: EL_NAME,
                            attribute: "language".to_string(),
                        });
                    }
                    if !entity.names.is_empty() && !self.multilingual_names() {
                        return Err(StructureError::Duplicate(EL_NAME));
                    }
                    entity.names.push(RawName {
                        name: child.text.clone(),
                        language,
                    });
                }
                EL_COUNTRY => set_once(&mut country_code, child.text.clone(), EL_COUNTRY)?,
                EL_GEO => set_once(&mut entity.geographical_information, child.text.clone(), EL_GEO)?,
                EL_IDENTIFIER => entity.identifiers.push(RawIdentifier {
                    scheme: required_attribute(child, "scheme")?,
                    value: child.text.clone(),
                }),
                EL_WEBSITE => entity.website_uris.push(child.text.clone()),
                EL_CONTACT => entity.contacts.push(self.read_contact(child)?),
                EL_ADDITIONAL => set_once(
                    &mut entity.additional_information,
                    child.text.clone(),
                    EL_ADDITIONAL,
                )?,
                EL_REGISTRATION => {
                    let date = NaiveDate::parse_from_str(child.text.trim(), "%Y-%m-%d")
                        .map_err(|_| StructureError::InvalidDate(child.text.clone()))?;
                    set_once(&mut entity.registration_date, date, EL_REGISTRATION)?;
                }
                other => return Err(StructureError::UnexpectedElement(other.to_string())),
            }
        }

        if entity.names.is_empty() {
            return Err(StructureError::Missing(EL_NAME));
        }
        entity.country_code = country_code.ok_or(StructureError::Missing(EL_COUNTRY))?;
        Ok(entity)
    }

    fn read_contact(&self, element: &XmlElement) -> Result<RawContact, StructureError> {
        if self.contact_attributes_required() {
            for attribute in CONTACT_ATTRIBUTES {
                required_attribute(element, attribute)?;
            }
        }
        let get = |name: &str| element.attribute(name).map(str::to_string);
        Ok(RawContact {
            contact_type: get("type"),
            name: get("name"),
            phone: get("phone"),
            email: get("email"),
        })
    }

    fn expect_namespace(&self, element: &XmlElement) -> Result<(), StructureError> {
        if element.namespace.as_deref() == Some(self.namespace()) {
            Ok(())
        } else {
            Err(StructureError::UnexpectedElement(element.name.clone()))
        }
    }
}

impl fmt::Display for CardVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardVersion::V1 => f.write_str("v1"),
            CardVersion::V2 => f.write_str("v2"),
            CardVersion::V3 => f.write_str("v3"),
        }
    }
}

fn required_attribute(element: &XmlElement, name: &str) -> Result<String, StructureError> {
    element
        .attribute(name)
        .map(str::to_string)
        .ok_or_else(|| StructureError::MissingAttribute {
            element: element.name.clone(),
            attribute: name.to_string(),
        })
}

fn set_once<T>(slot: &mut Option<T>, value: T, element: &'static str) -> Result<(), StructureError> {
    if slot.is_some() {
        return Err(StructureError::Duplicate(element));
    }
    *slot = Some(value);
    Ok(())
}

/// The document does not match a schema version. The next version is tried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    #[error("Unexpected root element {name} in namespace {namespace:?}")]
    UnexpectedRoot {
        namespace: Option<String>,
        name: String,
    },

    #[error("Unexpected element {0}")]
    UnexpectedElement(String),

    #[error("Unexpected attribute {attribute} on {element}")]
    UnexpectedAttribute {
        element: &'static str,
        attribute: String,
    },

    #[error("Missing element {0}")]
    Missing(&'static str),

    #[error("Element {0} may only occur once")]
    Duplicate(&'static str),

    #[error("Missing attribute {attribute} on {element}")]
    MissingAttribute { element: String, attribute: String },

    #[error("Invalid date '{0}'")]
    InvalidDate(String),
}

/// Structurally valid card, not yet semantically checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCard {
    pub version: CardVersion,
    pub participant: RawIdentifier,
    pub entities: Vec<RawEntity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntity {
    pub names: Vec<RawName>,
    pub country_code: String,
    pub geographical_information: Option<String>,
    pub identifiers: Vec<RawIdentifier>,
    pub website_uris: Vec<String>,
    pub contacts: Vec<RawContact>,
    pub additional_information: Option<String>,
    pub registration_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawName {
    pub name: String,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIdentifier {
    pub scheme: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawContact {
    pub contact_type: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(version: CardVersion, entity: XmlElement) -> XmlElement {
        let ns = Some(version.namespace());
        XmlElement::new(ns, version.root_element())
            .with_child(
                XmlElement::new(ns, EL_PARTICIPANT)
                    .with_attribute("scheme", "iso6523-actorid-upis")
                    .with_text("9915:test"),
            )
            .with_child(entity)
    }

    fn entity(version: CardVersion) -> XmlElement {
        let ns = Some(version.namespace());
        XmlElement::new(ns, EL_ENTITY)
            .with_child(XmlElement::new(ns, EL_NAME).with_text("ACME"))
            .with_child(XmlElement::new(ns, EL_COUNTRY).with_text("AT"))
    }

    #[test]
    fn test_read_minimal_card() {
        for version in CardVersion::PRIORITY {
            let raw = version.read(&card(version, entity(version))).unwrap();
            assert_eq!(raw.version, version);
            assert_eq!(raw.participant.value, "9915:test");
            assert_eq!(raw.entities.len(), 1);
            assert_eq!(raw.entities[0].names[0].name, "ACME");
            assert_eq!(raw.entities[0].country_code, "AT");
        }
    }

    #[test]
    fn test_wrong_namespace_is_structural_error() {
        let doc = card(CardVersion::V2, entity(CardVersion::V2));
        assert!(matches!(
            CardVersion::V1.read(&doc),
            Err(StructureError::UnexpectedRoot { .. })
        ));
        assert!(matches!(
            CardVersion::V3.read(&doc),
            Err(StructureError::UnexpectedRoot { .. })
        ));
    }

    #[test]
    fn test_v1_requires_all_contact_attributes() {
        let ns = Some(NAMESPACE_V1);
        let partial = entity(CardVersion::V1)
            .with_child(XmlElement::new(ns, EL_CONTACT).with_attribute("name", "Jane"));
        assert!(matches!(
            CardVersion::V1.read(&card(CardVersion::V1, partial)),
            Err(StructureError::MissingAttribute { .. })
        ));

        let ns = Some(NAMESPACE_V2);
        let partial = entity(CardVersion::V2)
            .with_child(XmlElement::new(ns, EL_CONTACT).with_attribute("name", "Jane"));
        let raw = CardVersion::V2.read(&card(CardVersion::V2, partial)).unwrap();
        assert_eq!(raw.entities[0].contacts[0].name.as_deref(), Some("Jane"));
        assert_eq!(raw.entities[0].contacts[0].email, None);
    }

    #[test]
    fn test_multiple_names_only_in_v3() {
        let ns = Some(NAMESPACE_V3);
        let multi = entity(CardVersion::V3).with_child(
            XmlElement::new(ns, EL_NAME)
                .with_attribute("language", "de")
                .with_text("ACME GmbH"),
        );
        let raw = CardVersion::V3.read(&card(CardVersion::V3, multi)).unwrap();
        assert_eq!(raw.entities[0].names.len(), 2);
        assert_eq!(raw.entities[0].names[1].language.as_deref(), Some("de"));

        let ns = Some(NAMESPACE_V2);
        let multi = entity(CardVersion::V2).with_child(XmlElement::new(ns, EL_NAME).with_text("x"));
        assert_eq!(
            CardVersion::V2.read(&card(CardVersion::V2, multi)),
            Err(StructureError::Duplicate(EL_NAME))
        );
    }

    #[test]
    fn test_missing_required_elements() {
        let ns = Some(NAMESPACE_V2);
        let no_country = XmlElement::new(ns, EL_ENTITY)
            .with_child(XmlElement::new(ns, EL_NAME).with_text("ACME"));
        assert_eq!(
            CardVersion::V2.read(&card(CardVersion::V2, no_country)),
            Err(StructureError::Missing(EL_COUNTRY))
        );

        let no_participant = XmlElement::new(ns, "BusinessCard").with_child(entity(CardVersion::V2));
        assert_eq!(
            CardVersion::V2.read(&no_participant),
            Err(StructureError::Missing(EL_PARTICIPANT))
        );
    }

    #[test]
    fn test_unknown_element_and_bad_date() {
        let ns = Some(NAMESPACE_V2);
        let unknown = entity(CardVersion::V2).with_child(XmlElement::new(ns, "Logo"));
        assert_eq!(
            CardVersion::V2.read(&card(CardVersion::V2, unknown)),
            Err(StructureError::UnexpectedElement("Logo".to_string()))
        );

        let bad_date =
            entity(CardVersion::V2).with_child(XmlElement::new(ns, EL_REGISTRATION).with_text("01.02.2020"));
        assert!(matches!(
            CardVersion::V2.read(&card(CardVersion::V2, bad_date)),
            Err(StructureError::InvalidDate(_))
        ));

        let good_date =
            entity(CardVersion::V2).with_child(XmlElement::new(ns, EL_REGISTRATION).with_text("2020-02-01"));
        let raw = CardVersion::V2.read(&card(CardVersion::V2, good_date)).unwrap();
        assert_eq!(
            raw.entities[0].registration_date,
            NaiveDate::from_ymd_opt(2020, 2, 1)
        );
    }
}
