//! Canonical business card model shared by every schema version.

use chrono::NaiveDate;
use directory_types::ParticipantIdentifier;
use serde::{Deserialize, Serialize};

/// The normalized form of a business card, independent of its schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedBusinessCard {
    pub participant: ParticipantIdentifier,
    /// Entities in document order
    pub entities: Vec<BusinessEntity>,
}

/// One named and located unit within a business card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessEntity {
    /// At least one entry after normalization
    pub names: Vec<EntityName>,
    /// Upper-cased country code
    pub country_code: String,
    #[serde(default)]
    pub geographical_information: Option<String>,
    #[serde(default)]
    pub identifiers: Vec<EntityIdentifier>,
    #[serde(default)]
    pub website_uris: Vec<String>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub additional_information: Option<String>,
    #[serde(default)]
    pub registration_date: Option<NaiveDate>,
}

impl BusinessEntity {
    /// First name of the entity, used for display and sorting.
    pub fn primary_name(&self) -> &str {
        self.names.first().map(|n| n.name.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityName {
    pub name: String,
    /// Language tag, only carried by multilingual card versions
    #[serde(default)]
    pub language: Option<String>,
}

/// Additional identifier of an entity, e.g. a VAT or trade register number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityIdentifier {
    pub scheme: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub contact_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Contact {
    pub fn is_empty(&self) -> bool {
        self.contact_type.is_none()
            && self.name.is_none()
            && self.phone.is_none()
            && self.email.is_none()
    }
}
