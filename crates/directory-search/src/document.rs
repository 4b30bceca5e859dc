//! Document mapping between business entities and Tantivy documents.

use chrono::{DateTime, Utc};
use directory_businesscard::BusinessEntity;
use directory_types::{DocumentTypeIdentifier, ParticipantIdentifier};
use serde::{Deserialize, Serialize};
use tantivy::schema::Value;
use tantivy::TantivyDocument;

use crate::error::SearchError;
use crate::schema::DirectorySchema;

/// Who requested a change and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub created_at: DateTime<Utc>,
    pub owner_id: String,
    pub requesting_host: String,
}

impl DocumentMetadata {
    pub fn new(owner_id: impl Into<String>, requesting_host: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            owner_id: owner_id.into(),
            requesting_host: requesting_host.into(),
        }
    }
}

/// Index-resident projection of one business entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub participant: ParticipantIdentifier,
    /// Position of the entity within its business card
    pub entity_index: u64,
    pub entity: BusinessEntity,
    #[serde(default)]
    pub document_types: Vec<DocumentTypeIdentifier>,
    /// Tombstone flag
    #[serde(default)]
    pub deleted: bool,
    pub metadata: DocumentMetadata,
    /// Set when the document was tombstoned
    #[serde(default)]
    pub deletion: Option<DocumentMetadata>,
}

impl StoredDocument {
    /// Copy of this document marked as deleted. All other fields are kept.
    pub fn tombstoned(&self, deletion: &DocumentMetadata) -> Self {
        let mut doc = self.clone();
        doc.deleted = true;
        doc.deletion = Some(deletion.clone());
        doc
    }

    pub fn to_tantivy(&self, schema: &DirectorySchema) -> Result<TantivyDocument, SearchError> {
        let entity = &self.entity;
        let mut doc = TantivyDocument::default();
        let mut fulltext: Vec<&str> = vec![self.participant.value(), entity.country_code.as_str()];

        doc.add_text(schema.participant_id, self.participant.canonical_string());
        doc.add_u64(schema.entity_index, self.entity_index);
        doc.add_text(schema.country_code, &entity.country_code);
        doc.add_bool(schema.deleted, self.deleted);
        doc.add_text(schema.owner_id, &self.metadata.owner_id);

        for name in &entity.names {
            doc.add_text(schema.name, &name.name);
            fulltext.push(&name.name);
        }
        if let Some(geo) = &entity.geographical_information {
            doc.add_text(schema.geo_info, geo);
            fulltext.push(geo);
        }
        for identifier in &entity.identifiers {
            doc.add_text(schema.identifier_scheme, &identifier.scheme);
            doc.add_text(schema.identifier_value, &identifier.value);
            fulltext.push(&identifier.value);
        }
        for uri in &entity.website_uris {
            doc.add_text(schema.website, uri);
            fulltext.push(uri);
        }
        for contact in &entity.contacts {
            for value in [&contact.contact_type, &contact.name, &contact.phone, &contact.email]
                .into_iter()
                .flatten()
            {
                doc.add_text(schema.contact, value);
                fulltext.push(value);
            }
        }
        if let Some(info) = &entity.additional_information {
            doc.add_text(schema.additional_info, info);
            fulltext.push(info);
        }
        if let Some(date) = entity.registration_date {
            doc.add_text(schema.registration_date, date.format("%Y-%m-%d").to_string());
        }
        for doc_type in &self.document_types {
            doc.add_text(schema.doc_type_id, doc_type.canonical_string());
        }

        doc.add_text(schema.fulltext, fulltext.join(" "));
        doc.add_text(schema.payload, serde_json::to_string(self)?);
        Ok(doc)
    }

    pub fn from_tantivy(
        schema: &DirectorySchema,
        doc: &TantivyDocument,
    ) -> Result<Self, SearchError> {
        let payload = doc
            .get_first(schema.payload)
            .and_then(|v| v.as_str())
            .ok_or_else(|| SearchError::Serialization("document has no payload".to_string()))?;
        Ok(serde_json::from_str(payload)?)
    }
}
