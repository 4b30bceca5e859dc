//! Tantivy schema for business directory documents.
//!
//! One index document per business entity. Structured fields are indexed as
//! raw strings for exact filtering; descriptive fields are tokenized. The
//! complete [`crate::StoredDocument`] is kept as a stored JSON payload so it
//! can be reconstructed from any index snapshot.

use tantivy::schema::{Field, Schema, FAST, INDEXED, STORED, STRING, TEXT};

use crate::SearchError;

pub const FIELD_PARTICIPANT_ID: &str = "participant_id";
pub const FIELD_ENTITY_INDEX: &str = "entity_index";
pub const FIELD_NAME: &str = "name";
pub const FIELD_COUNTRY_CODE: &str = "country_code";
pub const FIELD_GEO_INFO: &str = "geo_info";
pub const FIELD_IDENTIFIER_SCHEME: &str = "identifier_scheme";
pub const FIELD_IDENTIFIER_VALUE: &str = "identifier_value";
pub const FIELD_WEBSITE: &str = "website";
pub const FIELD_CONTACT: &str = "contact";
pub const FIELD_ADDITIONAL_INFO: &str = "additional_info";
pub const FIELD_REGISTRATION_DATE: &str = "registration_date";
pub const FIELD_DOC_TYPE_ID: &str = "doc_type_id";
pub const FIELD_OWNER_ID: &str = "owner_id";
pub const FIELD_DELETED: &str = "deleted";
pub const FIELD_FULLTEXT: &str = "fulltext";
pub const FIELD_PAYLOAD: &str = "payload";

/// Schema field handles for efficient access
#[derive(Debug, Clone)]
pub struct DirectorySchema {
    schema: Schema,
    /// Canonical participant identifier, the replace/tombstone key (STRING | STORED)
    pub participant_id: Field,
    /// Position of the entity within its business card (u64 | STORED | FAST)
    pub entity_index: Field,
    pub name: Field,
    /// Upper-case country code (STRING)
    pub country_code: Field,
    pub geo_info: Field,
    pub identifier_scheme: Field,
    pub identifier_value: Field,
    pub website: Field,
    pub contact: Field,
    pub additional_info: Field,
    /// ISO date (STRING)
    pub registration_date: Field,
    /// Canonical document type identifiers (STRING)
    pub doc_type_id: Field,
    pub owner_id: Field,
    /// Tombstone flag (bool, INDEXED | STORED)
    pub deleted: Field,
    /// Everything searchable without a field prefix (TEXT)
    pub fulltext: Field,
    /// JSON of the stored document (STORED only)
    pub payload: Field,
}

fn field(schema: &Schema, name: &str) -> Result<Field, SearchError> {
    schema
        .get_field(name)
        .map_err(|_| SearchError::SchemaMismatch(format!("missing {} field", name)))
}

impl DirectorySchema {
    /// Get the underlying Tantivy schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create a DirectorySchema from an existing Tantivy Schema
    pub fn from_schema(schema: Schema) -> Result<Self, SearchError> {
        Ok(Self {
            participant_id: field(&schema, FIELD_PARTICIPANT_ID)?,
            entity_index: field(&schema, FIELD_ENTITY_INDEX)?,
            name: field(&schema, FIELD_NAME)?,
            country_code: field(&schema, FIELD_COUNTRY_CODE)?,
            geo_info: field(&schema, FIELD_GEO_INFO)?,
            identifier_scheme: field(&schema, FIELD_IDENTIFIER_SCHEME)?,
            identifier_value: field(&schema, FIELD_IDENTIFIER_VALUE)?,
            website: field(&schema, FIELD_WEBSITE)?,
            contact: field(&schema, FIELD_CONTACT)?,
            additional_info: field(&schema, FIELD_ADDITIONAL_INFO)?,
            registration_date: field(&schema, FIELD_REGISTRATION_DATE)?,
            doc_type_id: field(&schema, FIELD_DOC_TYPE_ID)?,
            owner_id: field(&schema, FIELD_OWNER_ID)?,
            deleted: field(&schema, FIELD_DELETED)?,
            fulltext: field(&schema, FIELD_FULLTEXT)?,
            payload: field(&schema, FIELD_PAYLOAD)?,
            schema,
        })
    }
}

/// Build the directory schema.
pub fn build_directory_schema() -> DirectorySchema {
    let mut builder = Schema::builder();

    // Exact-match key for replace and tombstone
    let participant_id = builder.add_text_field(FIELD_PARTICIPANT_ID, STRING | STORED);
    let entity_index = builder.add_u64_field(FIELD_ENTITY_INDEX, INDEXED | STORED | FAST);

    let name = builder.add_text_field(FIELD_NAME, TEXT);
    let country_code = builder.add_text_field(FIELD_COUNTRY_CODE, STRING);
    let geo_info = builder.add_text_field(FIELD_GEO_INFO, TEXT);
    let identifier_scheme = builder.add_text_field(FIELD_IDENTIFIER_SCHEME, STRING);
    let identifier_value = builder.add_text_field(FIELD_IDENTIFIER_VALUE, STRING);
    let website = builder.add_text_field(FIELD_WEBSITE, STRING);
    let contact = builder.add_text_field(FIELD_CONTACT, TEXT);
    let additional_info = builder.add_text_field(FIELD_ADDITIONAL_INFO, TEXT);
    let registration_date = builder.add_text_field(FIELD_REGISTRATION_DATE, STRING);
    let doc_type_id = builder.add_text_field(FIELD_DOC_TYPE_ID, STRING);
    let owner_id = builder.add_text_field(FIELD_OWNER_ID, STRING);
    let deleted = builder.add_bool_field(FIELD_DELETED, INDEXED | STORED);
    let fulltext = builder.add_text_field(FIELD_FULLTEXT, TEXT);
    let payload = builder.add_text_field(FIELD_PAYLOAD, STORED);

    DirectorySchema {
        schema: builder.build(),
        participant_id,
        entity_index,
        name,
        country_code,
        geo_info,
        identifier_scheme,
        identifier_value,
        website,
        contact,
        additional_info,
        registration_date,
        doc_type_id,
        owner_id,
        deleted,
        fulltext,
        payload,
    }
}
