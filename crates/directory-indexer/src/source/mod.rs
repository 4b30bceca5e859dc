//! Metadata sources: where business cards and document types come from.
//!
//! The indexer only talks to the [`MetadataSource`] trait. The production
//! implementation fetches over HTTP; the mock is for tests.

mod http;
mod mock;

pub use http::HttpMetadataSource;
pub use mock::{MockMetadataSource, MockResponse};

use async_trait::async_trait;
use directory_types::{DocumentTypeIdentifier, ParticipantIdentifier};
use thiserror::Error;

/// Error type for metadata fetches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The participant is not registered upstream
    #[error("Participant not found")]
    NotFound,

    /// Anything that may succeed on a later attempt
    #[error("Transient fetch failure: {0}")]
    Transient(String),
}

/// Raw business card plus the participant's document types.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchedBusinessCard {
    pub payload: Vec<u8>,
    /// Charset announced by the source, UTF-8 when absent
    pub charset: Option<String>,
    pub document_types: Vec<DocumentTypeIdentifier>,
}

/// Source of authoritative participant metadata.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch the business card and supported document types of a participant.
    async fn fetch_business_card(
        &self,
        participant: &ParticipantIdentifier,
    ) -> Result<FetchedBusinessCard, FetchError>;

    /// Source name for logging
    fn name(&self) -> &str;
}
