//! Mock metadata source for testing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use directory_types::{DocumentTypeIdentifier, ParticipantIdentifier};

use super::{FetchError, FetchedBusinessCard, MetadataSource};

/// Scripted answer of the mock for one participant.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Card(FetchedBusinessCard),
    NotFound,
    Transient(String),
    /// Answer after sleeping, to exercise timeouts and in-flight dedup
    Delayed(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// A UTF-8 card payload without document types.
    pub fn card(xml: &str) -> Self {
        Self::card_with_document_types(xml, Vec::new())
    }

    pub fn card_with_document_types(
        xml: &str,
        document_types: Vec<DocumentTypeIdentifier>,
    ) -> Self {
        MockResponse::Card(FetchedBusinessCard {
            payload: xml.as_bytes().to_vec(),
            charset: None,
            document_types,
        })
    }
}

/// In-memory metadata source.
///
/// Participants without a scripted response are reported as not found.
#[derive(Default)]
pub struct MockMetadataSource {
    responses: Mutex<HashMap<ParticipantIdentifier, MockResponse>>,
    calls: Mutex<HashMap<ParticipantIdentifier, usize>>,
    call_order: Mutex<Vec<ParticipantIdentifier>>,
}

impl MockMetadataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the response for a participant, replacing any earlier one.
    pub fn set_response(&self, participant: &ParticipantIdentifier, response: MockResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(participant.clone(), response);
        }
    }

    /// Number of fetches made for a participant.
    pub fn calls_for(&self, participant: &ParticipantIdentifier) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(participant).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Participants in the order they were fetched.
    pub fn call_order(&self) -> Vec<ParticipantIdentifier> {
        self.call_order
            .lock()
            .map(|order| order.clone())
            .unwrap_or_default()
    }

    /// Number of fetches made in total.
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MetadataSource for MockMetadataSource {
    async fn fetch_business_card(
        &self,
        participant: &ParticipantIdentifier,
    ) -> Result<FetchedBusinessCard, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(participant.clone()).or_insert(0) += 1;
        }
        if let Ok(mut order) = self.call_order.lock() {
            order.push(participant.clone());
        }
        let mut response = self
            .responses
            .lock()
            .ok()
            .and_then(|responses| responses.get(participant).cloned())
            .unwrap_or(MockResponse::NotFound);

        loop {
            match response {
                MockResponse::Card(card) => return Ok(card),
                MockResponse::NotFound => return Err(FetchError::NotFound),
                MockResponse::Transient(message) => return Err(FetchError::Transient(message)),
                MockResponse::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_participant_is_not_found() {
        let source = MockMetadataSource::new();
        let pid = ParticipantIdentifier::with_default_scheme("9915:unknown").unwrap();
        assert_eq!(
            source.fetch_business_card(&pid).await,
            Err(FetchError::NotFound)
        );
        assert_eq!(source.calls_for(&pid), 1);
    }

    #[tokio::test]
    async fn test_scripted_responses() {
        let source = MockMetadataSource::new();
        let pid = ParticipantIdentifier::with_default_scheme("9915:test").unwrap();

        source.set_response(&pid, MockResponse::Transient("boom".to_string()));
        assert!(matches!(
            source.fetch_business_card(&pid).await,
            Err(FetchError::Transient(_))
        ));

        source.set_response(
            &pid,
            MockResponse::Delayed(Duration::from_millis(5), Box::new(MockResponse::card("<x/>"))),
        );
        let card = source.fetch_business_card(&pid).await.unwrap();
        assert_eq!(card.payload, b"<x/>".to_vec());
        assert_eq!(source.total_calls(), 2);
    }
}
