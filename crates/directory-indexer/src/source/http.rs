//! HTTP metadata source.
//!
//! Two requests per participant:
//! - `GET {base}/{participant}` returns the service group, whose
//!   `ServiceMetadataReference/@href` values end in the document type ids
//! - `GET {base}/businesscard/{participant}` returns the business card
//!
//! Participant ids are sent URI-encoded.

use std::time::Duration;

use async_trait::async_trait;
use directory_businesscard::XmlElement;
use directory_types::{DocumentTypeIdentifier, MetadataSourceSettings, ParticipantIdentifier};
use reqwest::{header, Client, Response, StatusCode};
use tracing::{debug, warn};

use super::{FetchError, FetchedBusinessCard, MetadataSource};

const SERVICE_METADATA_REFERENCE: &str = "ServiceMetadataReference";
const SERVICES_PATH: &str = "/services/";

/// Fetches participant metadata from an HTTP publisher.
pub struct HttpMetadataSource {
    client: Client,
    base_url: String,
}

impl HttpMetadataSource {
    /// Create a new source. `timeout` bounds every single request.
    pub fn new(settings: &MetadataSourceSettings, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Transient(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, url: &str) -> Result<Response, FetchError> {
        debug!(url, "Fetching metadata");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(FetchError::NotFound),
            status if status.is_success() => Ok(response),
            status => Err(FetchError::Transient(format!("HTTP {} from {}", status, url))),
        }
    }

    async fn fetch_document_types(
        &self,
        participant: &ParticipantIdentifier,
    ) -> Result<Vec<DocumentTypeIdentifier>, FetchError> {
        let url = format!("{}/{}", self.base_url, participant.uri_encoded());
        let body = self
            .get(&url)
            .await?
            .text()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let root = XmlElement::parse(&body)
            .map_err(|e| FetchError::Transient(format!("unreadable service group: {}", e)))?;
        Ok(document_types_of(&root))
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn fetch_business_card(
        &self,
        participant: &ParticipantIdentifier,
    ) -> Result<FetchedBusinessCard, FetchError> {
        let document_types = self.fetch_document_types(participant).await?;

        let url = format!("{}/businesscard/{}", self.base_url, participant.uri_encoded());
        let response = self.get(&url).await?;
        let charset = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(charset_of);
        let payload = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?
            .to_vec();

        Ok(FetchedBusinessCard {
            payload,
            charset,
            document_types,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Extract the `charset` parameter of a content type.
fn charset_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

/// Document types referenced anywhere in a service group.
fn document_types_of(root: &XmlElement) -> Vec<DocumentTypeIdentifier> {
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(element) = stack.pop() {
        if element.name == SERVICE_METADATA_REFERENCE {
            if let Some(href) = element.attribute("href") {
                match document_type_from_href(href) {
                    Some(doc_type) => found.push(doc_type),
                    None => warn!(href, "Ignoring unreadable service metadata reference"),
                }
            }
        }
        stack.extend(element.children.iter().rev());
    }
    found
}

fn document_type_from_href(href: &str) -> Option<DocumentTypeIdentifier> {
    let encoded = match href.rfind(SERVICES_PATH) {
        Some(pos) => &href[pos + SERVICES_PATH.len()..],
        None => href.rsplit('/').next()?,
    };
    DocumentTypeIdentifier::parse_uri_encoded(encoded.trim_end_matches('/')).ok()
}
