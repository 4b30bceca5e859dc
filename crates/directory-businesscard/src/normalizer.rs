//! Business card normalizer.
//!
//! Tries every supported schema version, newest first. A version that fails
//! structurally hands over to the next one; a version that reads the document
//! but rejects its content ends the search with no result.

use encoding_rs::mem::decode_latin1;
use encoding_rs::UTF_8;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::NormalizedBusinessCard;
use crate::promote::{promote, PromotionError};
use crate::schema::{CardVersion, StructureError};
use crate::xml::{XmlElement, XmlError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("Unsupported charset '{0}'")]
    UnsupportedCharset(String),

    #[error("Payload is not valid {charset}")]
    Undecodable { charset: &'static str },

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("No schema version matched")]
    NoMatchingVersion(Vec<(CardVersion, StructureError)>),

    #[error("Card matched {version} but was rejected: {source}")]
    Rejected {
        version: CardVersion,
        source: PromotionError,
    },
}

/// Converts raw business card payloads into [`NormalizedBusinessCard`]s.
#[derive(Debug, Clone)]
pub struct BusinessCardNormalizer {
    chain: Vec<CardVersion>,
}

impl Default for BusinessCardNormalizer {
    fn default() -> Self {
        Self {
            chain: CardVersion::PRIORITY.to_vec(),
        }
    }
}

impl BusinessCardNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom version order.
    pub fn with_chain(chain: Vec<CardVersion>) -> Self {
        Self { chain }
    }

    /// Decode and normalize a payload. `None` means there is nothing to index.
    pub fn parse(&self, bytes: &[u8], charset: Option<&str>) -> Option<NormalizedBusinessCard> {
        match self.normalize_bytes(bytes, charset) {
            Ok((version, card)) => {
                debug!(%version, participant = %card.participant, entities = card.entities.len(), "Normalized business card");
                Some(card)
            }
            Err(e) => {
                warn!(error = %e, "Business card could not be normalized");
                None
            }
        }
    }

    /// Normalize an already parsed document.
    pub fn parse_element(&self, root: &XmlElement) -> Option<NormalizedBusinessCard> {
        match self.normalize(root) {
            Ok((_, card)) => Some(card),
            Err(e) => {
                warn!(error = %e, "Business card could not be normalized");
                None
            }
        }
    }

    pub fn normalize_bytes(
        &self,
        bytes: &[u8],
        charset: Option<&str>,
    ) -> Result<(CardVersion, NormalizedBusinessCard), NormalizeError> {
        let text = decode(bytes, charset)?;
        let root = XmlElement::parse(&text)?;
        self.normalize(&root)
    }

    /// Run the version chain over `root` and report which version matched.
    pub fn normalize(
        &self,
        root: &XmlElement,
    ) -> Result<(CardVersion, NormalizedBusinessCard), NormalizeError> {
        let mut mismatches = Vec::with_capacity(self.chain.len());
        for version in &self.chain {
            match version.read(root) {
                Ok(raw) => {
                    return promote(raw)
                        .map(|card| (*version, card))
                        .map_err(|source| NormalizeError::Rejected {
                            version: *version,
                            source,
                        });
                }
                Err(e) => {
                    debug!(%version, error = %e, "Business card does not match schema version");
                    mismatches.push((*version, e));
                }
            }
        }
        Err(NormalizeError::NoMatchingVersion(mismatches))
    }
}

/// Decode the payload into text. UTF-8 unless told otherwise.
fn decode(bytes: &[u8], charset: Option<&str>) -> Result<String, NormalizeError> {
    let charset = charset
        .map(|c| c.trim().to_ascii_lowercase())
        .unwrap_or_else(|| "utf-8".to_string());
    match charset.as_str() {
        "utf-8" | "utf8" => match UTF_8.decode_with_bom_removal(bytes) {
            (_, true) => Err(NormalizeError::Undecodable { charset: "UTF-8" }),
            (text, false) => Ok(text.into_owned()),
        },
        "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Ok(decode_latin1(bytes).into_owned()),
        // ASCII is the Latin-1 subset below 0x80
        "us-ascii" | "ascii" if bytes.is_ascii() => Ok(decode_latin1(bytes).into_owned()),
        "us-ascii" | "ascii" => Err(NormalizeError::Undecodable { charset: "US-ASCII" }),
        other => Err(NormalizeError::UnsupportedCharset(other.to_string())),
    }
}
