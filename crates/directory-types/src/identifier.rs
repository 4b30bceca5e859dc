//! Participant and document type identifiers.
//!
//! Both identifiers are `scheme::value` pairs. The canonical string form joins
//! scheme and value with `::`; the URI-encoded form percent-encodes the
//! canonical form so it can be used as a single URL path segment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IdentifierError;

/// Separator between scheme and value in the canonical form.
pub const SCHEME_SEPARATOR: &str = "::";

/// Default participant identifier scheme. Values in this scheme are case-insensitive.
pub const DEFAULT_PARTICIPANT_SCHEME: &str = "iso6523-actorid-upis";

/// Default document type identifier scheme.
pub const DEFAULT_DOCUMENT_TYPE_SCHEME: &str = "busdox-docid-qns";

const MAX_SCHEME_LEN: usize = 25;
const MAX_PARTICIPANT_VALUE_LEN: usize = 1050;
const MAX_DOCUMENT_TYPE_VALUE_LEN: usize = 500;

/// Identifies a participant of the registry network.
///
/// Primary correlation key across work items, ledger entries and stored
/// documents. Construct through [`ParticipantIdentifier::new`] or one of the
/// parse functions so the value is always validated and normalized;
/// deserialization goes through the same checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IdentifierParts")]
pub struct ParticipantIdentifier {
    scheme: String,
    value: String,
}

impl ParticipantIdentifier {
    /// Validate and normalize a scheme/value pair.
    pub fn new(scheme: &str, value: &str) -> Result<Self, IdentifierError> {
        let scheme = normalize_scheme(scheme)?;
        let value = value.trim();
        if value.is_empty() {
            return Err(IdentifierError::EmptyValue);
        }
        let len = value.chars().count();
        if len > MAX_PARTICIPANT_VALUE_LEN {
            return Err(IdentifierError::ValueTooLong {
                len,
                max: MAX_PARTICIPANT_VALUE_LEN,
            });
        }
        let value = if scheme == DEFAULT_PARTICIPANT_SCHEME {
            value.to_lowercase()
        } else {
            value.to_string()
        };
        Ok(Self { scheme, value })
    }

    /// Create an identifier in the default `iso6523-actorid-upis` scheme.
    pub fn with_default_scheme(value: &str) -> Result<Self, IdentifierError> {
        Self::new(DEFAULT_PARTICIPANT_SCHEME, value)
    }

    /// Parse the canonical `scheme::value` form.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let (scheme, value) = split_identifier(s)?;
        Self::new(scheme, value)
    }

    /// Parse a percent-encoded canonical form, as received in a URL path.
    pub fn parse_uri_encoded(s: &str) -> Result<Self, IdentifierError> {
        let decoded = urlencoding::decode(s)
            .map_err(|e| IdentifierError::InvalidEncoding(e.to_string()))?;
        Self::parse(&decoded)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Canonical `scheme::value` form, not percent-encoded. Used as the index key.
    pub fn canonical_string(&self) -> String {
        format!("{}{}{}", self.scheme, SCHEME_SEPARATOR, self.value)
    }

    /// Percent-encoded canonical form, safe for a single URL path segment.
    pub fn uri_encoded(&self) -> String {
        urlencoding::encode(&self.canonical_string()).into_owned()
    }
}

impl fmt::Display for ParticipantIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.scheme, SCHEME_SEPARATOR, self.value)
    }
}

/// Identifies a document type a participant can receive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "IdentifierParts")]
pub struct DocumentTypeIdentifier {
    scheme: String,
    value: String,
}

impl DocumentTypeIdentifier {
    pub fn new(scheme: &str, value: &str) -> Result<Self, IdentifierError> {
        let scheme = normalize_scheme(scheme)?;
        let value = value.trim();
        if value.is_empty() {
            return Err(IdentifierError::EmptyValue);
        }
        let len = value.chars().count();
        if len > MAX_DOCUMENT_TYPE_VALUE_LEN {
            return Err(IdentifierError::ValueTooLong {
                len,
                max: MAX_DOCUMENT_TYPE_VALUE_LEN,
            });
        }
        Ok(Self {
            scheme,
            value: value.to_string(),
        })
    }

    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let (scheme, value) = split_identifier(s)?;
        Self::new(scheme, value)
    }

    pub fn parse_uri_encoded(s: &str) -> Result<Self, IdentifierError> {
        let decoded = urlencoding::decode(s)
            .map_err(|e| IdentifierError::InvalidEncoding(e.to_string()))?;
        Self::parse(&decoded)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Canonical `scheme::value` form, not percent-encoded.
    pub fn canonical_string(&self) -> String {
        format!("{}{}{}", self.scheme, SCHEME_SEPARATOR, self.value)
    }
}

impl fmt::Display for DocumentTypeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.scheme, SCHEME_SEPARATOR, self.value)
    }
}

/// Serialized shape of both identifier types, checked on the way in.
#[derive(Deserialize)]
struct IdentifierParts {
    scheme: String,
    value: String,
}

impl TryFrom<IdentifierParts> for ParticipantIdentifier {
    type Error = IdentifierError;

    fn try_from(parts: IdentifierParts) -> Result<Self, Self::Error> {
        Self::new(&parts.scheme, &parts.value)
    }
}

impl TryFrom<IdentifierParts> for DocumentTypeIdentifier {
    type Error = IdentifierError;

    fn try_from(parts: IdentifierParts) -> Result<Self, Self::Error> {
        Self::new(&parts.scheme, &parts.value)
    }
}

fn split_identifier(s: &str) -> Result<(&str, &str), IdentifierError> {
    s.trim()
        .split_once(SCHEME_SEPARATOR)
        .ok_or_else(|| IdentifierError::MissingSeparator(s.to_string()))
}

/// Schemes are case-insensitive; store them lower-cased.
fn normalize_scheme(scheme: &str) -> Result<String, IdentifierError> {
    let scheme = scheme.trim().to_ascii_lowercase();
    if scheme.is_empty() {
        return Err(IdentifierError::EmptyScheme);
    }
    let valid_chars = scheme
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if scheme.len() > MAX_SCHEME_LEN || !valid_chars {
        return Err(IdentifierError::InvalidScheme(scheme));
    }
    Ok(scheme)
}
