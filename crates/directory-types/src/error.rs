//! Error types for the business directory.

use thiserror::Error;

/// Unified error type for shared directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed identifier
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Rejection reasons for participant and document type identifiers.
///
/// These are input errors: they are reported to the caller and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("Identifier is missing the '::' separator: {0}")]
    MissingSeparator(String),

    #[error("Identifier scheme is empty")]
    EmptyScheme,

    #[error("Identifier value is empty")]
    EmptyValue,

    #[error("Invalid identifier scheme '{0}'")]
    InvalidScheme(String),

    #[error("Identifier value exceeds {max} characters (got {len})")]
    ValueTooLong { len: usize, max: usize },

    #[error("Identifier is not valid percent-encoded UTF-8: {0}")]
    InvalidEncoding(String),
}
