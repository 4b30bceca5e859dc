//! Search error types.

use thiserror::Error;

use crate::query::QuerySyntaxError;

/// Errors that can occur in the document store.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// User query could not be parsed
    #[error(transparent)]
    QuerySyntax(#[from] QuerySyntaxError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored payload could not be read back
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Writer lock poisoned
    #[error("Index is locked: {0}")]
    IndexLocked(String),
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}
