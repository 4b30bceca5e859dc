//! Error types for the indexing pipeline.

use directory_search::SearchError;
use directory_storage::StorageError;
use directory_types::IdentifierError;
use thiserror::Error;

use crate::source::FetchError;

/// Errors that can occur in the indexing pipeline
#[derive(Error, Debug)]
pub enum IndexerError {
    /// Persistence of the pending queue or retry ledger failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Document store operation failed
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Metadata could not be fetched
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Metadata fetch exceeded the configured timeout
    #[error("Fetch timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Malformed identifier supplied by a caller
    #[error("Invalid identifier: {0}")]
    Identifier(#[from] IdentifierError),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Request rejected before anything was queued
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Settings that cannot be turned into a runtime configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The manager no longer accepts work
    #[error("Indexer is shutting down")]
    Shutdown,

    /// A blocking task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(String),
}

impl From<serde_json::Error> for IndexerError {
    fn from(err: serde_json::Error) -> Self {
        IndexerError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for IndexerError {
    fn from(err: tokio::task::JoinError) -> Self {
        IndexerError::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexerError::Timeout(std::time::Duration::from_secs(30));
        assert_eq!(err.to_string(), "Fetch timed out after 30s");

        let err = IndexerError::Fetch(FetchError::Transient("connection refused".to_string()));
        assert_eq!(
            err.to_string(),
            "Fetch error: Transient fetch failure: connection refused"
        );
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: IndexerError = json_err.into();
        assert!(matches!(err, IndexerError::Serialization(_)));
    }
}
