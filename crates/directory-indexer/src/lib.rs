//! # directory-indexer
//!
//! Indexing pipeline of the business directory.
//!
//! Requests become work items. The [`IndexerManager`] deduplicates them by
//! participant and action, fetches the business card from a
//! [`MetadataSource`], normalizes it and writes the result to the document
//! store. Failed items are kept in a durable retry ledger that a periodic
//! sweep retries or expires.
//!
//! [`DirectoryService`] is the transport-agnostic entry point.

pub mod error;
pub mod ledger;
pub mod manager;
pub mod service;
pub mod source;

pub use error::IndexerError;
pub use ledger::{RetryLedger, RetryPolicy};
pub use manager::{IndexerConfig, IndexerManager, ProcessOutcome, QueueResult, SweepStats};
pub use service::{DirectoryService, RequestStatus};
pub use source::{
    FetchError, FetchedBusinessCard, HttpMetadataSource, MetadataSource, MockMetadataSource,
    MockResponse,
};
