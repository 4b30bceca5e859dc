//! # directory-types
//!
//! Shared domain types for the business directory indexer.
//!
//! This crate defines the core data structures used throughout the system:
//! - Identifiers: participant and document type identifiers
//! - Work items: requested indexing actions with their dedup key
//! - Retry ledger entries: failed work items awaiting retry or expiry
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use directory_types::{ActionType, ParticipantIdentifier, WorkItem};
//!
//! let pid = ParticipantIdentifier::parse("iso6523-actorid-upis::9915:test").unwrap();
//! let item = WorkItem::new(pid, ActionType::CreateOrUpdate, "owner", "127.0.0.1");
//! assert_eq!(item.dedup_key().action, ActionType::CreateOrUpdate);
//! ```

pub mod config;
pub mod error;
pub mod identifier;
pub mod record_id;
pub mod retry;
pub mod work_item;

pub use config::{IndexerSettings, MetadataSourceSettings, SchedulerSettings, Settings};
pub use error::{DirectoryError, IdentifierError};
pub use identifier::{DocumentTypeIdentifier, ParticipantIdentifier};
pub use record_id::next_record_id;
pub use retry::{DeadLetterEntry, RetryLedgerEntry};
pub use work_item::{ActionType, DedupKey, WorkItem};
