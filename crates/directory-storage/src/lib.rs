//! Storage layer for the business directory indexer.
//!
//! Provides RocksDB-backed persistence for everything the indexer must not
//! lose across restarts:
//! - Pending work items (queued but not yet processed)
//! - Retry ledger entries
//! - Dead-letter entries (expired ledger entries)
//!
//! Each record type lives in its own column family, keyed by its monotonic
//! ULID record id so that iteration returns records in creation order.

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
pub use keys::{RecordKey, RecordKind};
