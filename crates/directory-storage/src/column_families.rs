//! Column family definitions for RocksDB.
//!
//! - pending_items: work items accepted but not yet processed
//! - retry_ledger: failed work items awaiting retry
//! - dead_letter: ledger entries that ran out of retry time

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for queued work items
pub const CF_PENDING_ITEMS: &str = "pending_items";

/// Column family name for retry ledger entries
pub const CF_RETRY_LEDGER: &str = "retry_ledger";

/// Column family name for expired ledger entries
pub const CF_DEAD_LETTER: &str = "dead_letter";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_PENDING_ITEMS, CF_RETRY_LEDGER, CF_DEAD_LETTER];

/// Dead letters are rarely read and only grow; compress them.
fn dead_letter_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_PENDING_ITEMS, Options::default()),
        ColumnFamilyDescriptor::new(CF_RETRY_LEDGER, Options::default()),
        ColumnFamilyDescriptor::new(CF_DEAD_LETTER, dead_letter_options()),
    ]
}
