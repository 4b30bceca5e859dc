//! RocksDB wrapper for indexer state.
//!
//! Provides:
//! - Database open/close with column family setup
//! - Typed put/get/delete/list for pending items, ledger and dead letters
//! - Atomic moves between column families via write batches

use std::path::Path;

use directory_types::{DeadLetterEntry, RetryLedgerEntry, WorkItem};
use rocksdb::{ColumnFamily, IteratorMode, Options, WriteBatch, DB};
use tracing::{debug, info};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_DEAD_LETTER, CF_PENDING_ITEMS, CF_RETRY_LEDGER,
};
use crate::error::StorageError;
use crate::keys::{RecordKey, RecordKind};

/// Main storage interface for the indexer
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(2);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::MissingColumnFamily(name.to_string()))
    }

    fn put_record(
        &self,
        cf_name: &str,
        key: &RecordKey,
        value: &[u8],
    ) -> Result<(), StorageError> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key.to_bytes(), value)?;
        Ok(())
    }

    fn get_record(&self, cf_name: &str, key: &RecordKey) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(cf_name)?;
        Ok(self.db.get_cf(cf, key.to_bytes())?)
    }

    fn delete_record(&self, cf_name: &str, key: &RecordKey) -> Result<(), StorageError> {
        let cf = self.cf(cf_name)?;
        self.db.delete_cf(cf, key.to_bytes())?;
        Ok(())
    }

    /// All values of a column family, oldest first.
    fn scan(&self, cf_name: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            values.push(value.to_vec());
        }
        Ok(values)
    }

    // ==================== Pending Queue ====================

    /// Persist a queued work item until it has been processed.
    pub fn put_pending(&self, item: &WorkItem) -> Result<(), StorageError> {
        let key = RecordKey::from_id(RecordKind::Pending, &item.id)?;
        self.put_record(CF_PENDING_ITEMS, &key, &item.to_bytes()?)?;
        debug!(item_id = %item.id, "Stored pending work item");
        Ok(())
    }

    pub fn delete_pending(&self, item_id: &str) -> Result<(), StorageError> {
        let key = RecordKey::from_id(RecordKind::Pending, item_id)?;
        self.delete_record(CF_PENDING_ITEMS, &key)
    }

    /// Pending work items in the order they were created.
    pub fn get_pending_items(&self) -> Result<Vec<WorkItem>, StorageError> {
        self.scan(CF_PENDING_ITEMS)?
            .iter()
            .map(|bytes| WorkItem::from_bytes(bytes).map_err(StorageError::from))
            .collect()
    }

    // ==================== Retry Ledger ====================

    /// Create or update a ledger entry.
    pub fn put_ledger_entry(&self, entry: &RetryLedgerEntry) -> Result<(), StorageError> {
        let key = RecordKey::from_id(RecordKind::Ledger, &entry.id)?;
        self.put_record(CF_RETRY_LEDGER, &key, &entry.to_bytes()?)
    }

    pub fn get_ledger_entry(&self, id: &str) -> Result<Option<RetryLedgerEntry>, StorageError> {
        let key = RecordKey::from_id(RecordKind::Ledger, id)?;
        self.get_record(CF_RETRY_LEDGER, &key)?
            .map(|bytes| RetryLedgerEntry::from_bytes(&bytes).map_err(StorageError::from))
            .transpose()
    }

    pub fn delete_ledger_entry(&self, id: &str) -> Result<(), StorageError> {
        let key = RecordKey::from_id(RecordKind::Ledger, id)?;
        self.delete_record(CF_RETRY_LEDGER, &key)
    }

    pub fn get_ledger_entries(&self) -> Result<Vec<RetryLedgerEntry>, StorageError> {
        self.scan(CF_RETRY_LEDGER)?
            .iter()
            .map(|bytes| RetryLedgerEntry::from_bytes(bytes).map_err(StorageError::from))
            .collect()
    }

    /// Atomically replace ledger entry `old_id` with `entry`.
    pub fn replace_ledger_entry(
        &self,
        old_id: &str,
        entry: &RetryLedgerEntry,
    ) -> Result<(), StorageError> {
        let cf = self.cf(CF_RETRY_LEDGER)?;
        let old_key = RecordKey::from_id(RecordKind::Ledger, old_id)?;
        let new_key = RecordKey::from_id(RecordKind::Ledger, &entry.id)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(cf, old_key.to_bytes());
        batch.put_cf(cf, new_key.to_bytes(), entry.to_bytes()?);
        self.db.write(batch)?;
        Ok(())
    }

    // ==================== Dead Letters ====================

    /// Atomically move an expired ledger entry into the dead-letter list.
    pub fn move_to_dead_letter(&self, dead: &DeadLetterEntry) -> Result<(), StorageError> {
        let ledger_cf = self.cf(CF_RETRY_LEDGER)?;
        let dead_cf = self.cf(CF_DEAD_LETTER)?;
        let ledger_key = RecordKey::from_id(RecordKind::Ledger, dead.id())?;
        let dead_key = RecordKey::from_id(RecordKind::DeadLetter, dead.id())?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(ledger_cf, ledger_key.to_bytes());
        batch.put_cf(dead_cf, dead_key.to_bytes(), dead.to_bytes()?);
        self.db.write(batch)?;
        debug!(entry_id = %dead.id(), "Moved ledger entry to dead letters");
        Ok(())
    }

    pub fn get_dead_letter(&self, id: &str) -> Result<Option<DeadLetterEntry>, StorageError> {
        let key = RecordKey::from_id(RecordKind::DeadLetter, id)?;
        self.get_record(CF_DEAD_LETTER, &key)?
            .map(|bytes| DeadLetterEntry::from_bytes(&bytes).map_err(StorageError::from))
            .transpose()
    }

    pub fn delete_dead_letter(&self, id: &str) -> Result<(), StorageError> {
        let key = RecordKey::from_id(RecordKind::DeadLetter, id)?;
        self.delete_record(CF_DEAD_LETTER, &key)
    }

    pub fn get_dead_letters(&self) -> Result<Vec<DeadLetterEntry>, StorageError> {
        self.scan(CF_DEAD_LETTER)?
            .iter()
            .map(|bytes| DeadLetterEntry::from_bytes(bytes).map_err(StorageError::from))
            .collect()
    }

    // ===== Admin Operations =====

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            pending_count: self.count_cf_entries(CF_PENDING_ITEMS)?,
            ledger_count: self.count_cf_entries(CF_RETRY_LEDGER)?,
            dead_letter_count: self.count_cf_entries(CF_DEAD_LETTER)?,
            disk_usage_bytes: self.get_disk_usage(),
        })
    }

    fn count_cf_entries(&self, cf_name: &str) -> Result<u64, StorageError> {
        let cf = self.cf(cf_name)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> u64 {
        std::fs::read_dir(self.db.path())
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|entry| entry.metadata().ok())
                    .map(|metadata| metadata.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}

/// Statistics about the storage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Work items queued but not yet processed
    pub pending_count: u64,
    /// Failed work items awaiting retry
    pub ledger_count: u64,
    /// Expired ledger entries
    pub dead_letter_count: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}
