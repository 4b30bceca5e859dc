//! Retry ledger: durable record of failed work items.
//!
//! Every mutation is written to storage first and applied to the in-memory
//! view only after the write succeeded, so the view never runs ahead of what
//! a restart would recover.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use directory_storage::Storage;
use directory_types::{DeadLetterEntry, DedupKey, RetryLedgerEntry, WorkItem};
use tracing::{debug, info};

use crate::error::IndexerError;

/// Fixed-interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts
    pub retry_interval: Duration,
    /// Retry window, counted from work item creation
    pub max_retry_window: Duration,
}

impl RetryPolicy {
    /// Fails when a value does not fit into a `chrono::Duration`.
    pub fn new(retry_interval_minutes: u64, max_retry_hours: u64) -> Result<Self, IndexerError> {
        let retry_interval = i64::try_from(retry_interval_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .ok_or_else(|| {
                IndexerError::Config(format!(
                    "retry_interval_minutes out of range: {}",
                    retry_interval_minutes
                ))
            })?;
        let max_retry_window = i64::try_from(max_retry_hours)
            .ok()
            .and_then(Duration::try_hours)
            .ok_or_else(|| {
                IndexerError::Config(format!("max_retry_hours out of range: {}", max_retry_hours))
            })?;
        Ok(Self {
            retry_interval,
            max_retry_window,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_interval: Duration::minutes(5),
            max_retry_window: Duration::hours(24),
        }
    }
}

pub struct RetryLedger {
    storage: Arc<Storage>,
    policy: RetryPolicy,
    /// Entries by id; record ids are monotonic, so this is creation order
    entries: BTreeMap<String, RetryLedgerEntry>,
    by_key: HashMap<DedupKey, String>,
}

impl RetryLedger {
    /// Load all persisted entries.
    pub fn load(storage: Arc<Storage>, policy: RetryPolicy) -> Result<Self, IndexerError> {
        let mut ledger = Self {
            storage,
            policy,
            entries: BTreeMap::new(),
            by_key: HashMap::new(),
        };
        for entry in ledger.storage.get_ledger_entries()? {
            ledger.insert(entry);
        }
        info!(entries = ledger.entries.len(), "Loaded retry ledger");
        Ok(ledger)
    }

    fn insert(&mut self, entry: RetryLedgerEntry) {
        let key = entry.work_item.dedup_key();
        if let Some(old_id) = self.by_key.insert(key, entry.id.clone()) {
            self.entries.remove(&old_id);
        }
        self.entries.insert(entry.id.clone(), entry);
    }

    fn forget(&mut self, id: &str) -> Option<RetryLedgerEntry> {
        let entry = self.entries.remove(id)?;
        let key = entry.work_item.dedup_key();
        if self.by_key.get(&key).map(String::as_str) == Some(id) {
            self.by_key.remove(&key);
        }
        Some(entry)
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Record the failed initial attempt of `item`.
    ///
    /// An existing entry with the same dedup key is superseded.
    pub fn record_failure(
        &mut self,
        item: WorkItem,
        now: DateTime<Utc>,
    ) -> Result<RetryLedgerEntry, IndexerError> {
        let entry = RetryLedgerEntry::new(
            item,
            self.policy.max_retry_window,
            self.policy.retry_interval,
            now,
        );
        let key = entry.work_item.dedup_key();

        match self.by_key.get(&key) {
            Some(old_id) => {
                self.storage.replace_ledger_entry(old_id, &entry)?;
                debug!(old_id = %old_id, entry_id = %entry.id, "Superseded ledger entry");
            }
            None => self.storage.put_ledger_entry(&entry)?,
        }
        self.insert(entry.clone());
        Ok(entry)
    }

    /// Record a failed retry of entry `id` made at `now`.
    pub fn record_failed_retry(
        &mut self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RetryLedgerEntry>, IndexerError> {
        let Some(current) = self.entries.get(id) else {
            return Ok(None);
        };
        let mut updated = current.clone();
        updated.record_failed_retry(now, self.policy.retry_interval);
        self.storage.put_ledger_entry(&updated)?;
        self.entries.insert(id.to_string(), updated.clone());
        Ok(Some(updated))
    }

    /// Remove entry `id`, e.g. after a successful retry.
    pub fn remove(&mut self, id: &str) -> Result<Option<RetryLedgerEntry>, IndexerError> {
        if !self.entries.contains_key(id) {
            return Ok(None);
        }
        self.storage.delete_ledger_entry(id)?;
        Ok(self.forget(id))
    }

    /// Move every entry expired at `now` into the dead-letter list.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<Vec<DeadLetterEntry>, IndexerError> {
        let expired_ids: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.id.clone())
            .collect();

        let mut dead = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            let dead_letter = DeadLetterEntry::new(entry.clone(), now);
            self.storage.move_to_dead_letter(&dead_letter)?;
            self.forget(&id);
            dead.push(dead_letter);
        }
        Ok(dead)
    }

    /// Non-expired entries whose next retry is due at `now`, oldest first.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<RetryLedgerEntry> {
        self.entries
            .values()
            .filter(|entry| !entry.is_expired(now) && entry.is_retry_due(now))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&RetryLedgerEntry> {
        self.entries.get(id)
    }

    pub fn entry_for(&self, key: &DedupKey) -> Option<&RetryLedgerEntry> {
        self.by_key.get(key).and_then(|id| self.entries.get(id))
    }

    pub fn entries(&self) -> Vec<RetryLedgerEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
