//! Retry ledger entries.
//!
//! A ledger entry wraps a work item whose processing failed. It is created on
//! the first failure, advanced on every failed retry, and removed on success
//! or when `max_retry_at` has been reached. Expired entries are kept as
//! [`DeadLetterEntry`] values for operators.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::record_id::next_record_id;
use crate::work_item::WorkItem;

/// A failed work item awaiting retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryLedgerEntry {
    /// ULID of the ledger entry (distinct from the work item id)
    pub id: String,

    pub work_item: WorkItem,

    /// Work item creation time plus the configured retry window
    pub max_retry_at: DateTime<Utc>,

    /// Number of failed retries, not counting the original attempt
    pub retry_count: u32,

    pub previous_retry_at: Option<DateTime<Utc>>,

    pub next_retry_at: DateTime<Utc>,
}

impl RetryLedgerEntry {
    /// Create an entry for a work item whose initial attempt failed at `now`.
    pub fn new(
        work_item: WorkItem,
        max_retry_window: Duration,
        retry_interval: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: next_record_id(),
            max_retry_at: work_item.created_at + max_retry_window,
            work_item,
            retry_count: 0,
            previous_retry_at: None,
            next_retry_at: now + retry_interval,
        }
    }

    /// An entry is expired once `max_retry_at` is reached; the boundary counts.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.max_retry_at <= now
    }

    pub fn is_retry_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at <= now
    }

    /// Record a failed retry attempt made at `now`.
    pub fn record_failed_retry(&mut self, now: DateTime<Utc>, retry_interval: Duration) {
        self.retry_count += 1;
        self.previous_retry_at = Some(now);
        self.next_retry_at = now + retry_interval;
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// An expired ledger entry retained for inspection and manual requeue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub entry: RetryLedgerEntry,
    pub expired_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn new(entry: RetryLedgerEntry, expired_at: DateTime<Utc>) -> Self {
        Self { entry, expired_at }
    }

    pub fn id(&self) -> &str {
        &self.entry.id
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::ParticipantIdentifier;
    use crate::work_item::ActionType;
    use chrono::TimeZone;

    fn item_created_at(created_at: DateTime<Utc>) -> WorkItem {
        WorkItem::with_created_at(
            ParticipantIdentifier::with_default_scheme("9915:test").unwrap(),
            ActionType::CreateOrUpdate,
            "owner",
            "host",
            created_at,
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_new_entry_schedules_first_retry() {
        let entry = RetryLedgerEntry::new(
            item_created_at(t0()),
            Duration::hours(24),
            Duration::minutes(5),
            t0() + Duration::seconds(10),
        );
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.previous_retry_at, None);
        assert_eq!(entry.max_retry_at, t0() + Duration::hours(24));
        assert_eq!(
            entry.next_retry_at,
            t0() + Duration::seconds(10) + Duration::minutes(5)
        );
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let entry = RetryLedgerEntry::new(
            item_created_at(t0()),
            Duration::hours(1),
            Duration::minutes(5),
            t0(),
        );
        let max = t0() + Duration::hours(1);
        assert!(!entry.is_expired(max - Duration::milliseconds(1)));
        assert!(entry.is_expired(max));
        assert!(entry.is_expired(max + Duration::milliseconds(1)));
    }

    #[test]
    fn test_failed_retries_are_monotonic() {
        let interval = Duration::minutes(5);
        let mut entry =
            RetryLedgerEntry::new(item_created_at(t0()), Duration::hours(24), interval, t0());

        let mut now = entry.next_retry_at;
        let mut last_next = entry.next_retry_at;
        for expected_count in 1..=3 {
            assert!(entry.is_retry_due(now));
            entry.record_failed_retry(now, interval);
            assert_eq!(entry.retry_count, expected_count);
            assert_eq!(entry.previous_retry_at, Some(now));
            assert!(entry.next_retry_at > last_next);
            last_next = entry.next_retry_at;
            now = entry.next_retry_at;
        }
    }

    #[test]
    fn test_entry_roundtrip_preserves_all_fields() {
        let created = Utc.timestamp_nanos(1_709_294_400_123_456_789);
        let mut entry = RetryLedgerEntry::new(
            item_created_at(created),
            Duration::hours(24),
            Duration::minutes(5),
            created,
        );
        entry.record_failed_retry(created + Duration::minutes(5), Duration::minutes(5));

        let bytes = entry.to_bytes().unwrap();
        let decoded = RetryLedgerEntry::from_bytes(&bytes).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn test_dead_letter_wraps_entry() {
        let entry = RetryLedgerEntry::new(
            item_created_at(t0()),
            Duration::hours(1),
            Duration::minutes(5),
            t0(),
        );
        let id = entry.id.clone();
        let dead = DeadLetterEntry::new(entry, t0() + Duration::hours(1));
        assert_eq!(dead.id(), id);
        let decoded = DeadLetterEntry::from_bytes(&dead.to_bytes().unwrap()).unwrap();
        assert_eq!(dead, decoded);
    }
}
