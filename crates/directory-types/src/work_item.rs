//! Work items: requested indexing actions for one participant.
//!
//! Work items are immutable once created. They are persisted as JSON while
//! pending and wrapped into retry ledger entries when processing fails.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifier::ParticipantIdentifier;
use crate::record_id::next_record_id;

/// What should happen to a participant's documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    /// Fetch the business card and replace the participant's documents
    CreateOrUpdate,
    /// Tombstone the participant's documents
    Delete,
    /// Re-fetch an already indexed participant; handled like CreateOrUpdate
    Sync,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CreateOrUpdate => "CREATE_OR_UPDATE",
            ActionType::Delete => "DELETE",
            ActionType::Sync => "SYNC",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two work items with the same key are duplicates of each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub participant: ParticipantIdentifier,
    pub action: ActionType,
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.participant, self.action)
    }
}

/// A requested indexing action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// ULID, unique per item
    pub id: String,

    /// When the item was requested; retries expire relative to this
    pub created_at: DateTime<Utc>,

    pub participant: ParticipantIdentifier,

    pub action: ActionType,

    /// Identity of the requester (e.g. the client certificate subject)
    pub owner_id: String,

    /// Host the request came from
    pub requesting_host: String,
}

impl WorkItem {
    /// Create a new work item stamped with the current time.
    pub fn new(
        participant: ParticipantIdentifier,
        action: ActionType,
        owner_id: impl Into<String>,
        requesting_host: impl Into<String>,
    ) -> Self {
        Self::with_created_at(participant, action, owner_id, requesting_host, Utc::now())
    }

    /// Create a work item with an explicit creation time.
    pub fn with_created_at(
        participant: ParticipantIdentifier,
        action: ActionType,
        owner_id: impl Into<String>,
        requesting_host: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: next_record_id(),
            created_at,
            participant,
            action,
            owner_id: owner_id.into(),
            requesting_host: requesting_host.into(),
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            participant: self.participant.clone(),
            action: self.action,
        }
    }

    /// Short description for log lines.
    pub fn log_text(&self) -> String {
        format!("[{}] {} {}", self.id, self.action, self.participant)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(value: &str) -> ParticipantIdentifier {
        ParticipantIdentifier::with_default_scheme(value).unwrap()
    }

    #[test]
    fn test_dedup_key_ignores_owner_and_time() {
        let a = WorkItem::new(pid("9915:test"), ActionType::CreateOrUpdate, "owner-a", "host-a");
        let b = WorkItem::new(pid("9915:test"), ActionType::CreateOrUpdate, "owner-b", "host-b");
        assert_ne!(a.id, b.id);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_dedup_key_differs_per_action() {
        let a = WorkItem::new(pid("9915:test"), ActionType::CreateOrUpdate, "o", "h");
        let b = WorkItem::new(pid("9915:test"), ActionType::Delete, "o", "h");
        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_work_item_roundtrip() {
        let item = WorkItem::new(pid("9915:test"), ActionType::Sync, "owner", "10.0.0.1");
        let bytes = item.to_bytes().unwrap();
        let decoded = WorkItem::from_bytes(&bytes).unwrap();
        assert_eq!(item, decoded);
    }

    #[test]
    fn test_action_serializes_screaming_snake() {
        let json = serde_json::to_string(&ActionType::CreateOrUpdate).unwrap();
        assert_eq!(json, "\"CREATE_OR_UPDATE\"");
        assert_eq!(ActionType::CreateOrUpdate.to_string(), "CREATE_OR_UPDATE");
    }

    #[test]
    fn test_log_text_contains_participant() {
        let item = WorkItem::new(pid("9915:test"), ActionType::Delete, "o", "h");
        let text = item.log_text();
        assert!(text.contains("DELETE"));
        assert!(text.contains("9915:test"));
    }
}
