//! Key encoding and decoding for storage layer.
//!
//! Key format: `{prefix}:{ulid}`
//! - prefix: identifies the record kind (pending, ledger, dead)
//! - ulid: 26-character ULID of the record
//!
//! Record ids are minted by `directory_types::next_record_id`, which is
//! monotonic, so a forward scan of a column family returns records oldest
//! first.

use std::fmt;

use ulid::Ulid;

use crate::error::StorageError;

/// Kind of record a key points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Pending,
    Ledger,
    DeadLetter,
}

impl RecordKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            RecordKind::Pending => "pending",
            RecordKind::Ledger => "ledger",
            RecordKind::DeadLetter => "dead",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "pending" => Some(RecordKind::Pending),
            "ledger" => Some(RecordKind::Ledger),
            "dead" => Some(RecordKind::DeadLetter),
            _ => None,
        }
    }
}

/// Key for any stored record
/// Format: {prefix}:{ulid}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    pub kind: RecordKind,
    pub ulid: Ulid,
}

impl RecordKey {
    /// Build a key from a record id (the ULID string)
    pub fn from_id(kind: RecordKind, id: &str) -> Result<Self, StorageError> {
        let ulid: Ulid = id
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid record id '{}': {}", id, e)))?;
        Ok(Self { kind, ulid })
    }

    /// Encode key to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        let (prefix, id) = s
            .split_once(':')
            .ok_or_else(|| StorageError::Key(format!("Invalid record key format: {}", s)))?;
        let kind = RecordKind::from_prefix(prefix)
            .ok_or_else(|| StorageError::Key(format!("Unknown record key prefix: {}", prefix)))?;
        Self::from_id(kind, id)
    }

    pub fn id(&self) -> String {
        self.ulid.to_string()
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.prefix(), self.ulid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_roundtrip() {
        let ulid = Ulid::new();
        let key = RecordKey::from_id(RecordKind::Ledger, &ulid.to_string()).unwrap();
        let bytes = key.to_bytes();
        assert!(bytes.starts_with(b"ledger:"));
        assert_eq!(RecordKey::from_bytes(&bytes).unwrap(), key);
        assert_eq!(key.id(), ulid.to_string());
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert!(RecordKey::from_id(RecordKind::Pending, "not-a-ulid").is_err());
        assert!(RecordKey::from_bytes(b"nocolon").is_err());
        assert!(RecordKey::from_bytes(b"other:01ARZ3NDEKTSV4RRFFQ69G5FAV").is_err());
    }

    #[test]
    fn test_keys_sort_by_creation() {
        let first = RecordKey::from_id(RecordKind::Pending, "01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap();
        let second = RecordKey::from_id(RecordKind::Pending, "01BX5ZZKBKACTAV9WEVGEMMVRZ").unwrap();
        assert!(first.to_bytes() < second.to_bytes());
    }
}
