//! Errors of the RocksDB persistence layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    Db(#[from] rocksdb::Error),

    /// The database was opened without one of the expected column families
    #[error("Missing column family '{0}'")]
    MissingColumnFamily(String),

    #[error("Malformed record key: {0}")]
    Key(String),

    /// A stored value no longer decodes into its record type
    #[error("Unreadable record: {0}")]
    Record(#[from] serde_json::Error),
}
