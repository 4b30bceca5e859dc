//! On-disk location of the directory index.
//!
//! An existing index is only reused when its schema matches the current
//! one exactly; otherwise opening fails and the index has to be rebuilt by
//! a full resync.

use std::path::{Path, PathBuf};

use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy};
use tracing::{debug, info};

use crate::error::SearchError;
use crate::schema::{build_directory_schema, DirectorySchema};

const DEFAULT_WRITER_MEMORY_MB: usize = 50;
const META_FILE: &str = "meta.json";

#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    pub index_path: PathBuf,
    /// Indexing buffer shared by all writer threads
    pub writer_memory_mb: usize,
}

impl SearchIndexConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
        }
    }

    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }
}

/// The tantivy index of the directory together with its resolved fields.
pub struct SearchIndex {
    index: Index,
    schema: DirectorySchema,
    config: SearchIndexConfig,
}

impl SearchIndex {
    pub fn open_or_create(config: SearchIndexConfig) -> Result<Self, SearchError> {
        let expected = build_directory_schema();
        let index = if config.index_path.join(META_FILE).exists() {
            let index = Index::open_in_dir(&config.index_path)?;
            if index.schema() != *expected.schema() {
                return Err(SearchError::SchemaMismatch(format!(
                    "index at {:?} was built with a different schema, remove it and resync",
                    config.index_path
                )));
            }
            debug!(path = ?config.index_path, "Reusing directory index");
            index
        } else {
            std::fs::create_dir_all(&config.index_path)?;
            info!(path = ?config.index_path, "Creating directory index");
            Index::create_in_dir(&config.index_path, expected.schema().clone())?
        };
        let schema = DirectorySchema::from_schema(index.schema())?;

        Ok(Self {
            index,
            schema,
            config,
        })
    }

    pub fn schema(&self) -> &DirectorySchema {
        &self.schema
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Tantivy holds a directory lock for the writer's lifetime, so a
    /// second writer on the same path fails.
    pub fn writer(&self) -> Result<IndexWriter, SearchError> {
        let writer = self.index.writer(self.config.writer_memory_mb * 1024 * 1024)?;
        debug!(memory_mb = self.config.writer_memory_mb, "Opened index writer");
        Ok(writer)
    }

    /// Readers see new commits only after an explicit `reload()`.
    pub fn reader(&self) -> Result<IndexReader, SearchError> {
        Ok(self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?)
    }

    pub fn path(&self) -> &Path {
        &self.config.index_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::schema::{Schema, STRING};
    use tempfile::TempDir;

    #[test]
    fn test_create_then_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let config = SearchIndexConfig::new(temp_dir.path());

        let created = SearchIndex::open_or_create(config.clone()).unwrap();
        assert!(temp_dir.path().join(META_FILE).exists());
        assert_eq!(created.path(), temp_dir.path());
        drop(created);

        let reopened = SearchIndex::open_or_create(config).unwrap();
        assert_eq!(reopened.index().schema(), *build_directory_schema().schema());
    }

    #[test]
    fn test_foreign_schema_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut builder = Schema::builder();
        builder.add_text_field("something_else", STRING);
        Index::create_in_dir(temp_dir.path(), builder.build()).unwrap();

        let result = SearchIndex::open_or_create(SearchIndexConfig::new(temp_dir.path()));
        assert!(matches!(result, Err(SearchError::SchemaMismatch(_))));
    }

    #[test]
    fn test_memory_budget() {
        let config = SearchIndexConfig::new("/tmp/directory-index").with_memory_mb(100);
        assert_eq!(config.writer_memory_mb, 100);
        assert_eq!(SearchIndexConfig::new("/x").writer_memory_mb, DEFAULT_WRITER_MEMORY_MB);
    }
}
