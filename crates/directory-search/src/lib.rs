//! # directory-search
//!
//! Document store and query parsing for the business directory.
//!
//! Every business entity of a participant is indexed as one Tantivy
//! document. Deleting a participant keeps its documents as tombstones;
//! only a later create-or-update removes them physically.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use directory_search::{DocumentStore, QueryManager, QueryMode, SearchIndexConfig};
//!
//! let store = DocumentStore::open(SearchIndexConfig::new("/path/to/index"))?;
//! let query = QueryManager::parse_query("acme country:NO")?;
//! let docs = store.search(&query, QueryMode::ExcludeDeleted, 20)?;
//! ```

mod compile;
pub mod document;
pub mod error;
pub mod index;
pub mod query;
pub mod schema;
pub mod store;

pub use document::{DocumentMetadata, StoredDocument};
pub use error::SearchError;
pub use index::{SearchIndex, SearchIndexConfig};
pub use query::{
    QueryField, QueryManager, QueryMode, QuerySyntaxError, StructuredQuery, TermKind,
};
pub use schema::{build_directory_schema, DirectorySchema};
pub use store::DocumentStore;
