//! Document store over the Tantivy index.
//!
//! All writes go through the single `IndexWriter` behind a mutex. The reader
//! uses a manual reload policy and is reloaded only after a successful commit,
//! so concurrent readers always see the last committed snapshot.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use directory_businesscard::NormalizedBusinessCard;
use directory_types::{DocumentTypeIdentifier, ParticipantIdentifier};
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{IndexReader, IndexWriter, Searcher, TantivyDocument, Term};
use tracing::{debug, info, warn};

use crate::compile::QueryCompiler;
use crate::document::{DocumentMetadata, StoredDocument};
use crate::error::SearchError;
use crate::index::{SearchIndex, SearchIndexConfig};
use crate::query::{QueryMode, StructuredQuery};

/// Owns the directory index and every read and write against it.
pub struct DocumentStore {
    index: SearchIndex,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
}

impl DocumentStore {
    /// Open the store, creating the index directory if needed.
    pub fn open(config: SearchIndexConfig) -> Result<Self, SearchError> {
        let index = SearchIndex::open_or_create(config)?;
        let writer = index.writer()?;
        let reader = index.reader()?;
        info!(path = ?index.path(), docs = reader.searcher().num_docs(), "Document store opened");
        Ok(Self {
            index,
            writer: Mutex::new(writer),
            reader,
        })
    }

    fn compiler(&self) -> QueryCompiler<'_> {
        QueryCompiler::new(self.index.index(), self.index.schema())
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, IndexWriter>, SearchError> {
        self.writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))
    }

    fn participant_term(&self, participant: &ParticipantIdentifier) -> Term {
        Term::from_field_text(self.index.schema().participant_id, &participant.canonical_string())
    }

    /// Commit, then make the commit visible to readers. Rolls back on failure.
    fn commit(&self, writer: &mut IndexWriter) -> Result<u64, SearchError> {
        match writer.commit() {
            Ok(opstamp) => {
                self.reader.reload()?;
                Ok(opstamp)
            }
            Err(e) => {
                rollback(writer);
                Err(e.into())
            }
        }
    }

    /// Replace every document of `participant` with one document per entity.
    ///
    /// Returns the number of documents written.
    pub fn create_or_update_entry(
        &self,
        participant: &ParticipantIdentifier,
        card: &NormalizedBusinessCard,
        document_types: &[DocumentTypeIdentifier],
        metadata: &DocumentMetadata,
    ) -> Result<usize, SearchError> {
        let schema = self.index.schema();
        let docs = card
            .entities
            .iter()
            .enumerate()
            .map(|(position, entity)| {
                StoredDocument {
                    participant: participant.clone(),
                    entity_index: position as u64,
                    entity: entity.clone(),
                    document_types: document_types.to_vec(),
                    deleted: false,
                    metadata: metadata.clone(),
                    deletion: None,
                }
                .to_tantivy(schema)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let count = docs.len();

        let mut writer = self.lock_writer()?;
        writer.delete_term(self.participant_term(participant));
        for doc in docs {
            if let Err(e) = writer.add_document(doc) {
                rollback(&mut writer);
                return Err(e.into());
            }
        }
        self.commit(&mut writer)?;

        info!(participant = %participant, documents = count, "Replaced participant documents");
        Ok(count)
    }

    /// Tombstone all live documents of `participant`, keeping their fields.
    ///
    /// Returns the number of documents tombstoned. Nothing is written when
    /// the participant has no live documents.
    pub fn delete_entry(
        &self,
        participant: &ParticipantIdentifier,
        metadata: &DocumentMetadata,
    ) -> Result<usize, SearchError> {
        let mut writer = self.lock_writer()?;

        // Re-read under the lock so no concurrent replace is lost
        self.reader.reload()?;
        let existing = self.participant_documents(&self.reader.searcher(), participant)?;
        let live = existing.iter().filter(|doc| !doc.deleted).count();
        if live == 0 {
            debug!(participant = %participant, "No live documents to tombstone");
            return Ok(0);
        }

        let schema = self.index.schema();
        let rewritten = existing
            .iter()
            .map(|doc| {
                if doc.deleted {
                    doc.to_tantivy(schema)
                } else {
                    doc.tombstoned(metadata).to_tantivy(schema)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        writer.delete_term(self.participant_term(participant));
        for doc in rewritten {
            if let Err(e) = writer.add_document(doc) {
                rollback(&mut writer);
                return Err(e.into());
            }
        }
        self.commit(&mut writer)?;

        info!(participant = %participant, documents = live, "Tombstoned participant documents");
        Ok(live)
    }

    /// All documents of a participant including tombstones, by entity position.
    pub fn get_all_documents_of_participant(
        &self,
        participant: &ParticipantIdentifier,
    ) -> Result<Vec<StoredDocument>, SearchError> {
        self.participant_documents(&self.reader.searcher(), participant)
    }

    /// Live documents whose entity has the given country code.
    pub fn get_all_documents_of_country_code(
        &self,
        country_code: &str,
    ) -> Result<Vec<StoredDocument>, SearchError> {
        let schema = self.index.schema();
        let query = BooleanQuery::new(vec![
            (
                Occur::Must,
                Box::new(TermQuery::new(
                    Term::from_field_text(schema.country_code, &country_code.trim().to_uppercase()),
                    IndexRecordOption::Basic,
                )) as Box<dyn Query>,
            ),
            (Occur::Must, self.compiler().live_only()),
        ]);
        let mut docs = self.collect_all(&self.reader.searcher(), &query)?;
        docs.sort_by(|a, b| {
            (&a.participant, a.entity_index).cmp(&(&b.participant, b.entity_index))
        });
        Ok(docs)
    }

    /// Whether the participant has at least one live document.
    pub fn contains_entry(&self, participant: &ParticipantIdentifier) -> Result<bool, SearchError> {
        let compiler = self.compiler();
        let query = BooleanQuery::new(vec![
            (Occur::Must, compiler.participant(participant)),
            (Occur::Must, compiler.live_only()),
        ]);
        let count = self.reader.searcher().search(&query, &Count)?;
        Ok(count > 0)
    }

    /// Every participant with at least one live document.
    pub fn get_all_contained_participant_ids(
        &self,
    ) -> Result<BTreeSet<ParticipantIdentifier>, SearchError> {
        let live = self.compiler().live_only();
        let docs = self.collect_all(&self.reader.searcher(), live.as_ref())?;
        Ok(docs.into_iter().map(|doc| doc.participant).collect())
    }

    /// Run a structured query, returning at most `limit` documents by relevance.
    pub fn search(
        &self,
        query: &StructuredQuery,
        mode: QueryMode,
        limit: usize,
    ) -> Result<Vec<StoredDocument>, SearchError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let compiled = self.compiler().compile(query, mode)?;
        let searcher = self.reader.searcher();
        let top_docs = searcher.search(compiled.as_ref(), &TopDocs::with_limit(limit))?;

        let schema = self.index.schema();
        let mut results = Vec::with_capacity(top_docs.len());
        for (_score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            results.push(StoredDocument::from_tantivy(schema, &doc)?);
        }
        debug!(?mode, results = results.len(), "Search completed");
        Ok(results)
    }

    /// Number of documents matching the query.
    pub fn count(&self, query: &StructuredQuery, mode: QueryMode) -> Result<usize, SearchError> {
        let compiled = self.compiler().compile(query, mode)?;
        Ok(self.reader.searcher().search(compiled.as_ref(), &Count)?)
    }

    /// Number of documents in the index, tombstones included.
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn participant_documents(
        &self,
        searcher: &Searcher,
        participant: &ParticipantIdentifier,
    ) -> Result<Vec<StoredDocument>, SearchError> {
        let query = self.compiler().participant(participant);
        let mut docs = self.collect_all(searcher, query.as_ref())?;
        docs.sort_by_key(|doc| doc.entity_index);
        Ok(docs)
    }

    fn collect_all(
        &self,
        searcher: &Searcher,
        query: &dyn Query,
    ) -> Result<Vec<StoredDocument>, SearchError> {
        let schema = self.index.schema();
        let addresses = searcher.search(query, &DocSetCollector)?;
        addresses
            .into_iter()
            .map(|address| {
                let doc: TantivyDocument = searcher.doc(address)?;
                StoredDocument::from_tantivy(schema, &doc)
            })
            .collect()
    }
}

fn rollback(writer: &mut IndexWriter) {
    if let Err(e) = writer.rollback() {
        warn!(error = %e, "Failed to roll back index changes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryField, QueryManager};
    use directory_businesscard::{BusinessEntity, EntityName};
    use tempfile::TempDir;

    fn create_test_store() -> (DocumentStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = DocumentStore::open(SearchIndexConfig::new(temp_dir.path())).unwrap();
        (store, temp_dir)
    }

    fn entity(name: &str, country: &str) -> BusinessEntity {
        BusinessEntity {
            names: vec![EntityName {
                name: name.to_string(),
                language: None,
            }],
            country_code: country.to_string(),
            geographical_information: None,
            identifiers: Vec::new(),
            website_uris: Vec::new(),
            contacts: Vec::new(),
            additional_information: None,
            registration_date: None,
        }
    }

    fn participant(value: &str) -> ParticipantIdentifier {
        ParticipantIdentifier::with_default_scheme(value).unwrap()
    }

    fn card(pid: &ParticipantIdentifier, entities: Vec<BusinessEntity>) -> NormalizedBusinessCard {
        NormalizedBusinessCard {
            participant: pid.clone(),
            entities,
        }
    }

    fn metadata() -> DocumentMetadata {
        DocumentMetadata::new("owner", "127.0.0.1")
    }

    #[test]
    fn test_create_and_read_back() {
        let (store, _temp) = create_test_store();
        let pid = participant("9915:test");
        let card = card(
            &pid,
            vec![entity("Austrian Branch", "AT"), entity("Norwegian Branch", "NO")],
        );

        let written = store
            .create_or_update_entry(&pid, &card, &[], &metadata())
            .unwrap();
        assert_eq!(written, 2);

        let docs = store.get_all_documents_of_participant(&pid).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].entity_index, 0);
        assert_eq!(docs[0].entity.country_code, "AT");
        assert_eq!(docs[1].entity_index, 1);
        assert!(store.contains_entry(&pid).unwrap());

        let norway = store.get_all_documents_of_country_code("no").unwrap();
        assert_eq!(norway.len(), 1);
        assert_eq!(norway[0].entity.primary_name(), "Norwegian Branch");
    }

    #[test]
    fn test_replace_is_idempotent() {
        let (store, _temp) = create_test_store();
        let pid = participant("9915:test");
        let card = card(&pid, vec![entity("A", "AT"), entity("B", "NO")]);

        store
            .create_or_update_entry(&pid, &card, &[], &metadata())
            .unwrap();
        let first: Vec<_> = store
            .get_all_documents_of_participant(&pid)
            .unwrap()
            .into_iter()
            .map(|d| d.entity)
            .collect();

        store
            .create_or_update_entry(&pid, &card, &[], &metadata())
            .unwrap();
        let second: Vec<_> = store
            .get_all_documents_of_participant(&pid)
            .unwrap()
            .into_iter()
            .map(|d| d.entity)
            .collect();

        assert_eq!(first, second);
        assert_eq!(store.num_docs(), 2);
    }

    #[test]
    fn test_replace_drops_removed_entities() {
        let (store, _temp) = create_test_store();
        let pid = participant("9915:test");
        store
            .create_or_update_entry(&pid, &card(&pid, vec![entity("A", "AT"), entity("B", "NO")]), &[], &metadata())
            .unwrap();
        store
            .create_or_update_entry(&pid, &card(&pid, vec![entity("C", "DE")]), &[], &metadata())
            .unwrap();

        let docs = store.get_all_documents_of_participant(&pid).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].entity.country_code, "DE");
    }

    #[test]
    fn test_delete_preserves_fields() {
        let (store, _temp) = create_test_store();
        let pid = participant("9915:test");
        let card = card(&pid, vec![entity("A", "AT"), entity("B", "NO")]);
        store
            .create_or_update_entry(&pid, &card, &[], &metadata())
            .unwrap();

        let deletion = DocumentMetadata::new("admin", "10.0.0.1");
        assert_eq!(store.delete_entry(&pid, &deletion).unwrap(), 2);

        let docs = store.get_all_documents_of_participant(&pid).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.deleted));
        assert_eq!(docs[0].entity, card.entities[0]);
        assert_eq!(docs[0].metadata.owner_id, "owner");
        assert_eq!(docs[0].deletion.as_ref().map(|m| m.owner_id.as_str()), Some("admin"));

        assert!(!store.contains_entry(&pid).unwrap());
        assert!(store.get_all_documents_of_country_code("NO").unwrap().is_empty());

        let query = QueryManager::parse_query("A").unwrap();
        assert_eq!(store.count(&query, QueryMode::ExcludeDeleted).unwrap(), 0);
        assert_eq!(store.count(&query, QueryMode::IncludeDeleted).unwrap(), 1);
    }

    #[test]
    fn test_delete_without_live_documents_writes_nothing() {
        let (store, _temp) = create_test_store();
        let pid = participant("9915:missing");
        assert_eq!(store.delete_entry(&pid, &metadata()).unwrap(), 0);
        assert_eq!(store.num_docs(), 0);

        let pid = participant("9915:test");
        store
            .create_or_update_entry(&pid, &card(&pid, vec![entity("A", "AT")]), &[], &metadata())
            .unwrap();
        let first = DocumentMetadata::new("first", "host");
        store.delete_entry(&pid, &first).unwrap();
        assert_eq!(store.delete_entry(&pid, &metadata()).unwrap(), 0);

        let docs = store.get_all_documents_of_participant(&pid).unwrap();
        assert_eq!(docs[0].deletion.as_ref().map(|m| m.owner_id.as_str()), Some("first"));
    }

    #[test]
    fn test_contained_participant_ids_skip_tombstones() {
        let (store, _temp) = create_test_store();
        let live = participant("9915:live");
        let gone = participant("9915:gone");
        store
            .create_or_update_entry(&live, &card(&live, vec![entity("A", "AT"), entity("B", "AT")]), &[], &metadata())
            .unwrap();
        store
            .create_or_update_entry(&gone, &card(&gone, vec![entity("C", "AT")]), &[], &metadata())
            .unwrap();
        store.delete_entry(&gone, &metadata()).unwrap();

        let ids = store.get_all_contained_participant_ids().unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![live]);
    }

    #[test]
    fn test_search_by_fields() {
        let (store, _temp) = create_test_store();
        let pid = participant("9915:test");
        let doc_type = DocumentTypeIdentifier::parse("busdox-docid-qns::urn:invoice").unwrap();
        let mut vienna = entity("Acme Holding", "AT");
        vienna.geographical_information = Some("Vienna".to_string());
        store
            .create_or_update_entry(
                &pid,
                &card(&pid, vec![vienna, entity("Acme Nordic", "NO")]),
                &[doc_type],
                &metadata(),
            )
            .unwrap();

        let search = |q: &str| {
            store
                .search(&QueryManager::parse_query(q).unwrap(), QueryMode::ExcludeDeleted, 10)
                .unwrap()
        };

        assert_eq!(search("acme").len(), 2);
        assert_eq!(search("acme country:no").len(), 1);
        assert_eq!(search("name:\"acme nordic\"").len(), 1);
        assert_eq!(search("geo:vien*").len(), 1);
        assert_eq!(search("acme -country:AT").len(), 1);
        assert_eq!(search("participant:9915:TEST").len(), 2);
        assert_eq!(search("doctype:\"busdox-docid-qns::urn:invoice\"").len(), 2);
        assert!(search("nothing").is_empty());
    }

    #[test]
    fn test_search_limit() {
        let (store, _temp) = create_test_store();
        let pid = participant("9915:test");
        store
            .create_or_update_entry(
                &pid,
                &card(&pid, vec![entity("A", "AT"), entity("B", "AT"), entity("C", "AT")]),
                &[],
                &metadata(),
            )
            .unwrap();
        let query = StructuredQuery::word(QueryField::Country, "AT");
        assert_eq!(store.search(&query, QueryMode::default(), 2).unwrap().len(), 2);
        assert!(store.search(&query, QueryMode::default(), 0).unwrap().is_empty());
        assert_eq!(store.count(&query, QueryMode::default()).unwrap(), 3);
    }

    #[test]
    fn test_reopen_keeps_documents() {
        let temp_dir = TempDir::new().unwrap();
        let pid = participant("9915:test");
        {
            let store = DocumentStore::open(SearchIndexConfig::new(temp_dir.path())).unwrap();
            store
                .create_or_update_entry(&pid, &card(&pid, vec![entity("A", "AT")]), &[], &metadata())
                .unwrap();
        }
        let store = DocumentStore::open(SearchIndexConfig::new(temp_dir.path())).unwrap();
        assert!(store.contains_entry(&pid).unwrap());
    }
}
