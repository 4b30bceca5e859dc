//! Transport-agnostic facade over the indexer and document store.
//!
//! Identifiers arrive as strings and are validated here; malformed ones are
//! rejected before anything is queued.

use std::sync::Arc;

use directory_search::{QueryManager, QueryMode, SearchError, StoredDocument};
use directory_types::{ActionType, ParticipantIdentifier};
use tracing::debug;

use crate::error::IndexerError;
use crate::manager::{IndexerManager, QueueResult};

/// Answer to a write request. Deduplicated requests are accepted too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Accepted,
}

pub struct DirectoryService {
    manager: Arc<IndexerManager>,
}

impl DirectoryService {
    pub fn new(manager: Arc<IndexerManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<IndexerManager> {
        &self.manager
    }

    /// Request (re-)indexing of a participant.
    pub fn put_participant(
        &self,
        participant_id: &str,
        owner_id: &str,
        requesting_host: &str,
    ) -> Result<RequestStatus, IndexerError> {
        self.submit(participant_id, ActionType::CreateOrUpdate, owner_id, requesting_host)
    }

    /// Request tombstoning of a participant.
    pub fn delete_participant(
        &self,
        participant_id: &str,
        owner_id: &str,
        requesting_host: &str,
    ) -> Result<RequestStatus, IndexerError> {
        self.submit(participant_id, ActionType::Delete, owner_id, requesting_host)
    }

    fn submit(
        &self,
        participant_id: &str,
        action: ActionType,
        owner_id: &str,
        requesting_host: &str,
    ) -> Result<RequestStatus, IndexerError> {
        let participant = parse_participant(participant_id)?;
        if owner_id.trim().is_empty() {
            return Err(IndexerError::InvalidInput("owner id must not be empty".to_string()));
        }
        let result = self
            .manager
            .queue_work_item(participant, action, owner_id, requesting_host)?;
        if result == QueueResult::Unchanged {
            debug!(participant_id, %action, "Request deduplicated");
        }
        Ok(RequestStatus::Accepted)
    }

    /// Whether the participant has live documents.
    pub fn participant_exists(&self, participant_id: &str) -> Result<bool, IndexerError> {
        let participant = parse_participant(participant_id)?;
        Ok(self.manager.store().contains_entry(&participant)?)
    }

    /// All documents of a participant, tombstones included.
    pub fn participant_documents(
        &self,
        participant_id: &str,
    ) -> Result<Vec<StoredDocument>, IndexerError> {
        let participant = parse_participant(participant_id)?;
        Ok(self
            .manager
            .store()
            .get_all_documents_of_participant(&participant)?)
    }

    /// Queue a SYNC for every indexed participant.
    pub async fn resync_all(
        &self,
        owner_id: &str,
        requesting_host: &str,
    ) -> Result<usize, IndexerError> {
        self.manager.queue_resync_all(owner_id, requesting_host).await
    }

    /// Parse and run a user query.
    pub fn search(
        &self,
        query: &str,
        mode: QueryMode,
        limit: usize,
    ) -> Result<Vec<StoredDocument>, IndexerError> {
        let parsed = QueryManager::parse_query(query).map_err(SearchError::from)?;
        Ok(self.manager.store().search(&parsed, mode, limit)?)
    }
}

/// Accepts the canonical form, percent-encoded or not.
fn parse_participant(raw: &str) -> Result<ParticipantIdentifier, IndexerError> {
    Ok(ParticipantIdentifier::parse_uri_encoded(raw.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::IndexerConfig;
    use crate::source::MockMetadataSource;
    use directory_search::{DocumentStore, SearchIndexConfig};
    use directory_storage::Storage;
    use tempfile::TempDir;

    fn create_test_service() -> (DirectoryService, Arc<Storage>, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(&temp.path().join("db")).unwrap());
        let store =
            Arc::new(DocumentStore::open(SearchIndexConfig::new(temp.path().join("index"))).unwrap());
        let manager = IndexerManager::new(
            store,
            Arc::new(MockMetadataSource::new()),
            storage.clone(),
            IndexerConfig::default(),
        )
        .unwrap();
        (DirectoryService::new(Arc::new(manager)), storage, temp)
    }

    #[test]
    fn test_malformed_identifier_is_rejected() {
        let (service, storage, _temp) = create_test_service();
        let result = service.put_participant("no-separator", "owner", "host");
        assert!(matches!(result, Err(IndexerError::Identifier(_))));
        assert!(storage.get_pending_items().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_put_is_accepted() {
        let (service, storage, _temp) = create_test_service();
        let id = "iso6523-actorid-upis%3A%3A9915%3Atest";
        assert_eq!(
            service.put_participant(id, "owner", "host").unwrap(),
            RequestStatus::Accepted
        );
        assert_eq!(
            service
                .put_participant("iso6523-actorid-upis::9915:TEST", "owner", "host")
                .unwrap(),
            RequestStatus::Accepted
        );
        assert_eq!(storage.get_pending_items().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_owner_is_rejected() {
        let (service, _storage, _temp) = create_test_service();
        let result = service.delete_participant("iso6523-actorid-upis::9915:test", " ", "host");
        assert!(matches!(result, Err(IndexerError::InvalidInput(_))));
    }

    #[test]
    fn test_search_syntax_error() {
        let (service, _storage, _temp) = create_test_service();
        let result = service.search("name:(", QueryMode::default(), 10);
        assert!(matches!(
            result,
            Err(IndexerError::Search(SearchError::QuerySyntax(_)))
        ));
        assert!(!service
            .participant_exists("iso6523-actorid-upis::9915:test")
            .unwrap());
    }
}
