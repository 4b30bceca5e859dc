//! End-to-end test infrastructure for the business directory.
//!
//! Provides a shared TestHarness wiring storage, search index, indexer
//! and a scripted metadata source together, plus business card builders.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use directory_businesscard::schema::{NAMESPACE_V2, NAMESPACE_V3};
use directory_indexer::{
    DirectoryService, IndexerConfig, IndexerManager, MockMetadataSource, MockResponse,
};
use directory_search::{DocumentStore, SearchIndexConfig};
use directory_storage::Storage;
use directory_types::ParticipantIdentifier;

/// How long tests wait for queued work.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared test harness for E2E tests.
///
/// Everything lives in one temp directory so a harness can be restarted
/// against the same data.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub db_path: PathBuf,
    pub index_path: PathBuf,
    pub config: IndexerConfig,
    pub source: Arc<MockMetadataSource>,
    pub storage: Arc<Storage>,
    pub store: Arc<DocumentStore>,
    pub manager: Arc<IndexerManager>,
    pub service: DirectoryService,
}

impl TestHarness {
    /// Harness with default indexer settings and a short fetch timeout.
    pub fn new() -> Self {
        Self::with_config(IndexerConfig {
            fetch_timeout: Duration::from_secs(2),
            ..IndexerConfig::default()
        })
    }

    pub fn with_config(config: IndexerConfig) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let source = Arc::new(MockMetadataSource::new());
        Self::open(temp_dir, source, config)
    }

    fn open(
        temp_dir: tempfile::TempDir,
        source: Arc<MockMetadataSource>,
        config: IndexerConfig,
    ) -> Self {
        let db_path = temp_dir.path().join("db");
        let index_path = temp_dir.path().join("index");

        let storage = Arc::new(Storage::open(&db_path).expect("Failed to open test storage"));
        let store = Arc::new(
            DocumentStore::open(SearchIndexConfig::new(&index_path))
                .expect("Failed to open test index"),
        );
        let manager = Arc::new(
            IndexerManager::new(store.clone(), source.clone(), storage.clone(), config.clone())
                .expect("Failed to create indexer"),
        );
        let service = DirectoryService::new(manager.clone());

        Self {
            _temp_dir: temp_dir,
            db_path,
            index_path,
            config,
            source,
            storage,
            store,
            manager,
            service,
        }
    }

    /// Start dispatching; returns the number of recovered pending items.
    pub fn start(&self) -> usize {
        self.manager.start().expect("Failed to start indexer")
    }

    /// Wait until nothing is in flight.
    pub async fn wait_idle(&self) {
        assert!(
            self.manager.wait_idle(IDLE_TIMEOUT).await,
            "indexer did not become idle"
        );
    }

    /// Stop the indexer, close every store and reopen them on the same
    /// directories. The metadata source keeps its script.
    pub async fn restart(self) -> Self {
        self.manager.shutdown(IDLE_TIMEOUT).await;
        let TestHarness {
            _temp_dir,
            config,
            source,
            storage,
            store,
            manager,
            service,
            ..
        } = self;
        drop(service);
        drop(manager);
        drop(store);
        drop(storage);
        Self::open(_temp_dir, source, config)
    }

    /// Script a card answer for `participant`.
    pub fn publish(&self, participant: &ParticipantIdentifier, xml: &str) {
        self.source.set_response(participant, MockResponse::card(xml));
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Participant in the default scheme.
pub fn participant(value: &str) -> ParticipantIdentifier {
    ParticipantIdentifier::with_default_scheme(value).expect("valid participant")
}

/// Current-version card with one entity per `(name, country)` pair.
pub fn business_card(value: &str, entities: &[(&str, &str)]) -> String {
    card_xml(NAMESPACE_V3, value, entities)
}

/// Card in the previous schema version.
pub fn business_card_v2(value: &str, entities: &[(&str, &str)]) -> String {
    card_xml(NAMESPACE_V2, value, entities)
}

fn card_xml(namespace: &str, value: &str, entities: &[(&str, &str)]) -> String {
    let mut xml = format!(
        "<BusinessCard xmlns=\"{}\">\n  <ParticipantIdentifier scheme=\"iso6523-actorid-upis\">{}</ParticipantIdentifier>\n",
        namespace, value
    );
    for (name, country) in entities {
        xml.push_str(&format!(
            "  <BusinessEntity>\n    <Name>{}</Name>\n    <CountryCode>{}</CountryCode>\n  </BusinessEntity>\n",
            name, country
        ));
    }
    xml.push_str("</BusinessCard>");
    xml
}
