//! Indexer manager: dedup queue, processing pipeline, retry sweep.
//!
//! Lifecycle of a dedup key:
//!
//! ```text
//! Idle -> Pending -> Processing -> Success
//!                              \-> Failed -> Retry-Scheduled | Expired
//! ```
//!
//! Queued items are persisted before they are handed to the dispatcher and
//! removed once processing finished, so a restart picks up whatever was
//! pending. Failures go to the [`RetryLedger`]; the periodic sweep expires
//! stale entries into the dead-letter list and retries the rest.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use directory_businesscard::BusinessCardNormalizer;
use directory_search::{DocumentMetadata, DocumentStore};
use directory_storage::Storage;
use directory_types::{
    ActionType, DeadLetterEntry, DedupKey, IndexerSettings, ParticipantIdentifier,
    RetryLedgerEntry, WorkItem,
};
use tokio::sync::{mpsc, Notify, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::IndexerError;
use crate::ledger::{RetryLedger, RetryPolicy};
use crate::source::{FetchError, MetadataSource};

/// Runtime configuration of the manager.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub policy: RetryPolicy,
    /// Upper bound for one metadata fetch
    pub fetch_timeout: Duration,
    /// Work items processed concurrently
    pub max_concurrent_jobs: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        let settings = IndexerSettings::default();
        Self {
            policy: RetryPolicy::default(),
            fetch_timeout: settings.fetch_timeout(),
            max_concurrent_jobs: settings.max_concurrent_jobs,
        }
    }
}

impl IndexerConfig {
    pub fn from_settings(settings: &IndexerSettings) -> Result<Self, IndexerError> {
        Ok(Self {
            policy: RetryPolicy::new(settings.retry_interval_minutes, settings.max_retry_hours)?,
            fetch_timeout: settings.fetch_timeout(),
            max_concurrent_jobs: settings.max_concurrent_jobs.max(1),
        })
    }
}

/// Result of queueing a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueResult {
    /// A new item was persisted and handed to the dispatcher
    Queued,
    /// An item with the same dedup key is already pending or in flight
    Unchanged,
}

/// What the initial processing attempt of a work item did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Documents written for the participant
    Indexed { documents: usize },
    /// Card was unusable; the index was left untouched
    NothingToIndex,
    /// Documents marked as deleted
    Tombstoned { documents: usize },
    /// Attempt failed and the item is now in the retry ledger
    RetryScheduled { entry_id: String, error: String },
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ProcessOutcome::RetryScheduled { .. })
    }
}

/// Counters of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub expired: usize,
    pub retried: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Due entries whose dedup key was in flight
    pub skipped: usize,
}

/// Coordinates queueing, processing and retrying of work items.
pub struct IndexerManager {
    store: Arc<DocumentStore>,
    source: Arc<dyn MetadataSource>,
    storage: Arc<Storage>,
    normalizer: BusinessCardNormalizer,
    config: IndexerConfig,
    in_flight: Mutex<HashSet<DedupKey>>,
    idle: Notify,
    ledger: RwLock<RetryLedger>,
    sender: mpsc::UnboundedSender<WorkItem>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<WorkItem>>>,
    cancel: CancellationToken,
    semaphore: Arc<Semaphore>,
    tasks: TaskTracker,
}

impl IndexerManager {
    /// Create a manager and load the persisted retry ledger.
    ///
    /// Nothing is dispatched until [`IndexerManager::start`] is called.
    pub fn new(
        store: Arc<DocumentStore>,
        source: Arc<dyn MetadataSource>,
        storage: Arc<Storage>,
        config: IndexerConfig,
    ) -> Result<Self, IndexerError> {
        let ledger = RetryLedger::load(storage.clone(), config.policy)?;
        let (sender, receiver) = mpsc::unbounded_channel();
        Ok(Self {
            store,
            source,
            storage,
            normalizer: BusinessCardNormalizer::new(),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            config,
            in_flight: Mutex::new(HashSet::new()),
            idle: Notify::new(),
            ledger: RwLock::new(ledger),
            sender,
            receiver: Mutex::new(Some(receiver)),
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    pub fn with_normalizer(mut self, normalizer: BusinessCardNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<DedupKey>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark `key` as in flight. False if it already was.
    fn claim(&self, key: &DedupKey) -> bool {
        self.in_flight().insert(key.clone())
    }

    fn release(&self, key: &DedupKey) {
        let mut in_flight = self.in_flight();
        in_flight.remove(key);
        if in_flight.is_empty() {
            self.idle.notify_waiters();
        }
    }

    /// Re-queue persisted pending items and start dispatching.
    pub fn start(self: &Arc<Self>) -> Result<usize, IndexerError> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| IndexerError::InvalidInput("indexer already started".to_string()))?;

        let mut recovered = 0;
        for item in self.storage.get_pending_items()? {
            if !self.claim(&item.dedup_key()) {
                warn!(item = %item.log_text(), "Dropping duplicate pending item");
                self.storage.delete_pending(&item.id)?;
                continue;
            }
            debug!(item = %item.log_text(), "Recovered pending work item");
            self.sender.send(item).map_err(|_| IndexerError::Shutdown)?;
            recovered += 1;
        }
        if recovered > 0 {
            info!(recovered, "Re-queued pending work items");
        }

        let manager = Arc::clone(self);
        self.tasks.spawn(async move { manager.dispatch(receiver).await });
        info!(
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            source = self.source.name(),
            "Indexer started"
        );
        Ok(recovered)
    }

    async fn dispatch(self: Arc<Self>, mut receiver: mpsc::UnboundedReceiver<WorkItem>) {
        loop {
            let item = tokio::select! {
                _ = self.cancel.cancelled() => break,
                item = receiver.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };
            let permit = tokio::select! {
                _ = self.cancel.cancelled() => break,
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let manager = Arc::clone(&self);
            self.tasks.spawn(async move {
                manager.run_queued(item).await;
                drop(permit);
            });
        }
        debug!("Dispatcher stopped");
    }

    async fn run_queued(&self, item: WorkItem) {
        let key = item.dedup_key();
        match self.process_work_item(&item).await {
            Ok(outcome) => {
                debug!(item = %item.log_text(), ?outcome, "Processed work item");
                if let Err(e) = self.storage.delete_pending(&item.id) {
                    error!(item = %item.log_text(), error = %e, "Failed to remove pending work item");
                }
            }
            // Leave the item pending so the next start retries it
            Err(e) => error!(item = %item.log_text(), error = %e, "Failed to record work item failure"),
        }
        self.release(&key);
    }

    /// Queue a work item unless one with the same dedup key is pending or in flight.
    pub fn queue_work_item(
        &self,
        participant: ParticipantIdentifier,
        action: ActionType,
        owner_id: &str,
        requesting_host: &str,
    ) -> Result<QueueResult, IndexerError> {
        if self.cancel.is_cancelled() {
            return Err(IndexerError::Shutdown);
        }
        let item = WorkItem::new(participant, action, owner_id, requesting_host);
        let key = item.dedup_key();
        if !self.claim(&key) {
            debug!(key = %key, "Work item already queued");
            return Ok(QueueResult::Unchanged);
        }

        if let Err(e) = self.storage.put_pending(&item) {
            self.release(&key);
            return Err(e.into());
        }
        let log_text = item.log_text();
        if self.sender.send(item).is_err() {
            self.release(&key);
            return Err(IndexerError::Shutdown);
        }
        info!(item = %log_text, "Queued work item");
        Ok(QueueResult::Queued)
    }

    /// Initial processing attempt. Failures are handed to the retry ledger.
    ///
    /// Returns an error only if the failure could not be recorded.
    pub async fn process_work_item(&self, item: &WorkItem) -> Result<ProcessOutcome, IndexerError> {
        match self.try_process(item).await {
            Ok(outcome) => {
                self.clear_stale_entry(&item.dedup_key()).await?;
                Ok(outcome)
            }
            Err(e) => {
                warn!(item = %item.log_text(), error = %e, "Work item failed, scheduling retry");
                let entry = self
                    .ledger
                    .write()
                    .await
                    .record_failure(item.clone(), Utc::now())?;
                Ok(ProcessOutcome::RetryScheduled {
                    entry_id: entry.id,
                    error: e.to_string(),
                })
            }
        }
    }

    /// A success makes an older ledger entry for the same key obsolete.
    async fn clear_stale_entry(&self, key: &DedupKey) -> Result<(), IndexerError> {
        let stale_id = self.ledger.read().await.entry_for(key).map(|e| e.id.clone());
        if let Some(id) = stale_id {
            debug!(key = %key, entry_id = %id, "Removing ledger entry after success");
            self.ledger.write().await.remove(&id)?;
        }
        Ok(())
    }

    async fn try_process(&self, item: &WorkItem) -> Result<ProcessOutcome, IndexerError> {
        match item.action {
            ActionType::CreateOrUpdate | ActionType::Sync => self.index_participant(item).await,
            ActionType::Delete => self.tombstone(item).await,
        }
    }

    async fn index_participant(&self, item: &WorkItem) -> Result<ProcessOutcome, IndexerError> {
        let fetch = self.source.fetch_business_card(&item.participant);
        let fetched = match tokio::time::timeout(self.config.fetch_timeout, fetch).await {
            Err(_) => return Err(IndexerError::Timeout(self.config.fetch_timeout)),
            Ok(Err(FetchError::NotFound)) => {
                info!(item = %item.log_text(), "Participant not found upstream, tombstoning");
                return self.tombstone(item).await;
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(fetched)) => fetched,
        };

        let Some(card) = self
            .normalizer
            .parse(&fetched.payload, fetched.charset.as_deref())
        else {
            warn!(item = %item.log_text(), "Business card not usable, nothing indexed");
            return Ok(ProcessOutcome::NothingToIndex);
        };
        if card.participant != item.participant {
            warn!(
                requested = %item.participant,
                card = %card.participant,
                "Business card names a different participant"
            );
        }

        let store = self.store.clone();
        let participant = item.participant.clone();
        let metadata = metadata_of(item);
        let documents = tokio::task::spawn_blocking(move || {
            store.create_or_update_entry(&participant, &card, &fetched.document_types, &metadata)
        })
        .await??;

        info!(item = %item.log_text(), documents, "Indexed participant");
        Ok(ProcessOutcome::Indexed { documents })
    }

    async fn tombstone(&self, item: &WorkItem) -> Result<ProcessOutcome, IndexerError> {
        let store = self.store.clone();
        let participant = item.participant.clone();
        let metadata = metadata_of(item);
        let documents =
            tokio::task::spawn_blocking(move || store.delete_entry(&participant, &metadata))
                .await??;
        info!(item = %item.log_text(), documents, "Tombstoned participant");
        Ok(ProcessOutcome::Tombstoned { documents })
    }

    /// Move every expired ledger entry to the dead-letter list.
    pub async fn expire_old_entries(&self) -> Result<Vec<DeadLetterEntry>, IndexerError> {
        self.expire_old_entries_at(Utc::now()).await
    }

    pub async fn expire_old_entries_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<DeadLetterEntry>, IndexerError> {
        let dead = self.ledger.write().await.expire(now)?;
        for dead_letter in &dead {
            let entry = &dead_letter.entry;
            error!(
                item = %entry.work_item.log_text(),
                retries = entry.retry_count,
                max_retry_at = %entry.max_retry_at,
                "Work item permanently failed, moved to dead letters"
            );
        }
        Ok(dead)
    }

    /// Retry every due ledger entry.
    pub async fn re_index_participant_data(&self) -> Result<SweepStats, IndexerError> {
        self.re_index_participant_data_at(Utc::now()).await
    }

    /// Due entries are taken from a snapshot; the ledger write lock is only
    /// held while recording each attempt, never across a fetch.
    pub async fn re_index_participant_data_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SweepStats, IndexerError> {
        let mut stats = SweepStats::default();
        let due = self.ledger.read().await.due(now);

        for entry in due {
            let item = &entry.work_item;
            let key = item.dedup_key();
            if !self.claim(&key) {
                debug!(item = %item.log_text(), "Skipping retry, key in flight");
                stats.skipped += 1;
                continue;
            }

            stats.retried += 1;
            let attempt = self.try_process(item).await;
            let mut ledger = self.ledger.write().await;
            let recorded = match attempt {
                Ok(outcome) => {
                    info!(item = %item.log_text(), retries = entry.retry_count, ?outcome, "Retry succeeded");
                    stats.succeeded += 1;
                    ledger.remove(&entry.id).map(|_| ())
                }
                Err(e) => {
                    warn!(
                        item = %item.log_text(),
                        retries = entry.retry_count + 1,
                        error = %e,
                        "Retry failed"
                    );
                    stats.failed += 1;
                    ledger.record_failed_retry(&entry.id, now).map(|_| ())
                }
            };
            drop(ledger);
            self.release(&key);
            recorded?;
        }
        Ok(stats)
    }

    /// One sweep: expire first, then retry what is due.
    pub async fn run_sweep(&self) -> Result<SweepStats, IndexerError> {
        self.run_sweep_at(Utc::now()).await
    }

    pub async fn run_sweep_at(&self, now: DateTime<Utc>) -> Result<SweepStats, IndexerError> {
        let expired = self.expire_old_entries_at(now).await?.len();
        let mut stats = self.re_index_participant_data_at(now).await?;
        stats.expired = expired;
        if stats != SweepStats::default() {
            info!(
                expired = stats.expired,
                retried = stats.retried,
                succeeded = stats.succeeded,
                failed = stats.failed,
                skipped = stats.skipped,
                "Retry sweep finished"
            );
        }
        Ok(stats)
    }

    pub async fn ledger_entries(&self) -> Vec<RetryLedgerEntry> {
        self.ledger.read().await.entries()
    }

    pub fn dead_letter_entries(&self) -> Result<Vec<DeadLetterEntry>, IndexerError> {
        Ok(self.storage.get_dead_letters()?)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight().len()
    }

    /// Wait until nothing is pending or in flight. False on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight_count() == 0 {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    /// Queue the work item of a dead letter again and drop the dead letter.
    pub fn requeue_dead_letter(
        &self,
        id: &str,
        owner_id: &str,
        requesting_host: &str,
    ) -> Result<QueueResult, IndexerError> {
        let dead = self
            .storage
            .get_dead_letter(id)?
            .ok_or_else(|| IndexerError::InvalidInput(format!("no dead letter with id {}", id)))?;
        let item = dead.entry.work_item;
        let result = self.queue_work_item(item.participant, item.action, owner_id, requesting_host)?;
        self.storage.delete_dead_letter(id)?;
        info!(entry_id = id, ?result, "Requeued dead letter");
        Ok(result)
    }

    /// Queue a SYNC for every participant with live documents.
    pub async fn queue_resync_all(
        &self,
        owner_id: &str,
        requesting_host: &str,
    ) -> Result<usize, IndexerError> {
        let store = self.store.clone();
        let participants =
            tokio::task::spawn_blocking(move || store.get_all_contained_participant_ids())
                .await??;

        let mut queued = 0;
        for participant in participants {
            if self.queue_work_item(participant, ActionType::Sync, owner_id, requesting_host)?
                == QueueResult::Queued
            {
                queued += 1;
            }
        }
        info!(queued, "Queued resync of all participants");
        Ok(queued)
    }

    /// Stop dispatching and wait for running jobs. False on timeout.
    ///
    /// Items not yet started stay persisted as pending.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        self.tasks.close();
        let finished = tokio::time::timeout(timeout, self.tasks.wait())
            .await
            .is_ok();
        if finished {
            info!("Indexer stopped");
        } else {
            warn!(?timeout, "Indexer shutdown timed out with jobs still running");
        }
        finished
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

fn metadata_of(item: &WorkItem) -> DocumentMetadata {
    DocumentMetadata {
        created_at: Utc::now(),
        owner_id: item.owner_id.clone(),
        requesting_host: item.requesting_host.clone(),
    }
}
