//! Command implementations for the directory daemon.
//!
//! - start: load config, open the stores, run the indexer and scheduler
//!   until SIGINT/SIGTERM
//! - every other command opens the same stores for a single operation and
//!   waits until queued work has been processed
//!
//! RocksDB allows one process per database, so operator commands fail
//! while a daemon holds the same `db_path`.

use std::fmt::Write as _;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use directory_indexer::{
    DirectoryService, HttpMetadataSource, IndexerConfig, IndexerManager, MetadataSource,
    SweepStats,
};
use directory_scheduler::jobs::{
    create_resync_job, create_retry_sweep_job, ResyncJobConfig, RetrySweepJobConfig,
};
use directory_scheduler::{SchedulerConfig, SchedulerService};
use directory_search::{DocumentStore, QueryMode, SearchIndexConfig, StoredDocument};
use directory_storage::Storage;
use directory_types::{DeadLetterEntry, RetryLedgerEntry, Settings};

use crate::cli::{Commands, GlobalArgs};

/// Extra time operator commands wait beyond one fetch timeout.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(args: &GlobalArgs) -> Result<Settings> {
    let mut settings =
        Settings::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(db_path) = &args.db_path {
        settings.db_path = db_path.clone();
    }
    if let Some(index_path) = &args.index_path {
        settings.search_index_path = index_path.clone();
    }
    if let Some(log_level) = &args.log_level {
        settings.log_level = log_level.clone();
    }
    Ok(settings)
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Opened stores plus the indexer built on top of them.
pub struct Runtime {
    pub settings: Settings,
    pub storage: Arc<Storage>,
    pub manager: Arc<IndexerManager>,
    pub service: DirectoryService,
}

impl Runtime {
    /// Open everything against the configured HTTP metadata source.
    pub fn open(settings: Settings) -> Result<Self> {
        let config = IndexerConfig::from_settings(&settings.indexer)
            .context("Invalid indexer configuration")?;
        let source = HttpMetadataSource::new(&settings.metadata_source, config.fetch_timeout)
            .context("Failed to create metadata source")?;
        Self::with_source(settings, Arc::new(source))
    }

    pub fn with_source(settings: Settings, source: Arc<dyn MetadataSource>) -> Result<Self> {
        let db_path = settings.expanded_db_path();
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        let storage = Arc::new(Storage::open(&db_path).with_context(|| {
            format!(
                "Failed to open storage at {:?} (is a daemon already using it?)",
                db_path
            )
        })?);

        let index_config = SearchIndexConfig::new(settings.expanded_search_index_path())
            .with_memory_mb(settings.indexer.writer_memory_mb);
        let store =
            Arc::new(DocumentStore::open(index_config).context("Failed to open search index")?);

        let config = IndexerConfig::from_settings(&settings.indexer)
            .context("Invalid indexer configuration")?;
        let manager = Arc::new(
            IndexerManager::new(store, source, storage.clone(), config)
                .context("Failed to load retry ledger")?,
        );
        let service = DirectoryService::new(manager.clone());

        Ok(Self {
            settings,
            storage,
            manager,
            service,
        })
    }

    /// Start dispatching, including items left pending by an earlier run.
    pub fn start(&self) -> Result<usize> {
        self.manager.start().context("Failed to start indexer")
    }

    /// Wait for queued work, then stop. False if work was still running.
    pub async fn drain(&self) -> bool {
        let timeout = self.manager.config().fetch_timeout + DRAIN_GRACE;
        let idle = self.manager.wait_idle(timeout).await;
        if !idle {
            warn!(?timeout, "Queued work did not finish in time, it stays pending");
        }
        let stopped = self.manager.shutdown(timeout).await;
        self.flush();
        stopped && idle
    }

    /// Flush RocksDB memtables; failures are only logged.
    pub fn flush(&self) {
        if let Err(e) = self.storage.flush() {
            warn!(error = %e, "Failed to flush storage");
        }
    }
}

/// Start the directory daemon.
///
/// 1. Load configuration
/// 2. Open RocksDB storage and the search index
/// 3. Start the indexer and register the scheduled jobs
/// 4. Run until SIGINT/SIGTERM, then shut down scheduler and indexer
pub async fn start_daemon(args: &GlobalArgs) -> Result<()> {
    let settings = load_settings(args)?;
    init_logging(&settings.log_level)?;

    info!("Directory daemon starting...");
    info!("Configuration:");
    info!("  Database path: {}", settings.db_path);
    info!("  Search index path: {}", settings.search_index_path);
    info!("  Metadata source: {}", settings.metadata_source.base_url);
    info!("  Log level: {}", settings.log_level);

    let runtime = Runtime::open(settings)?;
    runtime.start()?;

    let scheduler_settings = &runtime.settings.scheduler;
    let mut scheduler = SchedulerService::new(SchedulerConfig::from_settings(scheduler_settings))
        .await
        .context("Failed to create scheduler")?;
    create_retry_sweep_job(
        &scheduler,
        runtime.manager.clone(),
        RetrySweepJobConfig {
            cron: scheduler_settings.sweep_cron.clone(),
            timezone: None,
        },
    )
    .await
    .context("Failed to register retry sweep job")?;
    if scheduler_settings.resync_enabled {
        create_resync_job(
            &scheduler,
            runtime.manager.clone(),
            ResyncJobConfig {
                cron: scheduler_settings.resync_cron.clone(),
                timezone: None,
            },
        )
        .await
        .context("Failed to register resync job")?;
    }
    scheduler.start().await.context("Failed to start scheduler")?;

    shutdown_signal().await?;

    let timeout = Duration::from_secs(runtime.settings.scheduler.shutdown_timeout_secs);
    if let Err(e) = scheduler.shutdown().await {
        warn!(error = %e, "Scheduler shutdown failed");
    }
    runtime.manager.shutdown(timeout).await;
    runtime.flush();
    info!("Directory daemon stopped");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("Failed to install Ctrl+C handler")?;
                info!("Received Ctrl+C, shutting down...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("Failed to install Ctrl+C handler")?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}

/// Run a one-off operator command and print its result.
pub async fn run_command(args: &GlobalArgs, command: Commands) -> Result<()> {
    let settings = load_settings(args)?;
    init_logging(&settings.log_level)?;
    let runtime = Runtime::open(settings)?;
    let output = execute(&runtime, command).await?;
    print!("{}", output);
    Ok(())
}

/// Execute `command` against an opened runtime and render its output.
pub async fn execute(runtime: &Runtime, command: Commands) -> Result<String> {
    let service = &runtime.service;
    let manager = &runtime.manager;

    match command {
        Commands::Start => anyhow::bail!("start is not an operator command"),
        Commands::Put {
            participant,
            owner,
            host,
        } => {
            runtime.start()?;
            service.put_participant(&participant, &owner, &host)?;
            let drained = runtime.drain().await;
            let exists = service.participant_exists(&participant)?;
            Ok(format!(
                "Accepted {}\n{}\n",
                participant,
                completion(drained, if exists { "indexed" } else { "not indexed" })
            ))
        }
        Commands::Delete {
            participant,
            owner,
            host,
        } => {
            runtime.start()?;
            service.delete_participant(&participant, &owner, &host)?;
            let drained = runtime.drain().await;
            Ok(format!(
                "Accepted {}\n{}\n",
                participant,
                completion(drained, "tombstoned")
            ))
        }
        Commands::Exists { participant } => {
            let exists = service.participant_exists(&participant)?;
            Ok(format!("{}\n", exists))
        }
        Commands::Search {
            query,
            limit,
            include_deleted,
        } => {
            let mode = if include_deleted {
                QueryMode::IncludeDeleted
            } else {
                QueryMode::ExcludeDeleted
            };
            let documents = service.search(&query, mode, limit)?;
            Ok(render_documents(&documents))
        }
        Commands::Ledger => Ok(render_ledger(&manager.ledger_entries().await)),
        Commands::DeadLetter => Ok(render_dead_letters(&manager.dead_letter_entries()?)),
        Commands::Requeue { id, owner, host } => {
            runtime.start()?;
            let result = manager.requeue_dead_letter(&id, &owner, &host)?;
            let drained = runtime.drain().await;
            Ok(format!(
                "Requeued {} ({:?})\n{}\n",
                id,
                result,
                completion(drained, "processed")
            ))
        }
        Commands::Resync => {
            runtime.start()?;
            let queued = service.resync_all("cli", "localhost").await?;
            let drained = runtime.drain().await;
            Ok(format!(
                "Queued {} participant(s)\n{}\n",
                queued,
                completion(drained, "processed")
            ))
        }
        Commands::Sweep => {
            let stats = manager.run_sweep().await?;
            Ok(render_sweep(&stats))
        }
        Commands::Stats => {
            let stats = runtime.storage.get_stats()?;
            Ok(format!(
                "pending={} ledger={} dead_letters={} documents={} disk_bytes={}\n",
                stats.pending_count,
                stats.ledger_count,
                stats.dead_letter_count,
                manager.store().num_docs(),
                stats.disk_usage_bytes
            ))
        }
    }
}

fn completion(drained: bool, done: &str) -> String {
    if drained {
        format!("Done: {}", done)
    } else {
        "Still running, left pending for the next start".to_string()
    }
}

pub fn render_documents(documents: &[StoredDocument]) -> String {
    if documents.is_empty() {
        return "No documents found\n".to_string();
    }
    let mut out = String::new();
    for doc in documents {
        let _ = writeln!(
            out,
            "{}#{}  {}  [{}]{}",
            doc.participant,
            doc.entity_index,
            doc.entity.primary_name(),
            doc.entity.country_code,
            if doc.deleted { "  (deleted)" } else { "" }
        );
    }
    let _ = writeln!(out, "{} document(s)", documents.len());
    out
}

pub fn render_ledger(entries: &[RetryLedgerEntry]) -> String {
    if entries.is_empty() {
        return "Retry ledger is empty\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "{}  {}  retries={}  next={}  expires={}",
            entry.id,
            entry.work_item.log_text(),
            entry.retry_count,
            entry.next_retry_at.to_rfc3339(),
            entry.max_retry_at.to_rfc3339()
        );
    }
    out
}

pub fn render_dead_letters(entries: &[DeadLetterEntry]) -> String {
    if entries.is_empty() {
        return "No dead letters\n".to_string();
    }
    let mut out = String::new();
    for dead in entries {
        let _ = writeln!(
            out,
            "{}  {}  retries={}  expired={}",
            dead.id(),
            dead.entry.work_item.log_text(),
            dead.entry.retry_count,
            dead.expired_at.to_rfc3339()
        );
    }
    out
}

pub fn render_sweep(stats: &SweepStats) -> String {
    format!(
        "expired={} retried={} succeeded={} failed={} skipped={}\n",
        stats.expired, stats.retried, stats.succeeded, stats.failed, stats.skipped
    )
}
