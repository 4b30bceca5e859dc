//! Retry sweep job.
//!
//! Expires ledger entries past their retry window into the dead-letter
//! list, then retries every entry whose next attempt is due.

use std::sync::Arc;

use directory_indexer::IndexerManager;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{JobOutput, OverlapPolicy, SchedulerError, SchedulerService};

pub const JOB_NAME: &str = "retry_sweep";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySweepJobConfig {
    /// Cron expression (default: every minute)
    pub cron: String,
    /// None uses the scheduler default
    pub timezone: Option<String>,
}

impl Default for RetrySweepJobConfig {
    fn default() -> Self {
        Self {
            cron: "0 * * * * *".to_string(),
            timezone: None,
        }
    }
}

/// One sweep, reported as job output.
pub async fn run_retry_sweep(manager: &IndexerManager) -> Result<JobOutput, String> {
    let stats = manager.run_sweep().await.map_err(|e| e.to_string())?;
    Ok(JobOutput::new()
        .with_metadata("expired", stats.expired)
        .with_metadata("retried", stats.retried)
        .with_metadata("succeeded", stats.succeeded)
        .with_metadata("failed", stats.failed)
        .with_metadata("skipped", stats.skipped))
}

/// Register the sweep. Overlapping ticks are skipped since a sweep holds
/// the ledger for its whole run.
pub async fn create_retry_sweep_job(
    scheduler: &SchedulerService,
    manager: Arc<IndexerManager>,
    config: RetrySweepJobConfig,
) -> Result<(), SchedulerError> {
    scheduler
        .register_job(
            JOB_NAME,
            &config.cron,
            config.timezone.as_deref(),
            OverlapPolicy::Skip,
            move || {
                let manager = manager.clone();
                async move { run_retry_sweep(&manager).await }
            },
        )
        .await?;

    info!(cron = %config.cron, "Registered retry sweep job");
    Ok(())
}
