//! Periodic resync job: queue a SYNC for every participant with live
//! documents so cards changed at the source are picked up.

use std::sync::Arc;

use directory_indexer::IndexerManager;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{JobOutput, OverlapPolicy, SchedulerError, SchedulerService};

pub const JOB_NAME: &str = "participant_resync";

const OWNER_ID: &str = "scheduler";
const REQUESTING_HOST: &str = "localhost";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResyncJobConfig {
    /// Cron expression (default: 3 AM daily)
    pub cron: String,
    pub timezone: Option<String>,
}

impl Default for ResyncJobConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 3 * * *".to_string(),
            timezone: None,
        }
    }
}

pub async fn run_resync(manager: &IndexerManager) -> Result<JobOutput, String> {
    let queued = manager
        .queue_resync_all(OWNER_ID, REQUESTING_HOST)
        .await
        .map_err(|e| e.to_string())?;
    Ok(JobOutput::new().with_metadata("queued", queued))
}

pub async fn create_resync_job(
    scheduler: &SchedulerService,
    manager: Arc<IndexerManager>,
    config: ResyncJobConfig,
) -> Result<(), SchedulerError> {
    scheduler
        .register_job(
            JOB_NAME,
            &config.cron,
            config.timezone.as_deref(),
            OverlapPolicy::Skip,
            move || {
                let manager = manager.clone();
                async move { run_resync(&manager).await }
            },
        )
        .await?;

    info!(cron = %config.cron, "Registered participant resync job");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::test_support::{manager, CARD};
    use directory_indexer::{MockResponse, ProcessOutcome};
    use directory_types::{ActionType, ParticipantIdentifier, WorkItem};

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resync_queues_indexed_participants() {
        let (manager, source, _temp) = manager();
        assert_eq!(
            run_resync(&manager).await.unwrap().metadata.get("queued").map(String::as_str),
            Some("0")
        );

        let pid = ParticipantIdentifier::with_default_scheme("9915:test").unwrap();
        source.set_response(&pid, MockResponse::card(CARD));
        let item = WorkItem::new(pid, ActionType::CreateOrUpdate, "owner", "127.0.0.1");
        assert_eq!(
            manager.process_work_item(&item).await.unwrap(),
            ProcessOutcome::Indexed { documents: 1 }
        );

        let output = run_resync(&manager).await.unwrap();
        assert_eq!(output.metadata.get("queued").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_default_config() {
        let config = ResyncJobConfig::default();
        assert_eq!(config.cron, "0 0 3 * * *");
    }
}
