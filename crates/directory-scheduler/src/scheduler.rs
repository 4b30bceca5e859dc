//! Cron scheduler service.
//!
//! Every job runs under an [`OverlapGuard`] and reports into the shared
//! [`JobRegistry`]. Shutdown stops new ticks first, then waits for the
//! runs already in progress.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::parse_timezone;
use crate::{JobOutput, JobRegistry, JobResult, OverlapGuard, OverlapPolicy};
use crate::{SchedulerConfig, SchedulerError};

const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Validate a 6-field cron expression (seconds first).
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    Job::new_async(expr, |_uuid, _lock| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron {
            expression: expr.to_string(),
            reason: e.to_string(),
        })
}

pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    shutdown_token: CancellationToken,
    is_running: AtomicBool,
}

impl SchedulerService {
    /// Fails early on an unknown default timezone.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.parse_timezone()?;
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            registry: Arc::new(JobRegistry::new()),
            shutdown_token: CancellationToken::new(),
            is_running: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        if let Err(e) = self.scheduler.start().await {
            self.is_running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        info!(jobs = self.registry.job_count(), "Scheduler started");
        Ok(())
    }

    /// Stop scheduling and wait up to the configured timeout for running jobs.
    ///
    /// Returns whether every job finished in time.
    pub async fn shutdown(&mut self) -> Result<bool, SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }
        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();

        let deadline = Instant::now() + Duration::from_secs(self.config.shutdown_timeout_secs);
        while self.registry.any_running() && Instant::now() < deadline {
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }
        let drained = !self.registry.any_running();
        if !drained {
            warn!("Scheduler shutdown timed out with jobs still running");
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!(error = %e, "Error during scheduler shutdown");
        }
        self.is_running.store(false, Ordering::SeqCst);
        info!(drained, "Scheduler shutdown complete");
        Ok(drained)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a named cron job.
    ///
    /// `timezone` falls back to the configured default. A tick that fires
    /// after shutdown began, or while an earlier run is still active under
    /// [`OverlapPolicy::Skip`], is recorded as skipped.
    pub async fn register_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        overlap: OverlapPolicy,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, String>> + Send + 'static,
    {
        let tz: Tz = match timezone {
            Some(tz) => parse_timezone(tz)?,
            None => self.config.parse_timezone()?,
        };
        validate_cron_expression(cron_expr)?;
        if !self.registry.register(name, cron_expr, tz.name()) {
            return Err(SchedulerError::DuplicateJob(name.to_string()));
        }

        let job_name: Arc<str> = Arc::from(name);
        let job_fn = Arc::new(job_fn);
        let guard = OverlapGuard::new(overlap);
        let registry = self.registry.clone();
        let token = self.shutdown_token.clone();

        let job = Job::new_async_tz(cron_expr, tz, move |_uuid, _lock| {
            let name = job_name.clone();
            let job_fn = job_fn.clone();
            let guard = guard.clone();
            let registry = registry.clone();
            let token = token.clone();

            Box::pin(async move {
                if token.is_cancelled() {
                    registry.record_skipped(&name, "shutting down");
                    return;
                }
                let Some(_run) = guard.try_acquire() else {
                    warn!(job = %name, "Previous run still active, skipping");
                    registry.record_skipped(&name, "previous run still active");
                    return;
                };

                info!(job = %name, "Job started");
                registry.record_start(&name);
                let start = Instant::now();
                let result = job_fn().await;
                let duration_ms = start.elapsed().as_millis() as u64;

                match result {
                    Ok(output) => {
                        info!(job = %name, duration_ms, "Job completed");
                        registry.record_complete_with_output(
                            &name,
                            JobResult::Success,
                            duration_ms,
                            output,
                        );
                    }
                    Err(e) => {
                        error!(job = %name, duration_ms, error = %e, "Job failed");
                        registry.record_complete(&name, JobResult::Failed(e), duration_ms);
                    }
                }
            })
        })
        .map_err(|e| SchedulerError::InvalidCron {
            expression: cron_expr.to_string(),
            reason: e.to_string(),
        })?;

        let uuid = self.scheduler.add(job).await?;
        info!(job = %name, uuid = %uuid, cron = %cron_expr, timezone = %tz.name(), "Job registered");
        Ok(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn quick_config() -> SchedulerConfig {
        SchedulerConfig {
            shutdown_timeout_secs: 2,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_and_shutdown() {
        let mut scheduler = SchedulerService::new(quick_config()).await.unwrap();
        assert!(!scheduler.is_running());

        scheduler.start().await.unwrap();
        assert!(matches!(
            scheduler.start().await,
            Err(SchedulerError::AlreadyRunning)
        ));

        let token = scheduler.shutdown_token();
        assert!(scheduler.shutdown().await.unwrap());
        assert!(token.is_cancelled());
        assert!(!scheduler.is_running());
        assert!(matches!(
            scheduler.shutdown().await,
            Err(SchedulerError::NotRunning)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_default_timezone() {
        let config = SchedulerConfig {
            default_timezone: "Invalid/Zone".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            SchedulerService::new(config).await,
            Err(SchedulerError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_validate_cron_expression() {
        assert!(validate_cron_expression("0 * * * * *").is_ok());
        assert!(validate_cron_expression("0 0 3 * * *").is_ok());
        assert!(validate_cron_expression("*/10 * * * * *").is_ok());
        assert!(validate_cron_expression("").is_err());
        assert!(validate_cron_expression("every minute").is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_rejects_bad_input() {
        let scheduler = SchedulerService::new(quick_config()).await.unwrap();
        let noop = || async { Ok::<_, String>(JobOutput::new()) };

        assert!(matches!(
            scheduler
                .register_job("a", "not cron", None, OverlapPolicy::Skip, noop)
                .await,
            Err(SchedulerError::InvalidCron { .. })
        ));
        assert!(matches!(
            scheduler
                .register_job("a", "0 * * * * *", Some("Nowhere/City"), OverlapPolicy::Skip, noop)
                .await,
            Err(SchedulerError::InvalidTimezone(_))
        ));

        scheduler
            .register_job("a", "0 * * * * *", Some("Europe/Vienna"), OverlapPolicy::Skip, noop)
            .await
            .unwrap();
        assert!(matches!(
            scheduler
                .register_job("a", "0 * * * * *", None, OverlapPolicy::Skip, noop)
                .await,
            Err(SchedulerError::DuplicateJob(_))
        ));
        assert_eq!(
            scheduler.registry().get_status("a").unwrap().timezone,
            "Europe/Vienna"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_runs_and_is_recorded() {
        let mut scheduler = SchedulerService::new(quick_config()).await.unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        scheduler
            .register_job("tick", "* * * * * *", None, OverlapPolicy::Skip, move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok::<_, String>(JobOutput::new().with_metadata("run", n))
                }
            })
            .await
            .unwrap();
        scheduler.start().await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while runs.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        scheduler.shutdown().await.unwrap();

        assert!(runs.load(Ordering::SeqCst) >= 1);
        let status = scheduler.registry().get_status("tick").unwrap();
        assert!(status.run_count >= 1);
        assert_eq!(status.error_count, 0);
        assert!(status.last_run_metadata.contains_key("run"));
    }
}
