//! Background job scheduler for the business directory daemon.
//!
//! Wraps `tokio-cron-scheduler` with timezone-aware cron jobs, a
//! single-flight guard per job and a registry of job status.
//!
//! # Example
//!
//! ```ignore
//! use directory_scheduler::{jobs, SchedulerConfig, SchedulerService};
//!
//! let scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//! jobs::create_retry_sweep_job(&scheduler, manager.clone(), Default::default()).await?;
//! scheduler.start().await?;
//! ```

mod config;
mod error;
mod overlap;
mod registry;
mod scheduler;

pub mod jobs;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use overlap::{OverlapGuard, OverlapPolicy, RunGuard};
pub use registry::{JobOutput, JobRegistry, JobResult, JobStatus};
pub use scheduler::{validate_cron_expression, SchedulerService};
