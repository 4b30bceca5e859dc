//! Jobs the daemon registers.
//!
//! - **retry_sweep**: expire stale ledger entries, retry the due ones
//! - **resync**: periodic SYNC of every indexed participant

pub mod resync;
pub mod retry_sweep;

pub use resync::{create_resync_job, run_resync, ResyncJobConfig};
pub use retry_sweep::{create_retry_sweep_job, run_retry_sweep, RetrySweepJobConfig};
