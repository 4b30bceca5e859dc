//! Single-flight control for scheduled jobs.
//!
//! A sweep that outlives its interval must not be started a second time
//! while the first run still holds the ledger.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OverlapPolicy {
    /// Drop a tick while the previous run is active
    #[default]
    Skip,
    /// Start every tick
    Concurrent,
}

/// Counts active runs of one job and refuses overlapping ones under
/// [`OverlapPolicy::Skip`].
#[derive(Clone)]
pub struct OverlapGuard {
    active: Arc<AtomicUsize>,
    policy: OverlapPolicy,
}

impl OverlapGuard {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            policy,
        }
    }

    /// `None` means the tick must be skipped.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        match self.policy {
            OverlapPolicy::Skip => self
                .active
                .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
                .ok()?,
            OverlapPolicy::Concurrent => self.active.fetch_add(1, Ordering::AcqRel),
        };
        Some(RunGuard {
            active: self.active.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.active_runs() > 0
    }

    pub fn active_runs(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }
}

/// Marks one active run; released on drop, panics included.
pub struct RunGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_refuses_second_run() {
        let guard = OverlapGuard::new(OverlapPolicy::Skip);
        let first = guard.try_acquire();
        assert!(first.is_some());
        assert!(guard.try_acquire().is_none());
        assert!(guard.is_running());

        drop(first);
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_concurrent_counts_runs() {
        let guard = OverlapGuard::new(OverlapPolicy::Concurrent);
        let a = guard.try_acquire().unwrap();
        let b = guard.try_acquire().unwrap();
        assert_eq!(guard.active_runs(), 2);
        drop(a);
        assert_eq!(guard.active_runs(), 1);
        drop(b);
        assert!(!guard.is_running());
    }

    #[test]
    fn test_released_on_panic() {
        let guard = OverlapGuard::new(OverlapPolicy::Skip);
        let cloned = guard.clone();
        let result = std::thread::spawn(move || {
            let _run = cloned.try_acquire().unwrap();
            panic!("job failed");
        })
        .join();
        assert!(result.is_err());
        assert!(!guard.is_running());
    }
}
