//! Scheduler configuration.

use directory_types::SchedulerSettings;
use serde::{Deserialize, Serialize};

use crate::SchedulerError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA timezone used by jobs that don't name their own
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// How long shutdown waits for running jobs
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_settings(settings: &SchedulerSettings) -> Self {
        Self {
            default_timezone: settings.timezone.clone(),
            shutdown_timeout_secs: settings.shutdown_timeout_secs,
        }
    }

    /// Parse the default timezone.
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz, SchedulerError> {
        parse_timezone(&self.default_timezone)
    }
}

pub(crate) fn parse_timezone(name: &str) -> Result<chrono_tz::Tz, SchedulerError> {
    name.parse::<chrono_tz::Tz>()
        .map_err(|_| SchedulerError::InvalidTimezone(name.to_string()))
}
