//! Configuration loading for the business directory.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/business-directory/config.toml.

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;

const APP_NAME: &str = "business-directory";

/// Indexer pipeline settings: retry policy, fetch timeout, worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexerSettings {
    /// Fixed delay between retries of a failed work item.
    #[serde(default = "default_retry_interval_minutes")]
    pub retry_interval_minutes: u64,

    /// Retry window, counted from work item creation.
    #[serde(default = "default_max_retry_hours")]
    pub max_retry_hours: u64,

    /// Upper bound for one metadata fetch.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Work items processed concurrently.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Memory budget of the index writer.
    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,
}

fn default_retry_interval_minutes() -> u64 {
    5
}

fn default_max_retry_hours() -> u64 {
    24
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_writer_memory_mb() -> usize {
    50
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            retry_interval_minutes: default_retry_interval_minutes(),
            max_retry_hours: default_max_retry_hours(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            writer_memory_mb: default_writer_memory_mb(),
        }
    }
}

impl IndexerSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.retry_interval_minutes == 0 {
            return Err("retry_interval_minutes must be > 0".to_string());
        }
        if self.fetch_timeout_secs == 0 {
            return Err("fetch_timeout_secs must be > 0".to_string());
        }
        if self.max_concurrent_jobs == 0 {
            return Err("max_concurrent_jobs must be > 0".to_string());
        }
        if self.writer_memory_mb < 15 {
            return Err(format!(
                "writer_memory_mb must be >= 15, got {}",
                self.writer_memory_mb
            ));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Where participant metadata (business cards, service groups) is fetched from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSourceSettings {
    /// Base URL of the metadata publisher
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_user_agent() -> String {
    format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION"))
}

impl Default for MetadataSourceSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

/// Background job schedules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Retry/expiry sweep (6-field cron, seconds first)
    #[serde(default = "default_sweep_cron")]
    pub sweep_cron: String,

    /// Periodic SYNC of every indexed participant. Off unless enabled.
    #[serde(default)]
    pub resync_enabled: bool,

    #[serde(default = "default_resync_cron")]
    pub resync_cron: String,

    /// IANA timezone for cron evaluation
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_sweep_cron() -> String {
    "0 * * * * *".to_string()
}

fn default_resync_cron() -> String {
    "0 0 3 * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            sweep_cron: default_sweep_cron(),
            resync_enabled: false,
            resync_cron: default_resync_cron(),
            timezone: default_timezone(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory (pending queue, retry ledger)
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Path to the full-text index directory
    #[serde(default = "default_search_index_path")]
    pub search_index_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub indexer: IndexerSettings,

    #[serde(default)]
    pub metadata_source: MetadataSourceSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

fn data_dir_path(leaf: &str) -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join(leaf))
        .unwrap_or_else(|| PathBuf::from(".").join(leaf))
        .to_string_lossy()
        .to_string()
}

fn default_db_path() -> String {
    data_dir_path("db")
}

fn default_search_index_path() -> String {
    data_dir_path("search-index")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            search_index_path: default_search_index_path(),
            log_level: default_log_level(),
            indexer: IndexerSettings::default(),
            metadata_source: MetadataSourceSettings::default(),
            scheduler: SchedulerSettings::default(),
        }
    }
}

fn config_err(e: config::ConfigError) -> DirectoryError {
    DirectoryError::Config(e.to_string())
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/business-directory/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (DIRECTORY_*, nested keys joined with `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, DirectoryError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");
        let indexer = IndexerSettings::default();
        let source = MetadataSourceSettings::default();
        let scheduler = SchedulerSettings::default();

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(config_err)?
            .set_default("search_index_path", default_search_index_path())
            .map_err(config_err)?
            .set_default("log_level", default_log_level())
            .map_err(config_err)?
            .set_default(
                "indexer.retry_interval_minutes",
                indexer.retry_interval_minutes as i64,
            )
            .map_err(config_err)?
            .set_default("indexer.max_retry_hours", indexer.max_retry_hours as i64)
            .map_err(config_err)?
            .set_default("indexer.fetch_timeout_secs", indexer.fetch_timeout_secs as i64)
            .map_err(config_err)?
            .set_default(
                "indexer.max_concurrent_jobs",
                indexer.max_concurrent_jobs as i64,
            )
            .map_err(config_err)?
            .set_default("indexer.writer_memory_mb", indexer.writer_memory_mb as i64)
            .map_err(config_err)?
            .set_default("metadata_source.base_url", source.base_url)
            .map_err(config_err)?
            .set_default("metadata_source.user_agent", source.user_agent)
            .map_err(config_err)?
            .set_default("scheduler.sweep_cron", scheduler.sweep_cron)
            .map_err(config_err)?
            .set_default("scheduler.resync_enabled", scheduler.resync_enabled)
            .map_err(config_err)?
            .set_default("scheduler.resync_cron", scheduler.resync_cron)
            .map_err(config_err)?
            .set_default("scheduler.timezone", scheduler.timezone)
            .map_err(config_err)?
            .set_default(
                "scheduler.shutdown_timeout_secs",
                scheduler.shutdown_timeout_secs as i64,
            )
            .map_err(config_err)?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // DIRECTORY_DB_PATH, DIRECTORY_INDEXER__MAX_RETRY_HOURS, ...
        builder = builder.add_source(
            Environment::with_prefix("DIRECTORY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .map_err(config_err)?
            .try_deserialize()
            .map_err(config_err)?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), DirectoryError> {
        self.indexer
            .validate()
            .map_err(|e| DirectoryError::Config(format!("indexer: {e}")))?;
        if self.metadata_source.base_url.trim().is_empty() {
            return Err(DirectoryError::Config(
                "metadata_source.base_url must not be empty".to_string(),
            ));
        }
        if self.scheduler.shutdown_timeout_secs == 0 {
            return Err(DirectoryError::Config(
                "scheduler.shutdown_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Expand ~ in search_index_path to the home directory
    pub fn expanded_search_index_path(&self) -> PathBuf {
        expand_home(&self.search_index_path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.indexer.retry_interval_minutes, 5);
        assert_eq!(settings.indexer.max_retry_hours, 24);
        assert_eq!(settings.scheduler.sweep_cron, "0 * * * * *");
        assert!(!settings.scheduler.resync_enabled);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_with_cli_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
db_path = "/tmp/directory-db"

[indexer]
max_retry_hours = 2
fetch_timeout_secs = 3

[metadata_source]
base_url = "https://smp.example.org"
"#
        )
        .unwrap();

        let settings = Settings::load(Some(&file.path().to_string_lossy())).unwrap();
        assert_eq!(settings.db_path, "/tmp/directory-db");
        assert_eq!(settings.indexer.max_retry_hours, 2);
        assert_eq!(settings.indexer.fetch_timeout(), Duration::from_secs(3));
        // Unset keys keep their defaults
        assert_eq!(settings.indexer.retry_interval_minutes, 5);
        assert_eq!(settings.metadata_source.base_url, "https://smp.example.org");
    }

    #[test]
    fn test_indexer_settings_validation() {
        let mut indexer = IndexerSettings::default();
        assert!(indexer.validate().is_ok());

        indexer.retry_interval_minutes = 0;
        assert!(indexer.validate().is_err());

        indexer.retry_interval_minutes = 5;
        indexer.writer_memory_mb = 1;
        assert!(indexer.validate().is_err());
    }

    #[test]
    fn test_expand_home() {
        let settings = Settings {
            db_path: "/absolute/db".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.expanded_db_path(), PathBuf::from("/absolute/db"));
    }

    #[test]
    fn test_settings_serialization() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let decoded: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, decoded);
    }
}
