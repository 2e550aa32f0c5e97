//! Configuration module for Workbench.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::reliability::RetryConfig;
use crate::{Result, WorkbenchError};

/// Record store (database) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/workbench.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the blob store.
    #[serde(default = "default_storage_path")]
    pub path: String,
    /// Maximum size of a single file in megabytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_mb: u64,
}

fn default_storage_path() -> String {
    "data/blobs".to_string()
}

fn default_max_file_size() -> u64 {
    10
}

impl StorageConfig {
    /// Maximum file size in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            max_file_size_mb: default_max_file_size(),
        }
    }
}

/// Retry configuration for store operations.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Whether failed store operations are retried at all.
    #[serde(default = "default_retry_enabled")]
    pub enabled: bool,
    /// Maximum number of attempts per operation.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the second attempt in milliseconds; doubles afterwards.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Upper bound of the random jitter added to each delay, in milliseconds.
    #[serde(default = "default_max_jitter")]
    pub max_jitter_ms: u64,
}

fn default_retry_enabled() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_jitter() -> u64 {
    1000
}

impl RetrySettings {
    /// Convert to the runtime retry configuration.
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            enable_retry: self.enabled,
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: default_retry_enabled(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            max_jitter_ms: default_max_jitter(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/workbench.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Blob storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Retry configuration.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(WorkbenchError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| WorkbenchError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `WORKBENCH_DATABASE_PATH`: Override the database file path
    /// - `WORKBENCH_STORAGE_PATH`: Override the blob store directory
    /// - `WORKBENCH_LOG_LEVEL`: Override the log level
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(path) = non_empty("WORKBENCH_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(path) = non_empty("WORKBENCH_STORAGE_PATH") {
            self.storage.path = path;
        }
        if let Some(level) = non_empty("WORKBENCH_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(WorkbenchError::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.storage.max_file_size_mb == 0 {
            return Err(WorkbenchError::Config(
                "storage.max_file_size_mb must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
