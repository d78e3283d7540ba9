//! Configuration management for the sync service.

use outbox_engine::DEFAULT_MAX_ATTEMPTS;
use std::env;
use std::path::PathBuf;

/// Service configuration, loadable from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Execution attempts per operation before it is dropped
    pub max_attempts: u32,
    /// Namespace prefix for every persisted key
    pub storage_prefix: String,
    /// Directory backing the file store
    pub storage_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            storage_prefix: "@outbox/".to_string(),
            storage_dir: PathBuf::from("./.outbox"),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_attempts = match env::var("OUTBOX_MAX_ATTEMPTS") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidMaxAttempts(raw))?,
            Err(_) => defaults.max_attempts,
        };

        let storage_prefix =
            env::var("OUTBOX_STORAGE_PREFIX").unwrap_or(defaults.storage_prefix);

        let storage_dir = env::var("OUTBOX_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_dir);

        Self {
            max_attempts,
            storage_prefix,
            storage_dir,
        }
        .validated()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_storage_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.storage_prefix = prefix.into();
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    /// Check invariants the engine relies on.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts("0".to_string()));
        }
        if self.storage_prefix.is_empty() {
            return Err(ConfigError::EmptyStoragePrefix);
        }
        Ok(self)
    }

    /// Key holding the serialized operation queue.
    pub fn queue_key(&self) -> String {
        format!("{}sync_queue", self.storage_prefix)
    }

    /// Key holding the last successful drain time.
    pub fn last_sync_key(&self) -> String {
        format!("{}last_sync_time", self.storage_prefix)
    }

    /// Key holding cached domain data for offline reads.
    pub fn offline_data_key(&self) -> String {
        format!("{}offline_data", self.storage_prefix)
    }
}

/// Configuration errors.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid OUTBOX_MAX_ATTEMPTS value: {0} (expected an integer >= 1)")]
    InvalidMaxAttempts(String),

    #[error("OUTBOX_STORAGE_PREFIX must not be empty")]
    EmptyStoragePrefix,
}
