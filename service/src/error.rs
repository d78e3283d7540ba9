//! Unified error handling for the sync service.

use crate::config::ConfigError;

/// Failures of the platform key/value store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Service error type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A manual sync was requested with no connectivity.
    #[error("Cannot sync while offline")]
    Offline,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Engine error: {0}")]
    Engine(#[from] outbox_engine::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SyncError {
    pub fn is_offline(&self) -> bool {
        matches!(self, SyncError::Offline)
    }
}

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(SyncError::Offline.to_string(), "Cannot sync while offline");
        assert!(SyncError::Offline.is_offline());

        let err: SyncError = StorageError::Unavailable("disk full".into()).into();
        assert_eq!(err.to_string(), "Storage error: Storage unavailable: disk full");
        assert!(!err.is_offline());

        let err: SyncError = outbox_engine::Error::UnknownEntityType("invoice".into()).into();
        assert_eq!(err.to_string(), "Engine error: unknown entity type: invoice");
    }
}
