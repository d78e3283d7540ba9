//! Error types for the Outbox engine.

use thiserror::Error;

/// All possible errors from the Outbox engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Parsing errors
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("unknown operation kind: {0}")]
    UnknownOperationKind(String),

    #[error("invalid operation id: {0}")]
    InvalidOperationId(String),

    // State errors
    #[error("invalid persisted queue: {0}")]
    InvalidQueue(String),

    #[error("invalid offline data: {0}")]
    InvalidOfflineData(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::UnknownEntityType("invoice".into());
        assert_eq!(err.to_string(), "unknown entity type: invoice");

        let err = Error::InvalidOperationId("abc".into());
        assert_eq!(err.to_string(), "invalid operation id: abc");

        let err = Error::InvalidQueue("expected value at line 1 column 1".into());
        assert_eq!(
            err.to_string(),
            "invalid persisted queue: expected value at line 1 column 1"
        );
    }
}
