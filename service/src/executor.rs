//! The boundary to the backend.
//!
//! An [`OperationExecutor`] performs the real mutation for one queued
//! operation. It is injected into the engine at construction time.
//!
//! Executors must return `Err` for every failure so the engine can tell
//! success from failure, and should be idempotent per entity and kind: a
//! retry may replay an operation whose previous attempt partially succeeded.
//! The engine applies no timeout of its own; an executor call that never
//! completes stalls its entity's partition, so executors should bound their
//! own network calls.

use async_trait::async_trait;
use futures::future::BoxFuture;
use outbox_engine::Operation;

/// Failure reported by an executor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ExecuteError {
    pub message: String,
}

impl ExecuteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for ExecuteError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ExecuteError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Performs the backend mutation described by an operation.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    async fn execute(&self, op: &Operation) -> Result<(), ExecuteError>;
}

/// Adapts a closure returning a boxed future into an executor.
///
/// ```rust
/// use outbox_service::{ExecuteError, FnExecutor};
///
/// let executor = FnExecutor::new(|op| {
///     let entity = op.entity_id.clone();
///     Box::pin(async move {
///         if entity.is_empty() {
///             return Err(ExecuteError::new("missing entity id"));
///         }
///         Ok(())
///     })
/// });
/// # let _ = executor;
/// ```
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(&Operation) -> BoxFuture<'static, Result<(), ExecuteError>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> OperationExecutor for FnExecutor<F>
where
    F: Fn(&Operation) -> BoxFuture<'static, Result<(), ExecuteError>> + Send + Sync,
{
    async fn execute(&self, op: &Operation) -> Result<(), ExecuteError> {
        (self.f)(op).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbox_engine::{EntityType, OperationKind};
    use serde_json::json;

    #[tokio::test]
    async fn fn_executor_forwards_result() {
        let executor = FnExecutor::new(|op: &Operation| {
            let fail = op.kind == OperationKind::Delete;
            Box::pin(async move {
                if fail {
                    Err(ExecuteError::new("deletes are not allowed"))
                } else {
                    Ok(())
                }
            })
        });

        let mut op = Operation::new(
            "0000000001000-000000",
            OperationKind::Create,
            EntityType::Comment,
            "c1",
            json!({"text": "hi"}),
            1000,
        );
        assert!(executor.execute(&op).await.is_ok());

        op.kind = OperationKind::Delete;
        let err = executor.execute(&op).await.unwrap_err();
        assert_eq!(err.to_string(), "deletes are not allowed");
    }
}
