//! Operation types for expressing queued mutations.
//!
//! Every state-changing call made while the backend may be unreachable is
//! captured as an [`Operation`] and kept until the backend accepts it or the
//! retry budget is exhausted.

use crate::{error::Result, EntityId, Error, OperationId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the operation does to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "CREATE",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(OperationKind::Create),
            "UPDATE" => Ok(OperationKind::Update),
            "DELETE" => Ok(OperationKind::Delete),
            _ => Err(Error::UnknownOperationKind(s.to_string())),
        }
    }
}

/// The domain aggregate an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Expense,
    Event,
    Participant,
    Comment,
    Payment,
    Template,
    Reminder,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Expense,
        EntityType::Event,
        EntityType::Participant,
        EntityType::Comment,
        EntityType::Payment,
        EntityType::Template,
        EntityType::Reminder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Expense => "EXPENSE",
            EntityType::Event => "EVENT",
            EntityType::Participant => "PARTICIPANT",
            EntityType::Comment => "COMMENT",
            EntityType::Payment => "PAYMENT",
            EntityType::Template => "TEMPLATE",
            EntityType::Reminder => "REMINDER",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.to_ascii_uppercase();
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| Error::UnknownEntityType(s.to_string()))
    }
}

/// Lifecycle state of a queued operation.
///
/// Successful operations are removed from the queue rather than tagged, so
/// there is no `Completed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationStatus {
    /// Waiting for the next drain
    #[default]
    Pending,
    /// Handed to the executor by the current drain
    InFlight,
    /// Failed attempt recorded by an older queue format; retried like `Pending`
    Failed,
    /// Retry budget exhausted; removed from the queue
    Dropped,
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Attempts remain; keep the operation queued
    Retry,
    /// Retry budget exhausted; evict the operation
    Drop,
}

/// One queued mutation awaiting execution against the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Issue-ordered id (see [`crate::OpClock`])
    pub id: OperationId,
    /// Create, update or delete
    pub kind: OperationKind,
    /// Affected aggregate
    pub entity_type: EntityType,
    /// Affected record
    pub entity_id: EntityId,
    /// Data needed to replay the mutation
    pub payload: serde_json::Value,
    /// When the operation was queued (milliseconds since epoch)
    pub enqueued_at: Timestamp,
    /// Execution attempts made so far
    #[serde(default)]
    pub attempts: u32,
    /// Error from the most recent failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub status: OperationStatus,
}

impl Operation {
    /// Create a new pending operation.
    pub fn new(
        id: impl Into<OperationId>,
        kind: OperationKind,
        entity_type: EntityType,
        entity_id: impl Into<EntityId>,
        payload: serde_json::Value,
        enqueued_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            entity_type,
            entity_id: entity_id.into(),
            payload,
            enqueued_at,
            attempts: 0,
            last_error: None,
            status: OperationStatus::Pending,
        }
    }

    /// Whether the operation still needs to reach the backend.
    pub fn is_outstanding(&self) -> bool {
        matches!(
            self.status,
            OperationStatus::Pending | OperationStatus::InFlight | OperationStatus::Failed
        )
    }

    /// Mark the operation as handed to the executor.
    pub fn begin_attempt(&mut self) {
        self.status = OperationStatus::InFlight;
    }

    /// Record a failed attempt.
    ///
    /// Increments `attempts` exactly once and decides whether the operation
    /// stays queued.
    pub fn record_failure(&mut self, error: impl Into<String>, max_attempts: u32) -> RetryDecision {
        self.attempts += 1;
        self.last_error = Some(error.into());
        if self.attempts < max_attempts {
            self.status = OperationStatus::Pending;
            RetryDecision::Retry
        } else {
            self.status = OperationStatus::Dropped;
            RetryDecision::Drop
        }
    }

    /// Reset states that cannot survive a process restart.
    ///
    /// An operation persisted as `InFlight` was interrupted mid-drain, and
    /// `Failed` comes from older queue files; both are retried.
    pub fn normalize(&mut self) {
        if matches!(
            self.status,
            OperationStatus::InFlight | OperationStatus::Failed
        ) {
            self.status = OperationStatus::Pending;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expense_op() -> Operation {
        Operation::new(
            "0000000001000-000000",
            OperationKind::Create,
            EntityType::Expense,
            "e1",
            json!({"amount": 50}),
            1000,
        )
    }

    #[test]
    fn new_operation_is_pending() {
        let op = expense_op();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.attempts, 0);
        assert!(op.last_error.is_none());
        assert!(op.is_outstanding());
    }

    #[test]
    fn failure_retries_until_budget_exhausted() {
        let mut op = expense_op();

        op.begin_attempt();
        assert_eq!(op.status, OperationStatus::InFlight);
        assert_eq!(op.record_failure("timeout", 3), RetryDecision::Retry);
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.attempts, 1);

        op.begin_attempt();
        assert_eq!(op.record_failure("timeout", 3), RetryDecision::Retry);

        op.begin_attempt();
        assert_eq!(op.record_failure("permission denied", 3), RetryDecision::Drop);
        assert_eq!(op.status, OperationStatus::Dropped);
        assert_eq!(op.attempts, 3);
        assert_eq!(op.last_error.as_deref(), Some("permission denied"));
        assert!(!op.is_outstanding());
    }

    #[test]
    fn single_attempt_budget_drops_immediately() {
        let mut op = expense_op();
        assert_eq!(op.record_failure("boom", 1), RetryDecision::Drop);
    }

    #[test]
    fn normalize_resets_interrupted_states() {
        let mut op = expense_op();
        op.status = OperationStatus::InFlight;
        op.normalize();
        assert_eq!(op.status, OperationStatus::Pending);

        op.status = OperationStatus::Failed;
        op.normalize();
        assert_eq!(op.status, OperationStatus::Pending);

        op.status = OperationStatus::Dropped;
        op.normalize();
        assert_eq!(op.status, OperationStatus::Dropped);
    }

    #[test]
    fn entity_type_parsing() {
        assert_eq!("EXPENSE".parse::<EntityType>().unwrap(), EntityType::Expense);
        assert_eq!("payment".parse::<EntityType>().unwrap(), EntityType::Payment);
        assert_eq!(
            "invoice".parse::<EntityType>(),
            Err(Error::UnknownEntityType("invoice".into()))
        );
        for t in EntityType::ALL {
            assert_eq!(t.to_string().parse::<EntityType>().unwrap(), t);
        }
    }

    #[test]
    fn operation_kind_parsing() {
        assert_eq!("create".parse::<OperationKind>().unwrap(), OperationKind::Create);
        assert_eq!("DELETE".parse::<OperationKind>().unwrap(), OperationKind::Delete);
        assert!("upsert".parse::<OperationKind>().is_err());
    }

    #[test]
    fn serialization_format() {
        let op = expense_op();
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"kind\":\"CREATE\""));
        assert!(json.contains("\"entityType\":\"EXPENSE\""));
        assert!(json.contains("\"entityId\":\"e1\""));
        assert!(json.contains("\"status\":\"pending\""));
        assert!(!json.contains("lastError"));
    }

    #[test]
    fn deserialize_fills_defaults() {
        let op: Operation = serde_json::from_value(json!({
            "id": "0000000001000-000000",
            "kind": "UPDATE",
            "entityType": "EVENT",
            "entityId": "ev1",
            "payload": {"name": "Trip"},
            "enqueuedAt": 1000
        }))
        .unwrap();

        assert_eq!(op.kind, OperationKind::Update);
        assert_eq!(op.attempts, 0);
        assert_eq!(op.status, OperationStatus::Pending);
    }
}
