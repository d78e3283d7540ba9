//! Persisted layouts.
//!
//! Snapshots are the bridge between in-memory state and the platform
//! key/value store. The queue is stored as a bare JSON array of operations
//! so one write replaces the whole list.

use crate::{error::Result, Error, Operation, Timestamp};
use serde::{Deserialize, Serialize};

/// The persisted operation queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueSnapshot {
    pub operations: Vec<Operation>,
}

impl QueueSnapshot {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    /// Serialize to the on-disk JSON array.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidQueue(e.to_string()))
    }

    /// Deserialize from JSON.
    ///
    /// Operations interrupted mid-drain are reset to pending, and records
    /// already marked dropped are discarded.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidQueue(e.to_string()))?;

        snapshot.operations.retain(Operation::is_outstanding);
        for op in &mut snapshot.operations {
            op.normalize();
        }

        Ok(snapshot)
    }

    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }
}

/// Cached domain data for offline display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineData {
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
    #[serde(default)]
    pub expenses: Vec<serde_json::Value>,
    #[serde(default)]
    pub participants: Vec<serde_json::Value>,
    /// When the cache was last written (milliseconds since epoch)
    #[serde(default)]
    pub last_updated: Timestamp,
}

/// A partial update to [`OfflineData`]; `None` keeps the cached list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfflineDataUpdate {
    pub events: Option<Vec<serde_json::Value>>,
    pub expenses: Option<Vec<serde_json::Value>>,
    pub participants: Option<Vec<serde_json::Value>>,
}

impl OfflineData {
    /// Merge an update into this cache and stamp it.
    pub fn merge(mut self, update: OfflineDataUpdate, now: Timestamp) -> Self {
        if let Some(events) = update.events {
            self.events = events;
        }
        if let Some(expenses) = update.expenses {
            self.expenses = expenses;
        }
        if let Some(participants) = update.participants {
            self.participants = participants;
        }
        self.last_updated = now;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidOfflineData(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidOfflineData(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityType, OperationKind, OperationStatus};
    use serde_json::json;

    fn op(id: &str, status: OperationStatus) -> Operation {
        let mut op = Operation::new(
            id,
            OperationKind::Create,
            EntityType::Expense,
            "e1",
            json!({"amount": 50}),
            1000,
        );
        op.status = status;
        op
    }

    #[test]
    fn queue_is_a_bare_array() {
        let snapshot = QueueSnapshot::new(vec![op("0000000001000-000000", OperationStatus::Pending)]);
        let json = snapshot.to_json().unwrap();
        assert!(json.starts_with('['));
        assert_eq!(QueueSnapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn empty_array_loads_empty() {
        assert!(QueueSnapshot::from_json("[]").unwrap().operations.is_empty());
    }

    #[test]
    fn load_normalizes_interrupted_operations() {
        let snapshot = QueueSnapshot::new(vec![
            op("0000000001000-000000", OperationStatus::InFlight),
            op("0000000001000-000001", OperationStatus::Dropped),
            op("0000000001000-000002", OperationStatus::Failed),
        ]);
        let json = snapshot.to_json().unwrap();

        let loaded = QueueSnapshot::from_json(&json).unwrap().into_operations();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(|o| o.status == OperationStatus::Pending));
        assert_eq!(loaded[0].id, "0000000001000-000000");
        assert_eq!(loaded[1].id, "0000000001000-000002");
    }

    #[test]
    fn corrupt_queue_is_an_error() {
        assert!(matches!(
            QueueSnapshot::from_json("{not json"),
            Err(Error::InvalidQueue(_))
        ));
        assert!(matches!(
            QueueSnapshot::from_json(r#"{"id": "x"}"#),
            Err(Error::InvalidQueue(_))
        ));
    }

    #[test]
    fn offline_data_merge_keeps_untouched_lists() {
        let data = OfflineData {
            events: vec![json!({"id": "ev1"})],
            expenses: vec![json!({"id": "e1"})],
            participants: vec![],
            last_updated: 1000,
        };

        let merged = data.merge(
            OfflineDataUpdate {
                expenses: Some(vec![json!({"id": "e2"}), json!({"id": "e3"})]),
                ..OfflineDataUpdate::default()
            },
            2000,
        );

        assert_eq!(merged.events, vec![json!({"id": "ev1"})]);
        assert_eq!(merged.expenses.len(), 2);
        assert_eq!(merged.last_updated, 2000);
    }

    #[test]
    fn offline_data_tolerates_missing_fields() {
        let data = OfflineData::from_json(r#"{"events": [{"id": "ev1"}]}"#).unwrap();
        assert_eq!(data.events.len(), 1);
        assert!(data.expenses.is_empty());
        assert_eq!(data.last_updated, 0);
    }
}
