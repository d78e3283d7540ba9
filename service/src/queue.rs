//! The persisted operation queue.
//!
//! The queue keeps an in-memory list that is authoritative for the lifetime
//! of the process and mirrors it to the key/value store with one full write
//! per mutation. Persistence failures are logged, not returned: the
//! in-memory list still reflects the intended state, but a crash right after
//! a failed write loses whatever that write carried.
//!
//! The first mutation reads the stored list before changing it, so work
//! queued by an earlier session survives even if [`OperationQueue::load`] was
//! never called.

use crate::storage::KeyValueStore;
use outbox_engine::{Operation, OperationId, QueueSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Ordered, persisted list of outstanding operations.
pub struct OperationQueue {
    store: Arc<dyn KeyValueStore>,
    key: String,
    operations: Mutex<Vec<Operation>>,
    /// Whether the in-memory list has been read from (or replaced over) the store.
    loaded: AtomicBool,
    /// Serializes read-modify-write cycles so concurrent mutations never
    /// overwrite each other's persisted result.
    writer: tokio::sync::Mutex<()>,
}

impl OperationQueue {
    /// Create a queue persisted under `key`.
    ///
    /// Nothing is read until [`load`] or the first mutation.
    ///
    /// [`load`]: OperationQueue::load
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            operations: Mutex::new(Vec::new()),
            loaded: AtomicBool::new(false),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn view(&self) -> MutexGuard<'_, Vec<Operation>> {
        // A panic while holding the lock cannot leave the Vec half-updated:
        // every writer replaces it wholesale.
        self.operations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current in-memory list, in queue order.
    pub fn snapshot(&self) -> Vec<Operation> {
        self.view().clone()
    }

    pub fn len(&self) -> usize {
        self.view().len()
    }

    pub fn is_empty(&self) -> bool {
        self.view().is_empty()
    }

    /// Whether the stored list has been read into memory.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Read the persisted list, replacing the in-memory view.
    ///
    /// Absent or corrupt data loads as an empty queue. If the store cannot be
    /// read at all, the current in-memory view is kept and returned.
    pub async fn load(&self) -> Vec<Operation> {
        let _writer = self.writer.lock().await;
        self.read_stored().await
    }

    /// Caller must hold `writer`.
    async fn read_stored(&self) -> Vec<Operation> {
        let loaded = match self.store.get(&self.key).await {
            Ok(Some(json)) => match QueueSnapshot::from_json(&json) {
                Ok(snapshot) => snapshot.into_operations(),
                Err(e) => {
                    tracing::warn!(key = %self.key, error = %e, "Corrupt sync queue, treating as empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "Failed to read sync queue");
                return self.snapshot();
            }
        };

        *self.view() = loaded.clone();
        self.loaded.store(true, Ordering::SeqCst);
        loaded
    }

    /// Make sure the in-memory list holds the stored one. Caller must hold
    /// `writer`.
    ///
    /// A failed read leaves the queue unloaded so the next mutation retries.
    /// Operations queued while the store was unreadable go after the stored
    /// ones.
    async fn ensure_loaded(&self) {
        if self.is_loaded() {
            return;
        }

        let unsaved = self.snapshot();
        let mut stored = self.read_stored().await;
        if self.is_loaded() && !unsaved.is_empty() {
            for op in unsaved {
                if !stored.iter().any(|s| s.id == op.id) {
                    stored.push(op);
                }
            }
            *self.view() = stored;
        }
    }

    /// Replace the whole queue with one write.
    pub async fn save_all(&self, ops: Vec<Operation>) {
        let _writer = self.writer.lock().await;
        self.persist(ops).await;
        self.loaded.store(true, Ordering::SeqCst);
    }

    /// Add an operation at the tail.
    pub async fn append(&self, op: Operation) {
        self.update(|ops| ops.push(op)).await;
    }

    /// Remove one operation by id.
    pub async fn remove(&self, id: &str) {
        self.update(|ops| ops.retain(|op| op.id != id)).await;
    }

    /// Remove every operation whose id is listed.
    pub async fn remove_many(&self, ids: &[OperationId]) {
        if ids.is_empty() {
            return;
        }
        self.update(|ops| ops.retain(|op| !ids.contains(&op.id)))
            .await;
    }

    /// Apply `f` to the current list and persist the result with one write.
    ///
    /// The stored list is read first if this is the queue's first access.
    pub async fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Vec<Operation>) -> R,
    {
        let _writer = self.writer.lock().await;
        self.ensure_loaded().await;
        let mut ops = self.snapshot();
        let result = f(&mut ops);
        self.persist(ops).await;
        result
    }

    /// Caller must hold `writer`.
    async fn persist(&self, ops: Vec<Operation>) {
        let snapshot = QueueSnapshot::new(ops);
        let encoded = snapshot.to_json();
        let count = snapshot.operations.len();
        *self.view() = snapshot.into_operations();

        let json = match encoded {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "Failed to encode sync queue");
                return;
            }
        };

        match self.store.set(&self.key, json).await {
            Ok(()) => tracing::trace!(key = %self.key, count, "Persisted sync queue"),
            Err(e) => tracing::error!(
                key = %self.key,
                count,
                error = %e,
                "Failed to persist sync queue; in-memory state kept for this session"
            ),
        }
    }
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueue")
            .field("key", &self.key)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use outbox_engine::{EntityType, OperationKind, OperationStatus};
    use serde_json::json;

    const KEY: &str = "@test/sync_queue";

    fn op(seq: u32, entity: &str) -> Operation {
        Operation::new(
            format!("0000000001000-{:06}", seq),
            OperationKind::Create,
            EntityType::Expense,
            entity,
            json!({"amount": seq}),
            1000,
        )
    }

    fn queue() -> (Arc<MemoryStore>, OperationQueue) {
        let store = Arc::new(MemoryStore::new());
        let queue = OperationQueue::new(store.clone(), KEY);
        (store, queue)
    }

    #[tokio::test]
    async fn load_absent_is_empty() {
        let (_store, queue) = queue();
        assert!(queue.load().await.is_empty());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn load_corrupt_is_empty() {
        let (store, queue) = queue();
        store.insert_raw(KEY, "{definitely not a queue");
        assert!(queue.load().await.is_empty());
    }

    #[tokio::test]
    async fn append_persists_in_order() {
        let (store, queue) = queue();
        queue.append(op(0, "e1")).await;
        queue.append(op(1, "e2")).await;

        assert_eq!(store.write_count(), 2);
        let persisted = QueueSnapshot::from_json(&store.peek(KEY).unwrap())
            .unwrap()
            .into_operations();
        let ids: Vec<_> = persisted.iter().map(|o| o.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);

        let reloaded = OperationQueue::new(store.clone(), KEY);
        assert_eq!(reloaded.load().await, queue.snapshot());
    }

    #[tokio::test]
    async fn remove_and_remove_many() {
        let (_store, queue) = queue();
        for i in 0..4 {
            queue.append(op(i, &format!("e{}", i))).await;
        }

        queue.remove("0000000001000-000001").await;
        assert_eq!(queue.len(), 3);

        queue
            .remove_many(&[
                "0000000001000-000000".to_string(),
                "0000000001000-000003".to_string(),
            ])
            .await;
        let left = queue.snapshot();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].entity_id, "e2");
    }

    #[tokio::test]
    async fn save_all_is_one_write() {
        let (store, queue) = queue();
        queue
            .save_all(vec![op(0, "e1"), op(1, "e1"), op(2, "e2")])
            .await;
        assert_eq!(store.write_count(), 1);
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn write_failure_keeps_in_memory_state() {
        let (store, queue) = queue();
        store.fail_writes(true);

        queue.append(op(0, "e1")).await;

        assert_eq!(queue.len(), 1);
        assert!(store.peek(KEY).is_none());
    }

    #[tokio::test]
    async fn read_failure_keeps_in_memory_view() {
        let (store, queue) = queue();
        queue.append(op(0, "e1")).await;

        store.fail_reads(true);
        let loaded = queue.load().await;
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn load_resets_interrupted_operations() {
        let (store, queue) = queue();
        let mut interrupted = op(0, "e1");
        interrupted.begin_attempt();
        store.insert_raw(
            KEY,
            QueueSnapshot::new(vec![interrupted]).to_json().unwrap(),
        );

        let loaded = queue.load().await;
        assert_eq!(loaded[0].status, OperationStatus::Pending);
    }

    #[tokio::test]
    async fn first_append_keeps_stored_operations() {
        let (store, queue) = queue();
        store.insert_raw(
            KEY,
            QueueSnapshot::new(vec![op(0, "e1"), op(1, "e2")])
                .to_json()
                .unwrap(),
        );
        assert!(!queue.is_loaded());

        queue.append(op(2, "e3")).await;

        assert!(queue.is_loaded());
        let persisted = QueueSnapshot::from_json(&store.peek(KEY).unwrap())
            .unwrap()
            .into_operations();
        let entities: Vec<_> = persisted.iter().map(|o| o.entity_id.as_str()).collect();
        assert_eq!(entities, vec!["e1", "e2", "e3"]);
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn unreadable_store_is_retried_on_next_mutation() {
        let (store, queue) = queue();
        store.insert_raw(
            KEY,
            QueueSnapshot::new(vec![op(0, "e1")]).to_json().unwrap(),
        );

        store.fail_reads(true);
        store.fail_writes(true);
        queue.append(op(1, "e2")).await;
        assert!(!queue.is_loaded());

        store.fail_reads(false);
        store.fail_writes(false);
        queue.append(op(2, "e3")).await;

        let entities: Vec<_> = queue
            .snapshot()
            .into_iter()
            .map(|o| o.entity_id)
            .collect();
        assert_eq!(entities, vec!["e1", "e2", "e3"]);
    }

    #[tokio::test]
    async fn concurrent_appends_are_all_kept() {
        let (store, queue) = queue();
        let queue = Arc::new(queue);

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.append(op(i, "e1")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(queue.len(), 20);
        let persisted = QueueSnapshot::from_json(&store.peek(KEY).unwrap()).unwrap();
        assert_eq!(persisted.operations.len(), 20);
    }
}
