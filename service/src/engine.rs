//! The sync engine.
//!
//! Orchestrates drains of the operation queue against the injected
//! executor. Every trigger (manual [`SyncEngine::force_sync`], the reconnect
//! listener, the check after [`SyncEngine::enqueue`]) goes through one guarded
//! entry point, so at most one drain runs at a time.
//!
//! # Drain
//!
//! 1. Claim the drain flag (refused if offline, idle-empty or already draining)
//! 2. Publish `is_syncing = true`
//! 3. Snapshot the queue and partition it by entity
//! 4. Run partitions concurrently, each partition strictly in queue order;
//!    each operation is marked `InFlight` in the queue before its executor
//!    call, and a failure halts the rest of its partition for this drain
//! 5. Fold outcomes into the current queue with one write: successes and
//!    evictions are removed, retries keep their bumped attempt count
//! 6. Stamp and persist the last sync time, release the flag, publish
//!
//! A drain that leaves retries behind does not loop; the next trigger picks
//! them up.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::executor::OperationExecutor;
use crate::listeners::SubscriptionId;
use crate::network::NetworkMonitor;
use crate::now_millis;
use crate::offline_cache::OfflineCache;
use crate::publisher::StatusPublisher;
use crate::queue::OperationQueue;
use crate::storage::KeyValueStore;
use futures::future::join_all;
use futures::FutureExt;
use outbox_engine::{
    partition_by_entity, EntityId, EntityType, Language, OpClock, Operation, OperationId,
    OperationKind, Partition, RetryDecision, SyncStatus, Timestamp,
};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;

/// What one drain did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Accepted by the executor and removed from the queue
    pub succeeded: Vec<OperationId>,
    /// Failed with attempts to spare; still queued
    pub retried: Vec<OperationId>,
    /// Failed on their last attempt; removed and counted as failures
    pub dropped: Vec<Operation>,
    /// Not attempted because an earlier operation on the same entity failed
    pub deferred: usize,
}

impl DrainReport {
    /// Number of executor calls made.
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.retried.len() + self.dropped.len()
    }

    /// Whether the drain touched nothing.
    pub fn is_empty(&self) -> bool {
        self.attempted() == 0 && self.deferred == 0
    }
}

/// Per-operation result inside a drain.
#[derive(Debug)]
enum Outcome {
    Succeeded,
    Retry(Operation),
    Dropped(Operation),
    Deferred,
}

#[derive(Debug, Default)]
struct Lifecycle {
    initialized: bool,
    network_subscription: Option<SubscriptionId>,
    runtime: Option<Handle>,
}

struct Inner {
    config: SyncConfig,
    store: Arc<dyn KeyValueStore>,
    queue: Arc<OperationQueue>,
    network: Arc<NetworkMonitor>,
    executor: Arc<dyn OperationExecutor>,
    publisher: StatusPublisher,
    clock: Mutex<OpClock>,
    /// The single-flight flag; `true` while a drain owns the queue.
    draining: watch::Sender<bool>,
    lifecycle: Mutex<Lifecycle>,
    init_lock: tokio::sync::Mutex<()>,
}

/// Releases the drain flag when the drain finishes, however it finishes.
struct DrainGuard {
    inner: Arc<Inner>,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.inner.publisher.set_syncing(false);
        self.inner.publisher.publish();
        self.inner.draining.send_replace(false);
    }
}

/// Offline-first operation queue with network-aware draining.
///
/// Cheap to clone; clones share the same queue, flag and subscribers.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    /// Create an engine whose queue lives in `store` under the configured key.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn KeyValueStore>,
        network: Arc<NetworkMonitor>,
        executor: Arc<dyn OperationExecutor>,
    ) -> Self {
        let queue = Arc::new(OperationQueue::new(store.clone(), config.queue_key()));
        Self::from_parts(config, store, queue, network, executor)
    }

    /// Create an engine around an existing queue.
    pub fn from_parts(
        config: SyncConfig,
        store: Arc<dyn KeyValueStore>,
        queue: Arc<OperationQueue>,
        network: Arc<NetworkMonitor>,
        executor: Arc<dyn OperationExecutor>,
    ) -> Self {
        let publisher = StatusPublisher::new(queue.clone(), network.clone());
        let (draining, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                config,
                store,
                queue,
                network,
                executor,
                publisher,
                clock: Mutex::new(OpClock::new()),
                draining,
                lifecycle: Mutex::new(Lifecycle::default()),
                init_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn queue(&self) -> &Arc<OperationQueue> {
        &self.inner.queue
    }

    pub fn network(&self) -> &Arc<NetworkMonitor> {
        &self.inner.network
    }

    fn clock(&self) -> MutexGuard<'_, OpClock> {
        self.inner
            .clock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Load persisted state and start listening for connectivity changes.
    ///
    /// Idempotent: the network listener is registered once no matter how
    /// often this is called. If the device is already online with leftover
    /// operations, a drain starts right away.
    pub async fn initialize(&self) {
        let _init = self.inner.init_lock.lock().await;
        if self.lifecycle().initialized {
            tracing::debug!("Sync service already initialized");
            return;
        }

        let operations = self.inner.queue.load().await;
        {
            let mut clock = self.clock();
            for op in &operations {
                if let Err(e) = clock.observe(&op.id) {
                    tracing::warn!(op_id = %op.id, error = %e, "Queued operation has a foreign id");
                }
            }
        }

        let last_sync = self.load_last_sync().await;
        self.inner.publisher.set_last_sync_at(last_sync);

        let weak = Arc::downgrade(&self.inner);
        let subscription = self
            .inner
            .network
            .on_change(move |online| Self::on_network_change(&weak, online));

        {
            let mut lifecycle = self.lifecycle();
            lifecycle.initialized = true;
            lifecycle.network_subscription = Some(subscription);
            lifecycle.runtime = Handle::try_current().ok();
        }

        let status = self.inner.publisher.publish();
        tracing::info!(
            online = status.is_online,
            pending = status.pending_count,
            last_sync_at = ?status.last_sync_at,
            "Sync service initialized"
        );

        self.trigger("startup");
    }

    /// Stop listening for connectivity changes and drop all subscribers.
    ///
    /// A drain already running completes; the queue itself is untouched.
    pub fn stop(&self) {
        let subscription = {
            let mut lifecycle = self.lifecycle();
            lifecycle.initialized = false;
            lifecycle.runtime = None;
            lifecycle.network_subscription.take()
        };

        if let Some(id) = subscription {
            self.inner.network.unsubscribe(id);
        }
        self.inner.network.unbind();
        self.inner.publisher.clear();
        tracing::info!("Sync service stopped");
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle().initialized
    }

    /// Attach the platform connectivity feed to the engine's monitor.
    pub fn bind_network(&self, feed: watch::Receiver<bool>) -> bool {
        self.inner.network.bind(feed)
    }

    fn on_network_change(weak: &Weak<Inner>, online: bool) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let engine = SyncEngine { inner };
        engine.inner.publisher.publish();
        if online {
            engine.trigger("reconnect");
        }
    }

    // ------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------

    /// Queue a mutation.
    ///
    /// Returns once the operation is appended to the persisted queue. Safe to
    /// call before [`initialize`](Self::initialize): the queue reads what an
    /// earlier session stored before appending. If the device is online and
    /// no drain is running, a drain starts in the background.
    pub async fn enqueue(
        &self,
        kind: OperationKind,
        entity_type: EntityType,
        entity_id: impl Into<EntityId>,
        payload: serde_json::Value,
    ) -> Operation {
        let entity_id = entity_id.into();
        let now = now_millis();
        // Issued under the queue's writer lock so id order is queue order
        let op = self
            .inner
            .queue
            .update(|ops| {
                let mut clock = self.clock();
                seed_clock(&mut clock, ops);
                let op = Operation::new(
                    clock.next_id(now),
                    kind,
                    entity_type,
                    entity_id,
                    payload,
                    now,
                );
                ops.push(op.clone());
                op
            })
            .await;

        let status = self.inner.publisher.publish();
        tracing::info!(
            op_id = %op.id,
            kind = %op.kind,
            entity_type = %op.entity_type,
            entity_id = %op.entity_id,
            pending = status.pending_count,
            "Operation added to queue"
        );

        self.trigger("enqueue");
        op
    }

    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.inner.publisher.snapshot()
    }

    /// Subscribe to status changes; the listener is called immediately with
    /// the current snapshot.
    pub fn subscribe(
        &self,
        listener: impl Fn(&SyncStatus) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.publisher.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.publisher.unsubscribe(id)
    }

    /// Status as a watch channel, for async consumers.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.publisher.watch()
    }

    /// Drain now.
    ///
    /// Fails with [`SyncError::Offline`] when there is no connectivity. If a
    /// drain is already running, waits for it to finish instead of starting
    /// another, and returns an empty report.
    pub async fn force_sync(&self) -> Result<DrainReport> {
        if !self.inner.network.current() {
            tracing::warn!("Manual sync requested while offline");
            return Err(SyncError::Offline);
        }

        match self.sync_pending().await {
            Some(report) => Ok(report),
            None => {
                self.wait_idle().await;
                Ok(DrainReport::default())
            }
        }
    }

    /// Run a drain if the guard allows one; `None` if it was refused.
    pub async fn sync_pending(&self) -> Option<DrainReport> {
        let guard = self.try_begin_drain()?;
        Some(self.drain(guard).await)
    }

    /// Discard every queued operation and reset the failure count.
    pub async fn clear_queue(&self) {
        let discarded = self.inner.queue.len();
        self.inner.queue.save_all(Vec::new()).await;
        self.inner.publisher.reset_failures();
        self.inner.publisher.publish();
        tracing::info!(discarded, "Queue cleared");
    }

    /// Operations still waiting to reach the backend, in queue order.
    pub fn pending_operations(&self) -> Vec<Operation> {
        self.inner.queue.snapshot()
    }

    /// Resolve once no drain is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.draining.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|draining| !*draining).await;
    }

    pub fn is_draining(&self) -> bool {
        *self.inner.draining.borrow()
    }

    /// Cached domain data stored alongside the queue.
    pub fn offline_cache(&self) -> OfflineCache {
        OfflineCache::new(self.inner.store.clone(), self.inner.config.offline_data_key())
    }

    /// Human-readable age of the last sync.
    pub fn describe_last_sync(&self, language: Language) -> String {
        self.status().describe_last_sync(now_millis(), language)
    }

    // ------------------------------------------------------------------
    // Drain
    // ------------------------------------------------------------------

    /// The single guarded entry point shared by every trigger.
    fn try_begin_drain(&self) -> Option<DrainGuard> {
        if !self.inner.network.current() || self.inner.queue.is_empty() {
            return None;
        }

        let claimed = self.inner.draining.send_if_modified(|draining| {
            if *draining {
                false
            } else {
                *draining = true;
                true
            }
        });
        if !claimed {
            tracing::debug!("Drain already in progress, skipping");
            return None;
        }

        self.inner.publisher.set_syncing(true);
        self.inner.publisher.publish();
        Some(DrainGuard {
            inner: self.inner.clone(),
        })
    }

    /// Start a background drain if the guard allows one.
    fn trigger(&self, reason: &'static str) {
        let Some(guard) = self.try_begin_drain() else {
            return;
        };

        let runtime = Handle::try_current()
            .ok()
            .or_else(|| self.lifecycle().runtime.clone());
        let Some(runtime) = runtime else {
            tracing::warn!(reason, "No async runtime available, drain deferred");
            return;
        };

        tracing::debug!(reason, "Starting background drain");
        let engine = self.clone();
        runtime.spawn(async move {
            engine.drain(guard).await;
        });
    }

    async fn drain(&self, guard: DrainGuard) -> DrainReport {
        let snapshot: Vec<Operation> = self
            .inner
            .queue
            .snapshot()
            .into_iter()
            .filter(Operation::is_outstanding)
            .collect();
        let partitions = partition_by_entity(snapshot);
        tracing::info!(
            operations = partitions.iter().map(Partition::len).sum::<usize>(),
            entities = partitions.len(),
            "Starting sync"
        );

        let mut outcomes: HashMap<OperationId, Outcome> = join_all(
            partitions
                .into_iter()
                .map(|partition| self.run_partition(partition)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        let report = self
            .inner
            .queue
            .update(|ops| {
                let mut report = DrainReport::default();
                ops.retain_mut(|op| match outcomes.remove(&op.id) {
                    Some(Outcome::Succeeded) => {
                        report.succeeded.push(op.id.clone());
                        false
                    }
                    Some(Outcome::Retry(updated)) => {
                        report.retried.push(op.id.clone());
                        *op = updated;
                        true
                    }
                    Some(Outcome::Dropped(dropped)) => {
                        report.dropped.push(dropped);
                        false
                    }
                    Some(Outcome::Deferred) => {
                        report.deferred += 1;
                        true
                    }
                    None => true,
                });
                report
            })
            .await;

        let finished_at = now_millis();
        self.inner.publisher.record_failures(report.dropped.len());
        self.inner.publisher.set_last_sync_at(Some(finished_at));
        self.save_last_sync(finished_at).await;

        tracing::info!(
            processed = report.succeeded.len(),
            retried = report.retried.len(),
            dropped = report.dropped.len(),
            deferred = report.deferred,
            remaining = self.inner.queue.len(),
            "Sync completed"
        );

        drop(guard);
        report
    }

    /// Execute one entity's operations in order.
    async fn run_partition(&self, partition: Partition) -> Vec<(OperationId, Outcome)> {
        let max_attempts = self.inner.config.max_attempts;
        let mut outcomes = Vec::with_capacity(partition.len());
        let mut halted = false;

        for mut op in partition.operations {
            if halted {
                outcomes.push((op.id.clone(), Outcome::Deferred));
                continue;
            }

            op.begin_attempt();
            self.mark_in_flight(&op.id).await;
            tracing::debug!(
                op_id = %op.id,
                kind = %op.kind,
                entity_type = %op.entity_type,
                entity_id = %op.entity_id,
                attempt = op.attempts + 1,
                "Processing operation"
            );

            let result = AssertUnwindSafe(self.inner.executor.execute(&op))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err("executor panicked".into()));

            let outcome = match result {
                Ok(()) => {
                    tracing::debug!(op_id = %op.id, "Operation processed successfully");
                    Outcome::Succeeded
                }
                Err(e) => {
                    halted = true;
                    match op.record_failure(e.message, max_attempts) {
                        RetryDecision::Retry => {
                            tracing::warn!(
                                op_id = %op.id,
                                attempts = op.attempts,
                                max_attempts,
                                error = op.last_error.as_deref().unwrap_or_default(),
                                "Operation failed, will retry"
                            );
                            Outcome::Retry(op.clone())
                        }
                        RetryDecision::Drop => {
                            tracing::error!(
                                op_id = %op.id,
                                attempts = op.attempts,
                                error = op.last_error.as_deref().unwrap_or_default(),
                                "Operation exceeded max retries"
                            );
                            Outcome::Dropped(op.clone())
                        }
                    }
                }
            };
            outcomes.push((op.id, outcome));
        }

        outcomes
    }

    /// Record in the queue that `id` is with the executor.
    async fn mark_in_flight(&self, id: &str) {
        self.inner
            .queue
            .update(|ops| {
                if let Some(queued) = ops.iter_mut().find(|queued| queued.id == id) {
                    queued.begin_attempt();
                }
            })
            .await;
    }

    // ------------------------------------------------------------------
    // Last sync bookkeeping
    // ------------------------------------------------------------------

    async fn load_last_sync(&self) -> Option<Timestamp> {
        let key = self.inner.config.last_sync_key();
        match self.inner.store.get(&key).await {
            Ok(Some(raw)) => match raw.trim().parse() {
                Ok(at) => Some(at),
                Err(_) => {
                    tracing::warn!(key = %key, value = %raw, "Ignoring malformed last sync time");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to read last sync time");
                None
            }
        }
    }

    async fn save_last_sync(&self, at: Timestamp) {
        let key = self.inner.config.last_sync_key();
        if let Err(e) = self.inner.store.set(&key, at.to_string()).await {
            tracing::error!(key = %key, error = %e, "Failed to persist last sync time");
        }
    }
}

/// Advance the clock past the newest id already queued.
fn seed_clock(clock: &mut OpClock, ops: &[Operation]) {
    for op in ops.iter().rev() {
        if clock.observe(&op.id).is_ok() {
            break;
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}
