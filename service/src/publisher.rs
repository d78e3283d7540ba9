//! Status pub/sub.
//!
//! Derives a [`SyncStatus`] from the queue, the network monitor and the
//! engine's bookkeeping, and pushes it to every subscriber. Subscribers get
//! the current snapshot as soon as they subscribe.

use crate::listeners::{Listener, ListenerSet, SubscriptionId};
use crate::network::NetworkMonitor;
use crate::queue::OperationQueue;
use outbox_engine::{SyncStatus, Timestamp};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Engine-owned facts that are not derivable from the queue or network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Bookkeeping {
    syncing: bool,
    failed_count: usize,
    last_sync_at: Option<Timestamp>,
}

/// Broadcasts [`SyncStatus`] snapshots.
///
/// Only reads the queue; never mutates it.
pub struct StatusPublisher {
    queue: Arc<OperationQueue>,
    network: Arc<NetworkMonitor>,
    state: Mutex<Bookkeeping>,
    listeners: ListenerSet<SyncStatus>,
    watch_tx: watch::Sender<SyncStatus>,
}

impl StatusPublisher {
    pub fn new(queue: Arc<OperationQueue>, network: Arc<NetworkMonitor>) -> Self {
        let (watch_tx, _) = watch::channel(SyncStatus::default());
        let publisher = Self {
            queue,
            network,
            state: Mutex::new(Bookkeeping::default()),
            listeners: ListenerSet::new("status"),
            watch_tx,
        };
        publisher.watch_tx.send_replace(publisher.snapshot());
        publisher
    }

    fn state(&self) -> MutexGuard<'_, Bookkeeping> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Compute the current status without broadcasting it.
    pub fn snapshot(&self) -> SyncStatus {
        let state = *self.state();
        SyncStatus {
            is_online: self.network.current(),
            is_syncing: state.syncing,
            pending_count: self.queue.len(),
            failed_count: state.failed_count,
            last_sync_at: state.last_sync_at,
        }
    }

    /// Register a listener and immediately call it with the current snapshot.
    pub fn subscribe(
        &self,
        listener: impl Fn(&SyncStatus) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let listener: Listener<SyncStatus> = Arc::new(listener);
        let id = self.listeners.insert(listener.clone());
        self.listeners
            .call_isolated(id, &listener, &self.snapshot());
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }

    /// A receiver that always holds the latest published snapshot.
    pub fn watch(&self) -> watch::Receiver<SyncStatus> {
        self.watch_tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Recompute the snapshot and broadcast it to every listener.
    pub fn publish(&self) -> SyncStatus {
        let status = self.snapshot();
        self.watch_tx.send_replace(status);
        let delivered = self.listeners.notify(&status);
        tracing::trace!(
            pending = status.pending_count,
            failed = status.failed_count,
            syncing = status.is_syncing,
            online = status.is_online,
            delivered,
            "Published sync status"
        );
        status
    }

    /// Drop every listener. Watch receivers stay valid.
    pub fn clear(&self) {
        self.listeners.clear();
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.state().syncing = syncing;
    }

    pub fn record_failures(&self, count: usize) {
        self.state().failed_count += count;
    }

    pub fn reset_failures(&self) {
        self.state().failed_count = 0;
    }

    pub fn set_last_sync_at(&self, at: Option<Timestamp>) {
        self.state().last_sync_at = at;
    }
}

impl std::fmt::Debug for StatusPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPublisher")
            .field("status", &self.snapshot())
            .field("subscribers", &self.listeners.len())
            .finish()
    }
}
