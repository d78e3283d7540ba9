//! Connectivity tracking.
//!
//! The monitor holds the current online flag and fires listeners on edges
//! only (offline → online, online → offline). Listeners run synchronously
//! inside [`NetworkMonitor::set_online`], so a reconnect listener can claim a
//! drain before the caller's next mutation.
//!
//! The platform connectivity API is modelled as a `watch` channel of
//! booleans. [`NetworkMonitor::bind`] attaches exactly one such feed for the
//! lifetime of the monitor; later calls are ignored until [`unbind`].
//!
//! [`unbind`]: NetworkMonitor::unbind

use crate::listeners::{ListenerSet, SubscriptionId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Online/offline state with edge-triggered notifications.
#[derive(Debug)]
pub struct NetworkMonitor {
    online: AtomicBool,
    listeners: ListenerSet<bool>,
    feed: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkMonitor {
    /// Create a monitor with a known initial state.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            listeners: ListenerSet::new("network"),
            feed: Mutex::new(None),
        }
    }

    /// Create a monitor wrapped in Arc for sharing.
    pub fn new_shared(online: bool) -> Arc<Self> {
        Arc::new(Self::new(online))
    }

    /// Current connectivity.
    pub fn current(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Register a listener called with the new state on every transition.
    pub fn on_change(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> SubscriptionId {
        self.listeners.insert(Arc::new(move |online: &bool| listener(*online)))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }

    /// Record the platform's connectivity.
    ///
    /// Returns `true` if this was a transition; listeners have already run by
    /// the time it returns.
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online == online {
            return false;
        }

        if online {
            tracing::info!("Connection restored");
        } else {
            tracing::info!("Connection lost");
        }
        self.listeners.notify(&online);
        true
    }

    /// Attach the platform connectivity feed.
    ///
    /// The feed's current value is applied immediately. Returns `false` if a
    /// feed is already bound. Listeners run with no internal lock held, so
    /// they may call back into the monitor.
    pub fn bind(self: &Arc<Self>, mut feed: watch::Receiver<bool>) -> bool {
        if self.is_bound() {
            tracing::warn!("Network feed already bound, ignoring");
            return false;
        }

        // Marks the value seen; later changes reach the forwarding task.
        let initial = *feed.borrow_and_update();
        self.set_online(initial);

        let mut slot = self.feed_slot();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            tracing::warn!("Network feed bound concurrently, ignoring");
            return false;
        }

        let monitor: Weak<Self> = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            while feed.changed().await.is_ok() {
                let online = *feed.borrow_and_update();
                match monitor.upgrade() {
                    Some(monitor) => {
                        monitor.set_online(online);
                    }
                    None => break,
                }
            }
            tracing::debug!("Network feed closed");
        }));
        true
    }

    /// Detach the platform feed, if any.
    pub fn unbind(&self) {
        if let Some(task) = self.feed_slot().take() {
            task.abort();
        }
    }

    pub fn is_bound(&self) -> bool {
        self.feed_slot()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn feed_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.feed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.unbind();
    }
}
