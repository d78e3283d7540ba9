//! Listener registry shared by the network monitor and the status publisher.
//!
//! Tracks registered callbacks and broadcasts values to all of them. Each
//! callback runs in isolation: a panicking listener is logged and the
//! remaining listeners still receive the value.

use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// A unique identifier for a registered listener (used to unsubscribe).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub uuid::Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered callback.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Thread-safe set of listeners for values of type `T`.
pub struct ListenerSet<T> {
    name: &'static str,
    listeners: DashMap<SubscriptionId, Listener<T>>,
}

impl<T> ListenerSet<T> {
    /// Create an empty set; `name` labels log lines.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            listeners: DashMap::new(),
        }
    }

    /// Register a listener.
    pub fn insert(&self, listener: Listener<T>) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.listeners.insert(id, listener);
        tracing::debug!(set = self.name, subscription = %id, "Listener registered");
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self.listeners.remove(&id).is_some();
        if removed {
            tracing::debug!(set = self.name, subscription = %id, "Listener removed");
        }
        removed
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.listeners.clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Call one listener, containing any panic it raises.
    pub fn call_isolated(&self, id: SubscriptionId, listener: &Listener<T>, value: &T) -> bool {
        match catch_unwind(AssertUnwindSafe(|| listener(value))) {
            Ok(()) => true,
            Err(_) => {
                tracing::error!(set = self.name, subscription = %id, "Listener panicked");
                false
            }
        }
    }

    /// Broadcast a value to all listeners.
    ///
    /// Listeners are collected before any is called, so a listener may
    /// subscribe or unsubscribe from inside its callback.
    ///
    /// Returns the number of listeners that completed without panicking.
    pub fn notify(&self, value: &T) -> usize {
        let targets: Vec<(SubscriptionId, Listener<T>)> = self
            .listeners
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        targets
            .iter()
            .filter(|(id, listener)| self.call_isolated(*id, listener, value))
            .count()
    }
}

impl<T> std::fmt::Debug for ListenerSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn insert_notify_remove() {
        let set: ListenerSet<u32> = ListenerSet::new("test");
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let id = set.insert(Arc::new(move |v: &u32| {
            counter.fetch_add(*v as usize, Ordering::SeqCst);
        }));
        assert_eq!(set.len(), 1);

        assert_eq!(set.notify(&5), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 5);

        assert!(set.remove(id));
        assert!(!set.remove(id));
        assert_eq!(set.notify(&5), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn panicking_listener_does_not_break_broadcast() {
        let set: ListenerSet<u32> = ListenerSet::new("test");
        let seen = Arc::new(AtomicUsize::new(0));

        set.insert(Arc::new(|_: &u32| panic!("listener failure")));
        for _ in 0..3 {
            let counter = seen.clone();
            set.insert(Arc::new(move |_: &u32| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert_eq!(set.notify(&1), 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn listener_may_unsubscribe_itself() {
        let set: Arc<ListenerSet<u32>> = Arc::new(ListenerSet::new("test"));
        let own_id = Arc::new(std::sync::Mutex::new(None::<SubscriptionId>));

        let handle = set.clone();
        let slot = own_id.clone();
        let id = set.insert(Arc::new(move |_: &u32| {
            if let Some(id) = *slot.lock().unwrap() {
                handle.remove(id);
            }
        }));
        *own_id.lock().unwrap() = Some(id);

        set.notify(&1);
        assert!(set.is_empty());
    }
}
