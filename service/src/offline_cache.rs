//! Read cache of domain data for offline display.

use crate::error::Result;
use crate::now_millis;
use crate::storage::KeyValueStore;
use outbox_engine::{OfflineData, OfflineDataUpdate};
use std::sync::Arc;

/// Cached events, expenses and participants stored under one key.
pub struct OfflineCache {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl OfflineCache {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Merge `update` into the cached data and stamp it.
    ///
    /// Lists absent from the update keep their cached contents.
    pub async fn cache(&self, update: OfflineDataUpdate) -> Result<OfflineData> {
        let merged = self.get().await.merge(update, now_millis());
        self.store.set(&self.key, merged.to_json()?).await?;
        tracing::debug!(
            key = %self.key,
            events = merged.events.len(),
            expenses = merged.expenses.len(),
            participants = merged.participants.len(),
            "Offline data cached"
        );
        Ok(merged)
    }

    /// The cached data, or an empty default when nothing usable is stored.
    pub async fn get(&self) -> OfflineData {
        match self.store.get(&self.key).await {
            Ok(Some(json)) => OfflineData::from_json(&json).unwrap_or_else(|e| {
                tracing::warn!(key = %self.key, error = %e, "Corrupt offline cache, ignoring");
                OfflineData::default()
            }),
            Ok(None) => OfflineData::default(),
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "Failed to read offline cache");
                OfflineData::default()
            }
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.remove(&self.key).await?;
        tracing::info!(key = %self.key, "Offline cache cleared");
        Ok(())
    }
}

impl std::fmt::Debug for OfflineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineCache").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn cache_with(store: &Arc<MemoryStore>) -> OfflineCache {
        OfflineCache::new(store.clone(), "@outbox/offline_data")
    }

    #[tokio::test]
    async fn empty_when_nothing_cached() {
        let store = Arc::new(MemoryStore::new());
        let data = cache_with(&store).get().await;
        assert_eq!(data, OfflineData::default());
    }

    #[tokio::test]
    async fn partial_updates_merge() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(&store);

        cache
            .cache(OfflineDataUpdate {
                events: Some(vec![json!({"id": "ev1"})]),
                expenses: Some(vec![json!({"id": "e1"}), json!({"id": "e2"})]),
                ..Default::default()
            })
            .await
            .unwrap();
        let merged = cache
            .cache(OfflineDataUpdate {
                participants: Some(vec![json!({"id": "p1"})]),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(merged.events.len(), 1);
        assert_eq!(merged.expenses.len(), 2);
        assert_eq!(merged.participants.len(), 1);
        assert!(merged.last_updated > 0);
        assert_eq!(cache.get().await, merged);
    }

    #[tokio::test]
    async fn corrupt_cache_reads_as_default() {
        let store = Arc::new(MemoryStore::new());
        store.insert_raw("@outbox/offline_data", "{not json");
        assert_eq!(cache_with(&store).get().await, OfflineData::default());
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.fail_writes(true);
        let result = cache_with(&store).cache(OfflineDataUpdate::default()).await;
        assert!(matches!(result, Err(crate::SyncError::Storage(_))));
    }

    #[tokio::test]
    async fn clear_removes_data() {
        let store = Arc::new(MemoryStore::new());
        let cache = cache_with(&store);
        cache
            .cache(OfflineDataUpdate {
                events: Some(vec![json!({"id": "ev1"})]),
                ..Default::default()
            })
            .await
            .unwrap();

        cache.clear().await.unwrap();
        assert_eq!(store.peek("@outbox/offline_data"), None);
        assert!(cache.get().await.events.is_empty());
    }
}
