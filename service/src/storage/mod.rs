//! Key/value persistence boundary.
//!
//! The queue, the last sync time and the offline cache are each stored as
//! one string value under a namespaced key, mirroring the platform key/value
//! stores available on mobile targets.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::StorageError;
use async_trait::async_trait;

/// An async string key/value store.
///
/// `set` must replace the value in a single write so readers never observe a
/// partially written value.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` if the key was never written or was removed.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the value stored under `key`.
    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Delete `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}
