//! # Outbox Service
//!
//! The async runtime around `outbox-engine`: durable queue storage,
//! connectivity tracking, status broadcasting and the drain loop that replays
//! queued operations through an injected [`OperationExecutor`].
//!
//! ## Components
//!
//! - [`OperationQueue`]: the persisted FIFO list of operations
//! - [`NetworkMonitor`]: current connectivity plus edge-triggered listeners
//! - [`StatusPublisher`]: broadcasts [`SyncStatus`] snapshots
//! - [`SyncEngine`]: single-flight drains, retries and lifecycle
//! - [`OfflineCache`]: cached domain data for offline display
//!
//! ## Quick Start
//!
//! ```rust
//! use outbox_service::{
//!     EntityType, ExecuteError, FnExecutor, MemoryStore, NetworkMonitor, OperationKind,
//!     SyncConfig, SyncEngine,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let network = NetworkMonitor::new_shared(false);
//! let executor = FnExecutor::new(|_op| Box::pin(async { Ok::<(), ExecuteError>(()) }));
//! let engine = SyncEngine::new(
//!     SyncConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     network.clone(),
//!     Arc::new(executor),
//! );
//! engine.initialize().await;
//!
//! engine
//!     .enqueue(OperationKind::Create, EntityType::Expense, "e1", json!({"amount": 50}))
//!     .await;
//! assert_eq!(engine.status().pending_count, 1);
//!
//! network.set_online(true);
//! engine.wait_idle().await;
//! assert_eq!(engine.status().pending_count, 0);
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod listeners;
pub mod network;
pub mod offline_cache;
pub mod publisher;
pub mod queue;
pub mod storage;

pub use config::{ConfigError, SyncConfig};
pub use engine::{DrainReport, SyncEngine};
pub use error::{Result, StorageError, SyncError};
pub use executor::{ExecuteError, FnExecutor, OperationExecutor};
pub use listeners::SubscriptionId;
pub use network::NetworkMonitor;
pub use offline_cache::OfflineCache;
pub use publisher::StatusPublisher;
pub use queue::OperationQueue;
pub use storage::{FileStore, KeyValueStore, MemoryStore};

pub use outbox_engine::{
    EntityType, Language, OfflineData, OfflineDataUpdate, Operation, OperationKind,
    OperationStatus, SyncStatus,
};

/// Wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> outbox_engine::Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
