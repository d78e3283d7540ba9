//! # Outbox Engine
//!
//! The deterministic core of an offline-first operation queue.
//!
//! Mutations made while a device may be offline are captured as
//! [`Operation`]s, persisted, and replayed against the backend once
//! connectivity returns. This crate holds the pieces of that system that need
//! no IO: operation state transitions, id issuance, per-entity partitioning,
//! the status snapshot, the persisted layout and last-write-wins resolution.
//! The async runtime around it lives in `outbox-service`.
//!
//! ## Design Principles
//!
//! - **No IO**: no knowledge of files, network, or platform
//! - **Deterministic**: same inputs always produce same outputs
//! - **Testable**: pure logic, no mocks needed
//!
//! ## Core Concepts
//!
//! ### Operations
//!
//! An [`Operation`] records one `Create`, `Update` or `Delete` of a domain
//! entity. It moves `Pending → InFlight → {removed | Pending | Dropped}`;
//! [`Operation::record_failure`] enforces the retry budget.
//!
//! ### Ordering
//!
//! Ids come from an [`OpClock`] and sort in issue order, which is queue
//! order. [`partition_by_entity`] splits a snapshot so each entity's
//! operations stay sequential while different entities proceed concurrently.
//!
//! ### Conflicts
//!
//! [`resolve`] picks between a local and a remote version of an entity using
//! last-write-wins on `updatedAt`/`createdAt`, with ties going to the remote.
//!
//! ## Quick Start
//!
//! ```rust
//! use outbox_engine::{
//!     partition_by_entity, EntityType, OpClock, Operation, OperationKind, RetryDecision,
//! };
//! use serde_json::json;
//!
//! let mut clock = OpClock::new();
//! let create = Operation::new(
//!     clock.next_id(1706745600000),
//!     OperationKind::Create,
//!     EntityType::Expense,
//!     "e1",
//!     json!({"amount": 50}),
//!     1706745600000,
//! );
//! let mut update = Operation::new(
//!     clock.next_id(1706745600000),
//!     OperationKind::Update,
//!     EntityType::Expense,
//!     "e1",
//!     json!({"amount": 55}),
//!     1706745600000,
//! );
//! assert!(create.id < update.id);
//!
//! assert_eq!(update.record_failure("timeout", 3), RetryDecision::Retry);
//!
//! let partitions = partition_by_entity(vec![create, update]);
//! assert_eq!(partitions.len(), 1);
//! assert_eq!(partitions[0].operations[0].kind, OperationKind::Create);
//! ```

pub mod clock;
pub mod conflict;
pub mod error;
pub mod operation;
pub mod partition;
pub mod snapshot;
pub mod status;

// Re-export main types at crate root
pub use clock::{OpClock, Stamp};
pub use conflict::{resolve, ConflictResolution, Resolved, Timestamped};
pub use error::Error;
pub use operation::{EntityType, Operation, OperationKind, OperationStatus, RetryDecision};
pub use partition::{partition_by_entity, Partition};
pub use snapshot::{OfflineData, OfflineDataUpdate, QueueSnapshot};
pub use status::{Language, SyncStatus};

/// Type aliases for clarity
pub type OperationId = String;
pub type EntityId = String;
pub type Timestamp = u64;

/// Default retry budget per operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
