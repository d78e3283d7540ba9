//! Last-write-wins conflict resolution.
//!
//! Callers that hold a cached (local) copy of an entity alongside a fresh
//! (remote) copy use [`resolve`] to pick the version to keep. The sync engine
//! never calls this itself; it is a utility for the business layer.
//!
//! # Rule
//!
//! 1. Each version's effective time is `updated_at`, falling back to
//!    `created_at`, falling back to 0
//! 2. The later effective time wins
//! 3. Ties go to the remote version (the server is authoritative)

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// How a conflict was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictResolution {
    /// Local version won
    LocalWins,
    /// Remote version won
    RemoteWins,
}

/// The outcome of [`resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub winner: T,
    pub resolution: ConflictResolution,
}

/// A version of an entity that carries modification timestamps.
pub trait Timestamped {
    fn updated_at(&self) -> Option<Timestamp>;
    fn created_at(&self) -> Option<Timestamp>;

    /// The timestamp used for last-write-wins comparison.
    fn effective_time(&self) -> Timestamp {
        self.updated_at().or_else(|| self.created_at()).unwrap_or(0)
    }
}

/// Pick the version with the later effective time; ties favour `remote`.
pub fn resolve<T: Timestamped>(local: T, remote: T) -> Resolved<T> {
    if local.effective_time() > remote.effective_time() {
        Resolved {
            winner: local,
            resolution: ConflictResolution::LocalWins,
        }
    } else {
        Resolved {
            winner: remote,
            resolution: ConflictResolution::RemoteWins,
        }
    }
}

/// Read a millisecond timestamp stored as a JSON number or numeric string.
fn json_millis(value: &serde_json::Value, field: &str) -> Option<Timestamp> {
    match value.get(field)? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Domain documents are plain JSON with camelCase `updatedAt`/`createdAt`.
impl Timestamped for serde_json::Value {
    fn updated_at(&self) -> Option<Timestamp> {
        json_millis(self, "updatedAt")
    }

    fn created_at(&self) -> Option<Timestamp> {
        json_millis(self, "createdAt")
    }
}

impl<T: Timestamped> Timestamped for &T {
    fn updated_at(&self) -> Option<Timestamp> {
        (**self).updated_at()
    }

    fn created_at(&self) -> Option<Timestamp> {
        (**self).created_at()
    }
}
