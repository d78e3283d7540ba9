//! Derived sync status broadcast to the UI layer.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Snapshot of queue and connectivity state.
///
/// Never persisted; recomputed whenever the queue or the network changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    /// Operations still waiting to reach the backend
    pub pending_count: usize,
    /// Operations evicted after exhausting their retries since the last clear
    pub failed_count: usize,
    /// When the last drain finished (milliseconds since epoch)
    pub last_sync_at: Option<Timestamp>,
}

/// Display language for human-readable status strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
}

impl SyncStatus {
    pub fn has_errors(&self) -> bool {
        self.failed_count > 0
    }

    /// Describe how long ago the last sync happened, relative to `now`.
    pub fn describe_last_sync(&self, now: Timestamp, language: Language) -> String {
        let Some(last) = self.last_sync_at else {
            return match language {
                Language::En => "Never".to_string(),
                Language::Es => "Nunca".to_string(),
            };
        };

        let elapsed = now.saturating_sub(last);
        let minutes = elapsed / MINUTE_MS;
        let hours = elapsed / HOUR_MS;
        let days = elapsed / DAY_MS;

        match language {
            Language::En if minutes < 1 => "Just now".to_string(),
            Language::Es if minutes < 1 => "Justo ahora".to_string(),
            Language::En if minutes < 60 => format!("{} min ago", minutes),
            Language::Es if minutes < 60 => format!("Hace {} min", minutes),
            Language::En if hours < 24 => format!("{}h ago", hours),
            Language::Es if hours < 24 => format!("Hace {}h", hours),
            Language::En => format!("{} days ago", days),
            Language::Es => format!("Hace {} días", days),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synced_at(last: Timestamp) -> SyncStatus {
        SyncStatus {
            last_sync_at: Some(last),
            ..SyncStatus::default()
        }
    }

    #[test]
    fn never_synced() {
        let status = SyncStatus::default();
        assert_eq!(status.describe_last_sync(5000, Language::En), "Never");
        assert_eq!(status.describe_last_sync(5000, Language::Es), "Nunca");
    }

    #[test]
    fn relative_descriptions() {
        let now = 10 * DAY_MS;
        let cases = [
            (now - 30 * 1000, "Just now", "Justo ahora"),
            (now - 5 * MINUTE_MS, "5 min ago", "Hace 5 min"),
            (now - 3 * HOUR_MS, "3h ago", "Hace 3h"),
            (now - 2 * DAY_MS, "2 days ago", "Hace 2 días"),
        ];

        for (last, en, es) in cases {
            let status = synced_at(last);
            assert_eq!(status.describe_last_sync(now, Language::En), en);
            assert_eq!(status.describe_last_sync(now, Language::Es), es);
        }
    }

    #[test]
    fn future_timestamp_reads_as_just_now() {
        let status = synced_at(9000);
        assert_eq!(status.describe_last_sync(1000, Language::En), "Just now");
    }

    #[test]
    fn has_errors_tracks_failed_count() {
        let mut status = SyncStatus::default();
        assert!(!status.has_errors());
        status.failed_count = 1;
        assert!(status.has_errors());
    }

    #[test]
    fn serialization_format() {
        let status = SyncStatus {
            is_online: true,
            pending_count: 2,
            ..SyncStatus::default()
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"isOnline\":true"));
        assert!(json.contains("\"pendingCount\":2"));
        assert!(json.contains("\"lastSyncAt\":null"));
    }
}
