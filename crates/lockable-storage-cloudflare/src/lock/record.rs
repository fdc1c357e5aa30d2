use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Lock record stored as a KV value or an R2 object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LockData {
    pub acquired_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl LockData {
    /// A record taken now. Leases too long to represent saturate instead of wrapping.
    pub fn new(lease: Option<Duration>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            acquired_at: now,
            expires_at: lease.map(|ttl| {
                now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
            }),
        }
    }

    pub fn is_live(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }

    /// Whether the stored text is a live lock. Unreadable records count as expired.
    pub fn is_live_record(key: &str, text: &str) -> bool {
        match serde_json::from_str::<LockData>(text) {
            Ok(lock_data) => lock_data.is_live(chrono::Utc::now().timestamp_millis()),
            Err(e) => {
                warn!("Ignoring unreadable lock record {}: {}", key, e);
                false
            }
        }
    }
}
