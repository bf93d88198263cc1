use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SlotKey;

pub const DEFAULT_MARKER_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingMarker {
    pub slot: SlotKey,
    pub created_at: DateTime<Utc>,
}

impl BookingMarker {
    pub fn new(slot: SlotKey) -> Self {
        Self {
            slot,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return false;
        };
        now.signed_duration_since(self.created_at) >= ttl
    }

    pub fn matches(&self, slot: &SlotKey) -> bool {
        self.slot == *slot
    }
}
