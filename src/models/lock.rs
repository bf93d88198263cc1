use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SlotKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken {
    pub token: String,
    pub slot: SlotKey,
    pub acquired_at: DateTime<Utc>,
}

impl LockToken {
    pub fn new(token: String, slot: SlotKey) -> Self {
        Self {
            token,
            slot,
            acquired_at: Utc::now(),
        }
    }

    pub fn covers(&self, slot: &SlotKey) -> bool {
        self.slot == *slot
    }

    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return true;
        };
        now.signed_duration_since(self.acquired_at) < ttl
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockState {
    Idle,
    Locking { slot: SlotKey },
    Locked { token: LockToken },
    Releasing { slot: SlotKey },
    Conflict { slot: SlotKey },
    Expired { slot: SlotKey },
}

impl LockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Idle => "idle",
            LockState::Locking { .. } => "locking",
            LockState::Locked { .. } => "locked",
            LockState::Releasing { .. } => "releasing",
            LockState::Conflict { .. } => "conflict",
            LockState::Expired { .. } => "expired",
        }
    }

    pub fn held_token(&self) -> Option<&LockToken> {
        match self {
            LockState::Locked { token } => Some(token),
            _ => None,
        }
    }
}
