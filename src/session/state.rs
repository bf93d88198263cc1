use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use super::SessionStore;
use crate::errors::ClientError;
use crate::models::{BookingMarker, LockToken, SlotKey};

pub const LOCK_TOKEN_KEY: &str = "reservas.lock_token";
pub const BOOKING_MARKER_KEY: &str = "reservas.booking_marker";

#[derive(Clone)]
pub struct SessionState {
    store: Arc<dyn SessionStore>,
    lock_ops: Arc<Mutex<()>>,
    lock_ttl: Duration,
    marker_ttl: Duration,
}

impl SessionState {
    pub fn new(store: Arc<dyn SessionStore>, lock_ttl: Duration, marker_ttl: Duration) -> Self {
        Self {
            store,
            lock_ops: Arc::new(Mutex::new(())),
            lock_ttl,
            marker_ttl,
        }
    }

    pub fn lock_ttl(&self) -> Duration {
        self.lock_ttl
    }

    // ── Lock token ──

    // Every clone of this session shares the guard, so lock operations from
    // different checkouts never interleave.
    pub async fn lock_ops(&self) -> MutexGuard<'_, ()> {
        self.lock_ops.lock().await
    }

    pub fn lock_token(&self) -> Result<Option<LockToken>, ClientError> {
        self.read_json(LOCK_TOKEN_KEY)
    }

    pub fn reusable_lock(
        &self,
        slot: &SlotKey,
        now: DateTime<Utc>,
    ) -> Result<Option<LockToken>, ClientError> {
        Ok(self
            .lock_token()?
            .filter(|t| t.covers(slot) && t.is_fresh(self.lock_ttl, now)))
    }

    pub fn store_lock(&self, token: &LockToken) -> Result<(), ClientError> {
        self.write_json(LOCK_TOKEN_KEY, token)
    }

    pub fn take_lock(&self) -> Result<Option<LockToken>, ClientError> {
        let token = self.lock_token()?;
        if token.is_some() {
            self.store.remove(LOCK_TOKEN_KEY)?;
        }
        Ok(token)
    }

    // ── Booking marker ──

    pub fn booking_marker(&self, now: DateTime<Utc>) -> Result<Option<BookingMarker>, ClientError> {
        let Some(marker) = self.read_json::<BookingMarker>(BOOKING_MARKER_KEY)? else {
            return Ok(None);
        };
        if marker.is_expired(self.marker_ttl, now) {
            tracing::debug!(slot = %marker.slot, "purging expired booking marker");
            self.store.remove(BOOKING_MARKER_KEY)?;
            return Ok(None);
        }
        Ok(Some(marker))
    }

    pub fn store_booking_marker(&self, marker: &BookingMarker) -> Result<(), ClientError> {
        self.write_json(BOOKING_MARKER_KEY, marker)
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ClientError> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding unreadable session entry");
                self.store.remove(key)?;
                Ok(None)
            }
        }
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ClientError> {
        let raw = serde_json::to_string(value)?;
        self.store.put(key, &raw)
    }
}
