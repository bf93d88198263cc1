use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::errors::ClientError;
use crate::models::{LockState, LockToken, SlotKey};
use crate::services::api::ReservationApi;
use crate::services::retry::{retry_transient, RetryPolicy};
use crate::session::SessionState;

pub struct LockManager {
    api: Arc<dyn ReservationApi>,
    session: SessionState,
    policy: RetryPolicy,
    state_tx: watch::Sender<LockState>,
}

impl LockManager {
    pub fn new(api: Arc<dyn ReservationApi>, session: SessionState, policy: RetryPolicy) -> Self {
        let (state_tx, _) = watch::channel(LockState::Idle);
        Self {
            api,
            session,
            policy,
            state_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LockState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> LockState {
        self.state_tx.borrow().clone()
    }

    pub fn lock_ttl(&self) -> Duration {
        self.session.lock_ttl()
    }

    pub fn held(&self) -> Result<Option<LockToken>, ClientError> {
        self.session.lock_token()
    }

    pub async fn acquire(&self, slot: SlotKey) -> Result<LockToken, ClientError> {
        let _op = self.session.lock_ops().await;

        // A reload of the confirmation step keeps using the stored token.
        if let Some(existing) = self.session.reusable_lock(&slot, Utc::now())? {
            tracing::debug!(%slot, "reusing stored lock");
            self.set_state(LockState::Locked {
                token: existing.clone(),
            });
            return Ok(existing);
        }

        self.release_held().await;

        self.set_state(LockState::Locking { slot: slot.clone() });
        let api = &self.api;
        let target = &slot;
        let result = retry_transient(&self.policy, move || api.acquire_lock(target)).await;

        match result {
            Ok(raw) => {
                let token = LockToken::new(raw, slot);
                if let Err(e) = self.session.store_lock(&token) {
                    // Without a stored token nobody could release it later.
                    tracing::error!(error = %e, "failed to persist lock token");
                    self.spawn_release(token.token.clone());
                    self.set_state(LockState::Idle);
                    return Err(e);
                }
                tracing::info!(slot = %token.slot, "slot locked");
                self.set_state(LockState::Locked {
                    token: token.clone(),
                });
                Ok(token)
            }
            Err(ClientError::SlotUnavailable) => {
                tracing::info!(%slot, "slot is locked by someone else");
                self.set_state(LockState::Conflict { slot });
                Err(ClientError::SlotUnavailable)
            }
            Err(e) => {
                tracing::warn!(%slot, error = %e, "failed to lock slot");
                self.set_state(LockState::Idle);
                Err(e)
            }
        }
    }

    // Best-effort: waits for the backend but never fails. Releasing with
    // nothing held is a no-op.
    pub async fn release(&self) {
        let _op = self.session.lock_ops().await;
        self.release_held().await;
    }

    pub fn release_detached(&self) {
        let token = match self.session.take_lock() {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read lock token during teardown");
                return;
            }
        };
        self.set_state(LockState::Idle);
        self.spawn_release(token.token);
    }

    pub fn mark_expired(&self) {
        let slot = match self.session.take_lock() {
            Ok(Some(token)) => token.slot,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "failed to clear expired lock token");
                return;
            }
        };
        tracing::info!(%slot, "lock expired");
        self.set_state(LockState::Expired { slot });
    }

    async fn release_held(&self) {
        let token = match self.session.take_lock() {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read lock token");
                return;
            }
        };

        self.set_state(LockState::Releasing {
            slot: token.slot.clone(),
        });
        match self.api.release_lock(&token.token).await {
            Ok(()) => tracing::info!(slot = %token.slot, "lock released"),
            Err(e) => {
                tracing::warn!(slot = %token.slot, error = %e, "failed to release lock, server TTL will reclaim it");
            }
        }
        self.set_state(LockState::Idle);
    }

    fn spawn_release(&self, token: String) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no runtime available to release lock, server TTL will reclaim it");
            return;
        };
        let api = Arc::clone(&self.api);
        handle.spawn(async move {
            if let Err(e) = api.release_lock(&token).await {
                tracing::warn!(error = %e, "failed to release lock, server TTL will reclaim it");
            }
        });
    }

    fn set_state(&self, state: LockState) {
        tracing::debug!(state = state.as_str(), "lock state");
        self.state_tx.send_replace(state);
    }
}
