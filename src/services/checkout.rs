use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::watch;

use crate::config::AppConfig;
use crate::errors::ClientError;
use crate::models::{
    Availability, LockState, LockToken, Navigation, NewReservation, PaymentUpdate, Reservation,
    ReservationForm, SlotKey, TimeRange,
};
use crate::services::api::ReservationApi;
use crate::services::availability::AvailabilityFetcher;
use crate::services::board::{BoardSnapshot, SlotBoard};
use crate::services::guard::DuplicateGuard;
use crate::services::locking::LockManager;
use crate::services::poller::{AvailabilityPoller, PollHandle, SlotRefresher};
use crate::services::retry::RetryPolicy;
use crate::session::SessionState;

#[derive(Debug, Clone)]
pub struct CheckoutOptions {
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub max_attendees: Option<u32>,
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            retry: RetryPolicy::default(),
            max_attendees: None,
        }
    }
}

impl CheckoutOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            retry: RetryPolicy::default().with_max_retries(config.lock_max_retries),
            max_attendees: None,
        }
    }
}

pub struct CheckoutSession {
    facility_id: i64,
    date: NaiveDate,
    api: Arc<dyn ReservationApi>,
    fetcher: AvailabilityFetcher,
    locks: Arc<LockManager>,
    guard: DuplicateGuard,
    board: Arc<SlotBoard>,
    refresher: Arc<SlotRefresher>,
    poller: Option<PollHandle>,
    options: CheckoutOptions,
    submitting: AtomicBool,
    release_on_drop: bool,
}

impl CheckoutSession {
    pub fn new(
        api: Arc<dyn ReservationApi>,
        session: SessionState,
        options: CheckoutOptions,
        facility_id: i64,
        date: NaiveDate,
    ) -> Self {
        let fetcher = AvailabilityFetcher::new(Arc::clone(&api), session.clone());
        let locks = Arc::new(LockManager::new(
            Arc::clone(&api),
            session.clone(),
            options.retry.clone(),
        ));
        let board = Arc::new(SlotBoard::new());
        let refresher = Arc::new(SlotRefresher::new(
            fetcher.clone(),
            Arc::clone(&board),
            Arc::clone(&locks),
            facility_id,
            date,
        ));

        Self {
            facility_id,
            date,
            api,
            fetcher,
            locks,
            guard: DuplicateGuard::new(session),
            board,
            refresher,
            poller: None,
            options,
            submitting: AtomicBool::new(false),
            release_on_drop: true,
        }
    }

    pub fn facility_id(&self) -> i64 {
        self.facility_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.board.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardSnapshot> {
        self.board.subscribe()
    }

    pub fn lock_state(&self) -> LockState {
        self.locks.state()
    }

    pub fn subscribe_lock(&self) -> watch::Receiver<LockState> {
        self.locks.subscribe()
    }

    pub fn slot(&self, range: TimeRange) -> SlotKey {
        SlotKey::new(self.facility_id, self.date, range)
    }

    pub fn selected_slot(&self) -> Option<SlotKey> {
        self.board.selected().map(|r| self.slot(r))
    }

    pub fn enter(&self, requested: Option<TimeRange>) -> Result<Navigation, ClientError> {
        if let Some(range) = requested {
            if self
                .guard
                .should_redirect_to_existing_booking(&self.slot(range))?
            {
                return Ok(Navigation::ReservationList);
            }
        }
        Ok(Navigation::Stay)
    }

    // ── Slot selection ──

    pub fn start_polling(&mut self) {
        if self.poller.as_ref().is_some_and(|p| !p.is_stopped()) {
            return;
        }
        tracing::debug!(facility_id = self.facility_id, date = %self.date, "starting availability polling");
        self.poller = Some(AvailabilityPoller::start(
            Arc::clone(&self.refresher),
            self.options.poll_interval,
        ));
    }

    // Returns once the poll loop has exited, so nothing it started can
    // touch the lock afterwards.
    pub async fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.shutdown().await;
        }
    }

    fn cancel_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|p| !p.is_stopped())
    }

    pub async fn refresh(&self) -> Result<Availability, ClientError> {
        self.refresher.refresh().await
    }

    pub async fn select(&self, range: TimeRange) -> Result<(), ClientError> {
        self.board.select(range)?;

        // The lock for a previous slot goes before any new one is requested.
        let slot = self.slot(range);
        if self.locks.held()?.is_some_and(|t| !t.covers(&slot)) {
            self.locks.release().await;
        }
        Ok(())
    }

    pub async fn deselect(&self) {
        self.board.clear_selection();
        self.locks.release().await;
    }

    // ── Confirmation ──

    pub async fn begin_confirmation(&mut self) -> Result<LockToken, ClientError> {
        let had_selection = self.board.selected().is_some();
        self.stop_polling().await;

        // The last poll may have found the slot gone and cleared it.
        let slot = match self.selected_slot() {
            Some(slot) => slot,
            None if had_selection => return Err(ClientError::SlotUnavailable),
            None => return Err(ClientError::NoSelection),
        };
        if self.guard.should_redirect_to_existing_booking(&slot)? {
            return Err(ClientError::DuplicateBooking);
        }

        match self.locks.acquire(slot).await {
            Ok(token) => Ok(token),
            Err(ClientError::SlotUnavailable) => {
                self.board.clear_selection();
                Err(ClientError::SlotUnavailable)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn submit(&self, form: &ReservationForm) -> Result<Reservation, ClientError> {
        form.validate(self.options.max_attendees)?;

        let _in_flight = SubmitFlag::raise(&self.submitting)?;

        let slot = self.selected_slot().ok_or(ClientError::NoSelection)?;
        if self.guard.should_redirect_to_existing_booking(&slot)? {
            return Err(ClientError::DuplicateBooking);
        }

        if !self.fetcher.is_slot_still_available(&slot).await? {
            self.board.clear_selection();
            self.locks.release().await;
            return Err(ClientError::SlotUnavailable);
        }

        // Reuses the stored token unless it is for another slot or stale.
        if let Err(e) = self.locks.acquire(slot.clone()).await {
            if matches!(e, ClientError::SlotUnavailable) {
                self.board.clear_selection();
            }
            return Err(e);
        }

        let body = NewReservation::from_form(&slot, form);
        match self.api.create_reservation(&body).await {
            Ok(reservation) => {
                tracing::info!(reservation_id = reservation.id, %slot, "reservation created");
                if let Err(e) = self.guard.record(&slot) {
                    tracing::warn!(error = %e, "failed to record booking marker");
                }
                self.board.clear_selection();
                self.locks.release().await;
                Ok(reservation)
            }
            Err(ClientError::Conflict(message)) => {
                tracing::warn!(%slot, message = %message, "backend rejected reservation");
                self.board.clear_selection();
                let stale = self
                    .locks
                    .held()?
                    .is_some_and(|t| !t.is_fresh(self.locks.lock_ttl(), Utc::now()));
                if stale {
                    self.locks.mark_expired();
                    return Err(ClientError::LockExpired);
                }
                self.locks.release().await;
                Err(ClientError::Conflict(message))
            }
            Err(e) => {
                tracing::error!(%slot, error = %e, "failed to create reservation");
                Err(e)
            }
        }
    }

    pub async fn record_payment(
        &self,
        reservation_id: i64,
        update: &PaymentUpdate,
    ) -> Result<Reservation, ClientError> {
        let updated = self.api.update_payment(reservation_id, update).await?;
        tracing::info!(reservation_id, "payment state updated");
        Ok(updated)
    }

    // ── Teardown ──

    pub async fn leave(mut self) {
        self.stop_polling().await;
        self.board.clear_selection();
        self.locks.release().await;
        self.release_on_drop = false;
    }

    // Tears down without releasing, so the next session reuses the lock.
    pub fn suspend(mut self) {
        self.cancel_polling();
        self.release_on_drop = false;
    }
}

impl Drop for CheckoutSession {
    fn drop(&mut self) {
        self.cancel_polling();
        if self.release_on_drop {
            self.locks.release_detached();
        }
    }
}

struct SubmitFlag<'a>(&'a AtomicBool);

impl<'a> SubmitFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Result<Self, ClientError> {
        if flag.swap(true, Ordering::SeqCst) {
            return Err(ClientError::SubmissionInFlight);
        }
        Ok(Self(flag))
    }
}

impl Drop for SubmitFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
