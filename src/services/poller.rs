use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::errors::ClientError;
use crate::models::Availability;
use crate::services::availability::AvailabilityFetcher;
use crate::services::board::{ApplyOutcome, FetchTicket, SlotBoard};
use crate::services::locking::LockManager;

pub struct SlotRefresher {
    fetcher: AvailabilityFetcher,
    board: Arc<SlotBoard>,
    locks: Arc<LockManager>,
    facility_id: i64,
    date: NaiveDate,
}

impl SlotRefresher {
    pub fn new(
        fetcher: AvailabilityFetcher,
        board: Arc<SlotBoard>,
        locks: Arc<LockManager>,
        facility_id: i64,
        date: NaiveDate,
    ) -> Self {
        Self {
            fetcher,
            board,
            locks,
            facility_id,
            date,
        }
    }

    pub async fn refresh(&self) -> Result<Availability, ClientError> {
        let ticket = self.board.begin_fetch();
        let result = self.fetch().await;
        self.settle(ticket, &result).await;
        result
    }

    async fn fetch(&self) -> Result<Availability, ClientError> {
        self.fetcher.fetch(self.facility_id, self.date).await
    }

    async fn settle(&self, ticket: FetchTicket, result: &Result<Availability, ClientError>) {
        if let ApplyOutcome::Applied {
            cleared_selection: Some(range),
        } = self.board.apply(ticket, result)
        {
            tracing::info!(
                facility_id = self.facility_id,
                date = %self.date,
                range = %range,
                "selected slot is no longer available"
            );
            self.locks.release().await;
        }
    }
}

// Stopping (or dropping) the handle cancels the pending tick and any
// availability request in flight.
pub struct PollHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    // Cancels the loop and waits until it has exited, including a release
    // it already started.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return;
        };
        if let Err(e) = task.await {
            if e.is_panic() {
                tracing::error!(error = %e, "availability poller panicked");
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct AvailabilityPoller;

impl AvailabilityPoller {
    pub fn start(refresher: Arc<SlotRefresher>, interval: Duration) -> PollHandle {
        if interval < MIN_POLL_INTERVAL {
            tracing::warn!(
                requested_ms = interval.as_millis() as u64,
                min_ms = MIN_POLL_INTERVAL.as_millis() as u64,
                "poll interval too short, using the minimum"
            );
        }
        let interval = interval.max(MIN_POLL_INTERVAL);

        let cancel = CancellationToken::new();
        let stop = cancel.clone();

        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = tick.tick() => {}
                }

                let ticket = refresher.board.begin_fetch();
                let result = tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    result = refresher.fetch() => result,
                };
                // A release triggered here must not be cut short.
                refresher.settle(ticket, &result).await;
            }

            tracing::debug!(facility_id = refresher.facility_id, "availability polling stopped");
        });

        PollHandle {
            cancel,
            task: Some(task),
        }
    }
}
