use chrono::{DateTime, Utc};

use crate::errors::ClientError;
use crate::models::{BookingMarker, SlotKey};
use crate::session::SessionState;

#[derive(Clone)]
pub struct DuplicateGuard {
    session: SessionState,
}

impl DuplicateGuard {
    pub fn new(session: SessionState) -> Self {
        Self { session }
    }

    pub fn should_redirect_to_existing_booking(&self, slot: &SlotKey) -> Result<bool, ClientError> {
        self.should_redirect_at(slot, Utc::now())
    }

    pub fn should_redirect_at(&self, slot: &SlotKey, now: DateTime<Utc>) -> Result<bool, ClientError> {
        let Some(marker) = self.session.booking_marker(now)? else {
            return Ok(false);
        };

        // A marker for another slot never blocks a new booking; the next
        // successful booking overwrites it.
        let duplicate = marker.matches(slot);
        if duplicate {
            tracing::info!(%slot, "slot was just booked by this session");
        }
        Ok(duplicate)
    }

    pub fn record(&self, slot: &SlotKey) -> Result<(), ClientError> {
        self.session.store_booking_marker(&BookingMarker::new(slot.clone()))
    }
}
