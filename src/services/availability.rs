use std::sync::Arc;

use chrono::NaiveDate;

use crate::errors::ClientError;
use crate::models::{Availability, LockToken, SlotKey, TimeRange, TimeSlot};
use crate::services::api::{ReservationApi, SlotStatus};
use crate::session::SessionState;

#[derive(Clone)]
pub struct AvailabilityFetcher {
    api: Arc<dyn ReservationApi>,
    session: SessionState,
}

impl AvailabilityFetcher {
    pub fn new(api: Arc<dyn ReservationApi>, session: SessionState) -> Self {
        Self { api, session }
    }

    pub async fn fetch(&self, facility_id: i64, date: NaiveDate) -> Result<Availability, ClientError> {
        let own_lock = self.session.lock_token()?;

        let rows = self
            .api
            .availability(facility_id, date)
            .await
            .inspect_err(|e| {
                tracing::warn!(facility_id, %date, error = %e, "failed to fetch availability");
            })?;

        Ok(classify(facility_id, date, rows, own_lock.as_ref()))
    }

    pub async fn is_slot_still_available(&self, slot: &SlotKey) -> Result<bool, ClientError> {
        let availability = self.fetch(slot.facility_id, slot.date).await?;
        let available = availability.is_selectable(&slot.range);
        if !available {
            tracing::info!(%slot, "slot was taken before submission");
        }
        Ok(available)
    }
}

pub fn classify(
    facility_id: i64,
    date: NaiveDate,
    rows: Vec<SlotStatus>,
    own_lock: Option<&LockToken>,
) -> Availability {
    let mut availability = Availability::empty();

    for row in rows {
        let range = match TimeRange::parse_parts(&row.hora_inicio, &row.hora_fin) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    facility_id,
                    start = %row.hora_inicio,
                    end = %row.hora_fin,
                    error = %e,
                    "skipping malformed slot"
                );
                continue;
            }
        };

        let key = SlotKey::new(facility_id, date, range);
        let ours = own_lock.is_some_and(|t| t.covers(&key));
        let locked_by_other = row.bloqueado_temporalmente && !ours;

        let slot = TimeSlot {
            facility_id,
            date,
            range,
            locked_by_other,
        };
        if locked_by_other {
            availability.locked_by_other.push(slot);
        } else {
            availability.available.push(slot);
        }
    }

    availability
}
