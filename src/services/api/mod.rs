pub mod http;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::ClientError;
use crate::models::{NewReservation, PaymentUpdate, Reservation, SlotKey};

// One row of `GET /instalaciones/{id}/disponibilidad`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatus {
    pub hora_inicio: String,
    pub hora_fin: String,
    #[serde(default)]
    pub bloqueado_temporalmente: bool,
}

// Body of `POST /bloqueos-temporales`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockRequest {
    pub instalacion_id: i64,
    pub fecha: NaiveDate,
    pub hora_inicio: String,
    pub hora_fin: String,
}

impl LockRequest {
    pub fn for_slot(slot: &SlotKey) -> Self {
        Self {
            instalacion_id: slot.facility_id,
            fecha: slot.date,
            hora_inicio: slot.range.start_hhmm(),
            hora_fin: slot.range.end_hhmm(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockResponse {
    pub token: String,
}

#[async_trait]
pub trait ReservationApi: Send + Sync {
    async fn availability(
        &self,
        facility_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<SlotStatus>, ClientError>;

    // Fails with `SlotUnavailable` when someone else holds
    // or booked the slot.
    async fn acquire_lock(&self, slot: &SlotKey) -> Result<String, ClientError>;

    // Releasing an unknown or expired token succeeds.
    async fn release_lock(&self, token: &str) -> Result<(), ClientError>;

    async fn create_reservation(
        &self,
        reservation: &NewReservation,
    ) -> Result<Reservation, ClientError>;

    async fn update_payment(
        &self,
        reservation_id: i64,
        update: &PaymentUpdate,
    ) -> Result<Reservation, ClientError>;
}
