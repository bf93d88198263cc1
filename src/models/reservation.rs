use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::ClientError;

use super::SlotKey;

pub const MAX_COMMENT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Efectivo,
    Tarjeta,
    Transferencia,
}

impl PaymentMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "EFECTIVO" | "CASH" => Some(PaymentMethod::Efectivo),
            "TARJETA" | "CARD" => Some(PaymentMethod::Tarjeta),
            "TRANSFERENCIA" | "TRANSFER" => Some(PaymentMethod::Transferencia),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pendiente,
    Confirmada,
    Cancelada,
    Completada,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pendiente,
    Pagado,
    Reembolsado,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationForm {
    pub payment_method: PaymentMethod,
    pub attendees: u32,
    pub comments: Option<String>,
}

impl ReservationForm {
    pub fn validate(&self, max_attendees: Option<u32>) -> Result<(), ClientError> {
        if self.attendees == 0 {
            return Err(ClientError::Validation(
                "at least one attendee is required".to_string(),
            ));
        }
        if let Some(max) = max_attendees {
            if self.attendees > max {
                return Err(ClientError::Validation(format!(
                    "this facility admits at most {max} attendees"
                )));
            }
        }
        if let Some(comments) = &self.comments {
            if comments.chars().count() > MAX_COMMENT_CHARS {
                return Err(ClientError::Validation(format!(
                    "comments must be at most {MAX_COMMENT_CHARS} characters"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewReservation {
    pub instalacion_id: i64,
    pub fecha: NaiveDate,
    pub hora_inicio: String,
    pub hora_fin: String,
    pub metodo_pago: PaymentMethod,
    pub numero_asistentes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comentarios: Option<String>,
}

impl NewReservation {
    pub fn from_form(slot: &SlotKey, form: &ReservationForm) -> Self {
        Self {
            instalacion_id: slot.facility_id,
            fecha: slot.date,
            hora_inicio: slot.range.start_hhmm(),
            hora_fin: slot.range.end_hhmm(),
            metodo_pago: form.payment_method,
            numero_asistentes: form.attendees,
            comentarios: form
                .comments
                .as_ref()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: i64,
    #[serde(default)]
    pub instalacion_id: Option<i64>,
    #[serde(default)]
    pub fecha: Option<NaiveDate>,
    #[serde(default)]
    pub hora_inicio: Option<String>,
    #[serde(default)]
    pub hora_fin: Option<String>,
    #[serde(default)]
    pub estado: Option<ReservationStatus>,
    #[serde(default)]
    pub estado_pago: Option<PaymentStatus>,
    #[serde(default)]
    pub metodo_pago: Option<PaymentMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUpdate {
    pub estado_pago: PaymentStatus,
    pub estado: ReservationStatus,
}

impl PaymentUpdate {
    pub fn paid() -> Self {
        Self {
            estado_pago: PaymentStatus::Pagado,
            estado: ReservationStatus::Confirmada,
        }
    }
}
