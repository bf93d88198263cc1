#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;

use reservas::models::marker::DEFAULT_MARKER_TTL;
use reservas::models::{
    NewReservation, PaymentUpdate, Reservation, ReservationStatus, SlotKey, TimeRange,
};
use reservas::services::api::{ReservationApi, SlotStatus};
use reservas::session::{MemorySessionStore, SessionState};
use reservas::ClientError;

// ── Fake backend ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Availability,
    Acquire(SlotKey),
    Release(String),
    Create(NewReservation),
    UpdatePayment(i64),
}

pub enum LockReply {
    Unavailable,
    ServerError,
}

pub enum CreateReply {
    Conflict(String),
}

struct Row {
    range: TimeRange,
    locked_by: Option<String>,
}

#[derive(Default)]
struct FakeState {
    rows: Vec<Row>,
    calls: Vec<Call>,
    lock_replies: VecDeque<LockReply>,
    create_replies: VecDeque<CreateReply>,
    availability_fails: bool,
    next_token: u32,
    next_reservation: i64,
}

// In-memory stand-in for the booking backend that records every call.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
    create_delay: Mutex<Option<Duration>>,
    acquire_delay: Mutex<Option<Duration>>,
    availability_delay: Mutex<Option<Duration>>,
}

impl FakeApi {
    pub fn with_slots(ranges: &[&str]) -> Arc<Self> {
        let fake = Self::default();
        fake.set_slots(ranges);
        Arc::new(fake)
    }

    pub fn set_slots(&self, ranges: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.rows = ranges
            .iter()
            .map(|r| Row {
                range: r.parse().unwrap(),
                locked_by: None,
            })
            .collect();
    }

    // Someone else grabs `range`.
    pub fn lock_by_other(&self, range: &str) {
        let range: TimeRange = range.parse().unwrap();
        let mut state = self.state.lock().unwrap();
        for row in state.rows.iter_mut().filter(|r| r.range == range) {
            row.locked_by = Some("someone-else".to_string());
        }
    }

    pub fn unlock(&self, range: &str) {
        let range: TimeRange = range.parse().unwrap();
        let mut state = self.state.lock().unwrap();
        for row in state.rows.iter_mut().filter(|r| r.range == range) {
            row.locked_by = None;
        }
    }

    pub fn locked(&self) -> Vec<TimeRange> {
        let state = self.state.lock().unwrap();
        state
            .rows
            .iter()
            .filter(|r| r.locked_by.is_some())
            .map(|r| r.range)
            .collect()
    }

    pub fn remove_slot(&self, range: &str) {
        let range: TimeRange = range.parse().unwrap();
        self.state.lock().unwrap().rows.retain(|r| r.range != range);
    }

    pub fn push_lock_reply(&self, reply: LockReply) {
        self.state.lock().unwrap().lock_replies.push_back(reply);
    }

    pub fn push_create_reply(&self, reply: CreateReply) {
        self.state.lock().unwrap().create_replies.push_back(reply);
    }

    pub fn fail_availability(&self, fail: bool) {
        self.state.lock().unwrap().availability_fails = fail;
    }

    pub fn delay_create(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = Some(delay);
    }

    pub fn delay_acquire(&self, delay: Duration) {
        *self.acquire_delay.lock().unwrap() = Some(delay);
    }

    // Rows are read when the request arrives; the reply lands after `delay`.
    pub fn delay_availability(&self, delay: Duration) {
        *self.availability_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn releases(&self) -> usize {
        self.count(|c| matches!(c, Call::Release(_)))
    }

    pub fn acquires(&self) -> usize {
        self.count(|c| matches!(c, Call::Acquire(_)))
    }

    pub fn creates(&self) -> usize {
        self.count(|c| matches!(c, Call::Create(_)))
    }
}

#[async_trait]
impl ReservationApi for FakeApi {
    async fn availability(
        &self,
        _facility_id: i64,
        _date: NaiveDate,
    ) -> Result<Vec<SlotStatus>, ClientError> {
        let reply = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Availability);
            if state.availability_fails {
                Err(ClientError::Server {
                    status: StatusCode::BAD_GATEWAY,
                    body: "upstream down".to_string(),
                })
            } else {
                Ok(state
                    .rows
                    .iter()
                    .map(|r| SlotStatus {
                        hora_inicio: format!("{}:00", r.range.start_hhmm()),
                        hora_fin: format!("{}:00", r.range.end_hhmm()),
                        bloqueado_temporalmente: r.locked_by.is_some(),
                    })
                    .collect())
            }
        };

        let delay = *self.availability_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }

    async fn acquire_lock(&self, slot: &SlotKey) -> Result<String, ClientError> {
        let delay = *self.acquire_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Acquire(slot.clone()));

        match state.lock_replies.pop_front() {
            Some(LockReply::Unavailable) => return Err(ClientError::SlotUnavailable),
            Some(LockReply::ServerError) => {
                return Err(ClientError::Server {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: "busy".to_string(),
                })
            }
            None => {}
        }

        state.next_token += 1;
        let token = format!("tok-{}", state.next_token);
        let row = state.rows.iter_mut().find(|r| r.range == slot.range);
        match row {
            Some(row) if row.locked_by.is_none() => {
                row.locked_by = Some(token.clone());
                Ok(token)
            }
            _ => Err(ClientError::SlotUnavailable),
        }
    }

    async fn release_lock(&self, token: &str) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Release(token.to_string()));
        for row in state.rows.iter_mut() {
            if row.locked_by.as_deref() == Some(token) {
                row.locked_by = None;
            }
        }
        Ok(())
    }

    async fn create_reservation(
        &self,
        reservation: &NewReservation,
    ) -> Result<Reservation, ClientError> {
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create(reservation.clone()));
        if let Some(CreateReply::Conflict(message)) = state.create_replies.pop_front() {
            return Err(ClientError::Conflict(message));
        }

        state.next_reservation += 1;
        Ok(Reservation {
            id: state.next_reservation,
            instalacion_id: Some(reservation.instalacion_id),
            fecha: Some(reservation.fecha),
            hora_inicio: Some(reservation.hora_inicio.clone()),
            hora_fin: Some(reservation.hora_fin.clone()),
            estado: Some(ReservationStatus::Pendiente),
            estado_pago: None,
            metodo_pago: Some(reservation.metodo_pago),
        })
    }

    async fn update_payment(
        &self,
        reservation_id: i64,
        update: &PaymentUpdate,
    ) -> Result<Reservation, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::UpdatePayment(reservation_id));
        Ok(Reservation {
            id: reservation_id,
            instalacion_id: None,
            fecha: None,
            hora_inicio: None,
            hora_fin: None,
            estado: Some(update.estado),
            estado_pago: Some(update.estado_pago),
            metodo_pago: None,
        })
    }
}

// ── Helpers ──

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

pub fn range(s: &str) -> TimeRange {
    s.parse().unwrap()
}

pub fn slot(facility_id: i64, r: &str) -> SlotKey {
    SlotKey::new(facility_id, date(), range(r))
}

pub fn memory_session() -> SessionState {
    SessionState::new(
        Arc::new(MemorySessionStore::new()),
        Duration::from_secs(300),
        DEFAULT_MARKER_TTL,
    )
}
