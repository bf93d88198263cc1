use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, ORIGIN, PRAGMA};
use reqwest::{Response, StatusCode};

use super::{LockRequest, LockResponse, ReservationApi, SlotStatus};
use crate::errors::ClientError;
use crate::models::{NewReservation, PaymentUpdate, Reservation, SlotKey};

pub struct HttpReservationApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpReservationApi {
    pub fn new(base_url: &str, origin: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            ORIGIN,
            HeaderValue::from_str(origin)
                .map_err(|_| ClientError::Config(format!("invalid origin: {origin}")))?,
        );

        // The cookie store carries the session cookie on every request.
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl ReservationApi for HttpReservationApi {
    async fn availability(
        &self,
        facility_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<SlotStatus>, ClientError> {
        let resp = self
            .client
            .get(self.url(&format!("/instalaciones/{facility_id}/disponibilidad")))
            .query(&[
                ("fecha", date.format("%Y-%m-%d").to_string()),
                ("_", Utc::now().timestamp_millis().to_string()),
            ])
            .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;

        let slots = check_status(resp).await?.json().await?;
        Ok(slots)
    }

    async fn acquire_lock(&self, slot: &SlotKey) -> Result<String, ClientError> {
        let resp = self
            .client
            .post(self.url("/bloqueos-temporales"))
            .json(&LockRequest::for_slot(slot))
            .send()
            .await?;

        if matches!(
            resp.status(),
            StatusCode::CONFLICT | StatusCode::GONE | StatusCode::LOCKED
        ) {
            return Err(ClientError::SlotUnavailable);
        }

        let lock: LockResponse = check_status(resp).await?.json().await?;
        Ok(lock.token)
    }

    async fn release_lock(&self, token: &str) -> Result<(), ClientError> {
        let resp = self
            .client
            .delete(self.url(&format!("/bloqueos-temporales/{token}")))
            .send()
            .await?;

        if matches!(resp.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            tracing::debug!(token, "lock was already gone");
            return Ok(());
        }

        check_status(resp).await?;
        Ok(())
    }

    async fn create_reservation(
        &self,
        reservation: &NewReservation,
    ) -> Result<Reservation, ClientError> {
        let resp = self
            .client
            .post(self.url("/reservas"))
            .json(reservation)
            .send()
            .await?;

        if resp.status() == StatusCode::CONFLICT {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Conflict(error_message(&body)));
        }

        let created = check_status(resp).await?.json().await?;
        Ok(created)
    }

    async fn update_payment(
        &self,
        reservation_id: i64,
        update: &PaymentUpdate,
    ) -> Result<Reservation, ClientError> {
        let resp = self
            .client
            .put(self.url(&format!("/reservas/{reservation_id}/actualizar-pago")))
            .json(update)
            .send()
            .await?;

        let updated = check_status(resp).await?.json().await?;
        Ok(updated)
    }
}

async fn check_status(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = error_message(&resp.text().await.unwrap_or_default());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(ClientError::Server { status, body })
    } else {
        Err(ClientError::Rejected { status, body })
    }
}

fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            ["message", "mensaje", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(|m| m.as_str()))
        })
        .map(|s| s.to_string())
        .unwrap_or_else(|| body.trim().to_string())
}
