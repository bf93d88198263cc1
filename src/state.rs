use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use crate::config::AppConfig;
use crate::db;
use crate::services::api::http::HttpReservationApi;
use crate::services::api::ReservationApi;
use crate::services::checkout::{CheckoutOptions, CheckoutSession};
use crate::session::{SessionState, SqliteSessionStore};

pub struct AppState {
    pub config: AppConfig,
    pub api: Arc<dyn ReservationApi>,
    pub session: SessionState,
}

impl AppState {
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let api = HttpReservationApi::new(&config.api_url, &config.origin, config.request_timeout)?;
        let conn = db::init_db(&config.session_db)?;
        let store = SqliteSessionStore::new(Arc::new(Mutex::new(conn)), config.session_id.clone());
        let session = SessionState::new(Arc::new(store), config.lock_ttl, config.marker_ttl);

        Ok(Self {
            config,
            api: Arc::new(api),
            session,
        })
    }

    pub fn checkout(&self, facility_id: i64, date: NaiveDate) -> CheckoutSession {
        CheckoutSession::new(
            Arc::clone(&self.api),
            self.session.clone(),
            CheckoutOptions::from_config(&self.config),
            facility_id,
            date,
        )
    }
}
