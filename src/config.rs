use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_url: String,
    pub origin: String,
    pub session_db: String,
    pub session_id: String,
    pub lock_ttl: Duration,
    pub marker_ttl: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub lock_max_retries: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: env::var("RESERVAS_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api".to_string()),
            origin: env::var("RESERVAS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            session_db: env::var("RESERVAS_SESSION_DB")
                .unwrap_or_else(|_| "reservas-session.db".to_string()),
            session_id: env::var("RESERVAS_SESSION_ID")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            lock_ttl: Duration::from_secs(env_number("RESERVAS_LOCK_TTL_SECS", 300)),
            marker_ttl: Duration::from_secs(env_number("RESERVAS_MARKER_TTL_SECS", 30 * 60)),
            poll_interval: Duration::from_millis(env_number("RESERVAS_POLL_INTERVAL_MS", 1000)),
            request_timeout: Duration::from_secs(env_number("RESERVAS_REQUEST_TIMEOUT_SECS", 10)),
            lock_max_retries: env_number("RESERVAS_LOCK_MAX_RETRIES", 3) as usize,
        }
    }
}

fn env_number(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
