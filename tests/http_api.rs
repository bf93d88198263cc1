mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use reservas::models::{
    LockState, NewReservation, PaymentMethod, PaymentStatus, PaymentUpdate, ReservationForm,
    ReservationStatus,
};
use reservas::services::api::http::HttpReservationApi;
use reservas::services::api::ReservationApi;
use reservas::services::locking::LockManager;
use reservas::services::retry::RetryPolicy;
use reservas::{CheckoutOptions, CheckoutSession, ClientError};

use common::{date, memory_session, range, slot};

const ORIGIN: &str = "http://localhost:4200";

// ── Fake backend ──

struct Seen {
    path: String,
    query: HashMap<String, String>,
    headers: HeaderMap,
}

#[derive(Default)]
struct Backend {
    locks: Mutex<HashMap<String, String>>,
    lock_attempts: AtomicUsize,
    failures_left: AtomicUsize,
    seen: Mutex<Vec<Seen>>,
    bodies: Mutex<Vec<Value>>,
}

impl Backend {
    fn record(&self, path: String, query: HashMap<String, String>, headers: HeaderMap) {
        self.seen.lock().unwrap().push(Seen {
            path,
            query,
            headers,
        });
    }

    fn last_seen(&self, path: &str) -> Option<(HashMap<String, String>, HeaderMap)> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.path == path)
            .map(|s| (s.query.clone(), s.headers.clone()))
    }
}

fn lock_key(start: &str, end: &str) -> String {
    format!("{start}-{end}")
}

async fn availability(
    State(backend): State<Arc<Backend>>,
    Path(facility_id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    backend.record(
        format!("/instalaciones/{facility_id}/disponibilidad"),
        query,
        headers,
    );
    if facility_id == 99 {
        return (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").into_response();
    }

    let locks = backend.locks.lock().unwrap();
    let rows: Vec<Value> = [("10:00", "11:00"), ("11:00", "12:00")]
        .iter()
        .map(|(start, end)| {
            json!({
                "horaInicio": format!("{start}:00"),
                "horaFin": format!("{end}:00"),
                "bloqueadoTemporalmente": locks.contains_key(&lock_key(start, end)),
            })
        })
        .collect();

    ([(SET_COOKIE, "JSESSIONID=abc123; Path=/")], Json(rows)).into_response()
}

async fn acquire(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    backend.lock_attempts.fetch_add(1, Ordering::SeqCst);
    backend.record("/bloqueos-temporales".to_string(), HashMap::new(), headers);

    let failing = backend
        .failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        return (StatusCode::SERVICE_UNAVAILABLE, "try again").into_response();
    }

    let key = lock_key(
        body["horaInicio"].as_str().unwrap_or_default(),
        body["horaFin"].as_str().unwrap_or_default(),
    );
    let mut locks = backend.locks.lock().unwrap();
    if locks.contains_key(&key) {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "message": "Horario bloqueado temporalmente" })),
        )
            .into_response();
    }

    let token = uuid::Uuid::new_v4().to_string();
    locks.insert(key, token.clone());
    (StatusCode::CREATED, Json(json!({ "token": token }))).into_response()
}

async fn release(State(backend): State<Arc<Backend>>, Path(token): Path<String>) -> StatusCode {
    let mut locks = backend.locks.lock().unwrap();
    let before = locks.len();
    locks.retain(|_, held| *held != token);
    if locks.len() < before {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn create(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    backend.bodies.lock().unwrap().push(body.clone());

    if body["horaInicio"] == "12:00" {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "mensaje": "La instalación ya está reservada" })),
        )
            .into_response();
    }
    if body["numeroAsistentes"] == 0 {
        return (StatusCode::BAD_REQUEST, "numeroAsistentes must be positive").into_response();
    }

    (
        StatusCode::CREATED,
        Json(json!({
            "id": 41,
            "instalacionId": body["instalacionId"],
            "fecha": body["fecha"],
            "horaInicio": body["horaInicio"],
            "horaFin": body["horaFin"],
            "estado": "PENDIENTE",
            "estadoPago": "PENDIENTE",
            "metodoPago": body["metodoPago"],
        })),
    )
        .into_response()
}

async fn update_payment(Path(id): Path<i64>, Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "id": id,
        "estado": body["estado"],
        "estadoPago": body["estadoPago"],
    }))
}

async fn spawn_backend() -> (String, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    let app = Router::new()
        .route("/api/instalaciones/:id/disponibilidad", get(availability))
        .route("/api/bloqueos-temporales", post(acquire))
        .route("/api/bloqueos-temporales/:token", delete(release))
        .route("/api/reservas", post(create))
        .route("/api/reservas/:id/actualizar-pago", put(update_payment))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Trailing slash on purpose: the client must not double it.
    (format!("http://{addr}/api/"), backend)
}

fn client(base_url: &str) -> Arc<HttpReservationApi> {
    Arc::new(HttpReservationApi::new(base_url, ORIGIN, Duration::from_secs(5)).unwrap())
}

fn new_reservation(r: &str, attendees: u32) -> NewReservation {
    NewReservation::from_form(
        &slot(7, r),
        &ReservationForm {
            payment_method: PaymentMethod::Efectivo,
            attendees,
            comments: None,
        },
    )
}

// ── Availability ──

#[tokio::test]
async fn test_availability_bypasses_caches() {
    let (base, backend) = spawn_backend().await;
    let api = client(&base);

    let rows = api.availability(7, date()).await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].hora_inicio, "10:00:00");
    assert!(!rows[0].bloqueado_temporalmente);

    let (query, headers) = backend.last_seen("/instalaciones/7/disponibilidad").unwrap();
    assert_eq!(query.get("fecha").map(String::as_str), Some("2025-06-01"));
    let buster = query.get("_").expect("cache-busting parameter");
    assert!(buster.parse::<i64>().is_ok());

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("");
    assert!(header("cache-control").contains("no-cache"));
    assert!(header("cache-control").contains("no-store"));
    assert_eq!(header("pragma"), "no-cache");
    assert_eq!(header("origin"), ORIGIN);
    assert_eq!(header("accept"), "application/json");
}

#[tokio::test]
async fn test_session_cookie_is_sent_back() {
    let (base, backend) = spawn_backend().await;
    let api = client(&base);

    api.availability(7, date()).await.unwrap();
    api.acquire_lock(&slot(7, "10:00 - 11:00")).await.unwrap();

    let (_, headers) = backend.last_seen("/bloqueos-temporales").unwrap();
    let cookie = headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert!(cookie.contains("JSESSIONID=abc123"), "cookie header: {cookie:?}");
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (base, _backend) = spawn_backend().await;
    let api = client(&base);

    let err = api.availability(99, date()).await.unwrap_err();

    match &err {
        ClientError::Server { status, body } => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "database unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_transient());
}

// ── Locks ──

#[tokio::test]
async fn test_lock_roundtrip_and_idempotent_release() {
    let (base, backend) = spawn_backend().await;
    let api = client(&base);

    let token = api.acquire_lock(&slot(7, "10:00 - 11:00")).await.unwrap();
    assert!(!token.is_empty());

    let rows = api.availability(7, date()).await.unwrap();
    assert!(rows[0].bloqueado_temporalmente);

    api.release_lock(&token).await.unwrap();
    assert!(backend.locks.lock().unwrap().is_empty());

    // Already gone: the backend answers 404, which still counts as released.
    api.release_lock(&token).await.unwrap();
}

#[tokio::test]
async fn test_two_clients_race_for_one_slot() {
    let (base, backend) = spawn_backend().await;
    let alice = LockManager::new(client(&base), memory_session(), RetryPolicy::default());
    let bob = LockManager::new(client(&base), memory_session(), RetryPolicy::default());
    let target = slot(7, "10:00 - 11:00");

    let (a, b) = tokio::join!(alice.acquire(target.clone()), bob.acquire(target.clone()));

    let (winner, loser) = match (&a, &b) {
        (Ok(_), Err(_)) => (&alice, &bob),
        (Err(_), Ok(_)) => (&bob, &alice),
        _ => panic!("expected exactly one winner, got {a:?} and {b:?}"),
    };
    assert!(matches!(
        a.as_ref().err().or(b.as_ref().err()),
        Some(ClientError::SlotUnavailable)
    ));
    assert_eq!(backend.lock_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(backend.locks.lock().unwrap().len(), 1);

    assert!(matches!(winner.state(), LockState::Locked { .. }));
    assert_eq!(loser.state(), LockState::Conflict { slot: target });
    assert!(loser.held().unwrap().is_none());
}

#[tokio::test]
async fn test_transient_lock_failure_is_retried() {
    let (base, backend) = spawn_backend().await;
    backend.failures_left.store(1, Ordering::SeqCst);
    let locks = LockManager::new(client(&base), memory_session(), RetryPolicy::default());

    let token = locks.acquire(slot(7, "11:00 - 12:00")).await.unwrap();

    assert_eq!(token.slot.range, range("11:00 - 12:00"));
    assert_eq!(backend.lock_attempts.load(Ordering::SeqCst), 2);
}

// ── Reservations ──

#[tokio::test]
async fn test_create_reservation_wire_format() {
    let (base, backend) = spawn_backend().await;
    let api = client(&base);

    let reservation = api
        .create_reservation(&new_reservation("10:00 - 11:00", 4))
        .await
        .unwrap();

    assert_eq!(reservation.id, 41);
    assert_eq!(reservation.estado, Some(ReservationStatus::Pendiente));
    assert_eq!(reservation.metodo_pago, Some(PaymentMethod::Efectivo));

    let body = backend.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["instalacionId"], 7);
    assert_eq!(body["fecha"], "2025-06-01");
    assert_eq!(body["horaInicio"], "10:00");
    assert_eq!(body["horaFin"], "11:00");
    assert_eq!(body["metodoPago"], "EFECTIVO");
    assert_eq!(body["numeroAsistentes"], 4);
}

#[tokio::test]
async fn test_create_conflict_carries_backend_message() {
    let (base, _backend) = spawn_backend().await;
    let api = client(&base);

    let err = api
        .create_reservation(&new_reservation("12:00 - 13:00", 2))
        .await
        .unwrap_err();

    match err {
        ClientError::Conflict(message) => {
            assert_eq!(message, "La instalación ya está reservada")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_bad_request_is_not_transient() {
    let (base, _backend) = spawn_backend().await;
    let api = client(&base);

    let err = api
        .create_reservation(&new_reservation("10:00 - 11:00", 0))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Rejected { status, .. } if status.as_u16() == 400));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_update_payment() {
    let (base, _backend) = spawn_backend().await;
    let api = client(&base);

    let updated = api.update_payment(41, &PaymentUpdate::paid()).await.unwrap();

    assert_eq!(updated.id, 41);
    assert_eq!(updated.estado_pago, Some(PaymentStatus::Pagado));
    assert_eq!(updated.estado, Some(ReservationStatus::Confirmada));
}

// ── End to end ──

#[tokio::test]
async fn test_checkout_over_http() {
    let (base, backend) = spawn_backend().await;
    let mut checkout = CheckoutSession::new(
        client(&base),
        memory_session(),
        CheckoutOptions::default(),
        7,
        date(),
    );

    checkout.refresh().await.unwrap();
    checkout.select(range("10:00 - 11:00")).await.unwrap();
    checkout.begin_confirmation().await.unwrap();

    // Our own hold must not make the slot look taken on re-validation.
    let reservation = checkout
        .submit(&ReservationForm {
            payment_method: PaymentMethod::Transferencia,
            attendees: 6,
            comments: Some("team training".to_string()),
        })
        .await
        .unwrap();

    assert_eq!(reservation.id, 41);
    assert_eq!(backend.lock_attempts.load(Ordering::SeqCst), 1);
    assert!(backend.locks.lock().unwrap().is_empty());
    checkout.leave().await;
}
