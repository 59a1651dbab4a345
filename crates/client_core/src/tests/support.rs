//! In-process stand-in for the remote API, shared by the client tests.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::domain::{UserId, UserSummary};
use storage::{MemoryTokenStore, StoreError, StoredSession, TokenStore};
use tokio::{
    net::TcpListener,
    sync::{watch, Mutex},
};

use crate::{
    session::SessionController,
    transport::Transport,
    types::{SessionPhase, SessionSnapshot},
};

pub(crate) const ALICE_TOKEN: &str = "token-alice";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProfileReply {
    Present,
    Missing,
    Failing,
}

#[derive(Debug, Clone)]
pub(crate) struct Behaviour {
    /// Bearer tokens the protected routes accept.
    pub accepted_tokens: Vec<String>,
    /// Token handed out by login and register.
    pub issued_token: String,
    pub user_name: String,
    pub profile: ProfileReply,
    pub login_error: Option<(u16, Value)>,
    pub register_error: Option<(u16, Value)>,
    /// Applied to `/auth/me`, `/auth/logout`, `/profiles/me`, `/periods/`
    /// and the prediction routes.
    pub delay: Duration,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            accepted_tokens: vec![ALICE_TOKEN.to_string()],
            issued_token: ALICE_TOKEN.to_string(),
            user_name: "Alice".to_string(),
            profile: ProfileReply::Present,
            login_error: None,
            register_error: None,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub login: AtomicUsize,
    pub register: AtomicUsize,
    pub me: AtomicUsize,
    pub profile_get: AtomicUsize,
    pub profile_write: AtomicUsize,
    pub logout: AtomicUsize,
    pub periods: AtomicUsize,
    pub predictions: AtomicUsize,
}

pub(crate) fn hits(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

#[derive(Clone)]
struct ServiceState {
    behaviour: Arc<Mutex<Behaviour>>,
    counters: Arc<Counters>,
    seen_bearers: Arc<Mutex<Vec<Option<String>>>>,
}

pub(crate) struct FakeService {
    pub base_url: String,
    pub behaviour: Arc<Mutex<Behaviour>>,
    pub counters: Arc<Counters>,
    /// Bearer token (if any) of every request, in arrival order.
    pub seen_bearers: Arc<Mutex<Vec<Option<String>>>>,
}

pub(crate) fn alice() -> UserSummary {
    UserSummary {
        id: Some(UserId(1)),
        name: "Alice".into(),
        email: Some("alice@example.com".into()),
        created_at: None,
    }
}

fn user_json(name: &str) -> Value {
    json!({
        "id": 1,
        "name": name,
        "email": "alice@example.com",
        "created_at": "2024-05-01T09:00:00Z"
    })
}

pub(crate) fn profile_json() -> Value {
    json!({
        "id": 7,
        "user_id": 1,
        "height_cm": 165,
        "weight_kg": 58.5,
        "cycle_length": 28,
        "luteal_length": 14,
        "menses_length": 5,
        "unusual_bleeding": false,
        "number_of_peak": 2,
        "period_regularity": "regular",
        "period_description": "usual",
        "medical_conditions": null,
        "last_period_start": "2024-05-01",
        "last_period_end": "2024-05-05",
        "created_at": "2024-05-06T10:00:00Z",
        "updated_at": "2024-05-06T10:00:00Z"
    })
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Could not validate credentials" })),
    )
        .into_response()
}

fn reply(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned)
}

impl ServiceState {
    /// Records the bearer, waits out the configured delay, and reports
    /// whether the caller is authorized.
    async fn admit(&self, headers: &HeaderMap, delayed: bool) -> (bool, Behaviour) {
        let token = bearer(headers);
        self.seen_bearers.lock().await.push(token.clone());
        let behaviour = self.behaviour.lock().await.clone();
        if delayed && !behaviour.delay.is_zero() {
            tokio::time::sleep(behaviour.delay).await;
        }
        let authorized = token.is_some_and(|token| behaviour.accepted_tokens.contains(&token));
        (authorized, behaviour)
    }
}

async fn handle_login(State(state): State<ServiceState>, headers: HeaderMap) -> Response {
    state.counters.login.fetch_add(1, Ordering::SeqCst);
    let (_, behaviour) = state.admit(&headers, false).await;
    if let Some((status, body)) = behaviour.login_error {
        return reply(status, body);
    }
    Json(json!({
        "access_token": behaviour.issued_token,
        "token_type": "bearer",
        "user": user_json(&behaviour.user_name)
    }))
    .into_response()
}

async fn handle_register(State(state): State<ServiceState>, headers: HeaderMap) -> Response {
    state.counters.register.fetch_add(1, Ordering::SeqCst);
    let (_, behaviour) = state.admit(&headers, false).await;
    if let Some((status, body)) = behaviour.register_error {
        return reply(status, body);
    }
    Json(json!({
        "access_token": behaviour.issued_token,
        "token_type": "bearer",
        "user": user_json(&behaviour.user_name)
    }))
    .into_response()
}

async fn handle_me(State(state): State<ServiceState>, headers: HeaderMap) -> Response {
    state.counters.me.fetch_add(1, Ordering::SeqCst);
    match state.admit(&headers, true).await {
        (true, behaviour) => Json(user_json(&behaviour.user_name)).into_response(),
        (false, _) => unauthorized(),
    }
}

async fn handle_logout(State(state): State<ServiceState>, headers: HeaderMap) -> Response {
    state.counters.logout.fetch_add(1, Ordering::SeqCst);
    match state.admit(&headers, true).await {
        (true, _) => Json(json!({ "message": "Successfully logged out" })).into_response(),
        (false, _) => unauthorized(),
    }
}

async fn handle_get_profile(State(state): State<ServiceState>, headers: HeaderMap) -> Response {
    state.counters.profile_get.fetch_add(1, Ordering::SeqCst);
    let (authorized, behaviour) = state.admit(&headers, true).await;
    if !authorized {
        return unauthorized();
    }
    match behaviour.profile {
        ProfileReply::Present => Json(profile_json()).into_response(),
        ProfileReply::Missing => reply(404, json!({ "detail": "Profile not found" })),
        ProfileReply::Failing => reply(500, json!({})),
    }
}

async fn handle_write_profile(State(state): State<ServiceState>, headers: HeaderMap) -> Response {
    state.counters.profile_write.fetch_add(1, Ordering::SeqCst);
    match state.admit(&headers, false).await {
        (true, _) => Json(profile_json()).into_response(),
        (false, _) => unauthorized(),
    }
}

async fn handle_periods(State(state): State<ServiceState>, headers: HeaderMap) -> Response {
    state.counters.periods.fetch_add(1, Ordering::SeqCst);
    match state.admit(&headers, true).await {
        (true, _) => Json(json!([])).into_response(),
        (false, _) => unauthorized(),
    }
}

pub(crate) fn prediction_json() -> Value {
    json!({
        "day_of_cycle": 12,
        "cycle_phase": "follicular",
        "predicted_energy_level": "high",
        "predicted_mood": "calm",
        "predicted_symptoms": null,
        "confidence_score": 0.74,
        "next_period_in_days": 16
    })
}

async fn handle_current_prediction(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Response {
    state.counters.predictions.fetch_add(1, Ordering::SeqCst);
    match state.admit(&headers, true).await {
        (true, _) => Json(prediction_json()).into_response(),
        (false, _) => unauthorized(),
    }
}

async fn handle_seven_day_plan(State(state): State<ServiceState>, headers: HeaderMap) -> Response {
    state.counters.predictions.fetch_add(1, Ordering::SeqCst);
    match state.admit(&headers, true).await {
        (true, _) => Json(json!({
            "plan": [{
                "date": "2024-06-10",
                "predicted_energy_level": "medium",
                "predicted_mood": "focused",
                "predicted_symptoms": ["bloating"],
                "recommendation": "Schedule demanding work in the morning.",
                "score": 7
            }]
        }))
        .into_response(),
        (false, _) => unauthorized(),
    }
}

async fn handle_insights(State(state): State<ServiceState>, headers: HeaderMap) -> Response {
    state.counters.predictions.fetch_add(1, Ordering::SeqCst);
    match state.admit(&headers, true).await {
        (true, _) => Json(json!({
            "key_insights": "Energy peaks mid-cycle.",
            "symptom_patterns": "Cramps cluster on days 1-2.",
            "mood_correlations": "Low energy follows short sleep.",
            "health_recommendations": "Keep logging daily."
        }))
        .into_response(),
        (false, _) => unauthorized(),
    }
}

pub(crate) async fn spawn_fake_service(behaviour: Behaviour) -> FakeService {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake service");
    let addr = listener.local_addr().expect("fake service addr");

    let state = ServiceState {
        behaviour: Arc::new(Mutex::new(behaviour)),
        counters: Arc::new(Counters::default()),
        seen_bearers: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/auth/login", post(handle_login))
        .route("/auth/register", post(handle_register))
        .route("/auth/me", get(handle_me))
        .route("/auth/logout", post(handle_logout))
        .route(
            "/profiles/me",
            get(handle_get_profile)
                .post(handle_write_profile)
                .put(handle_write_profile),
        )
        .route("/periods/", get(handle_periods))
        .route("/predictions/current", get(handle_current_prediction))
        .route("/predictions/7-day-plan", get(handle_seven_day_plan))
        .route("/insights/", get(handle_insights))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    FakeService {
        base_url: format!("http://{addr}"),
        behaviour: state.behaviour,
        counters: state.counters,
        seen_bearers: state.seen_bearers,
    }
}

/// A base URL nothing listens on.
pub(crate) async fn unreachable_base_url() -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind probe");
    let addr = listener.local_addr().expect("probe addr");
    drop(listener);
    format!("http://{addr}")
}

pub(crate) fn store_with(token: &str) -> Arc<MemoryTokenStore> {
    Arc::new(MemoryTokenStore::with_session(StoredSession::new(
        token,
        alice(),
    )))
}

pub(crate) fn transport_for(base_url: &str, store: Arc<dyn TokenStore>) -> Arc<Transport> {
    Transport::with_timeout(base_url, store, Duration::from_secs(5)).expect("transport")
}

pub(crate) async fn wait_for_phase(
    updates: &mut watch::Receiver<SessionSnapshot>,
    phase: SessionPhase,
) -> SessionSnapshot {
    tokio::time::timeout(
        Duration::from_secs(5),
        updates.wait_for(|snapshot| snapshot.phase == phase),
    )
    .await
    .expect("phase reached in time")
    .expect("controller alive")
    .clone()
}

pub(crate) async fn signed_in_controller(service: &FakeService) -> Arc<SessionController> {
    let transport = transport_for(&service.base_url, store_with(ALICE_TOKEN));
    let controller = SessionController::new(transport);
    let snapshot = controller.initialize().await;
    assert_eq!(snapshot.phase, SessionPhase::Authenticated);
    controller
}

/// Store whose writes always fail.
#[derive(Default)]
pub(crate) struct ReadOnlyStore;

#[async_trait]
impl TokenStore for ReadOnlyStore {
    async fn save(&self, _session: &StoredSession) -> Result<(), StoreError> {
        let error = serde_json::from_str::<Value>("{").expect_err("truncated json");
        Err(StoreError::Codec(error))
    }

    async fn read(&self) -> Option<StoredSession> {
        None
    }

    async fn clear(&self) -> bool {
        false
    }
}

/// Memory store whose first read stalls, so a login can land while a
/// credential check is still reading.
pub(crate) struct SlowFirstReadStore {
    inner: MemoryTokenStore,
    stalled: AtomicBool,
    stall: Duration,
}

impl SlowFirstReadStore {
    pub(crate) fn new(token: &str, stall: Duration) -> Self {
        Self {
            inner: MemoryTokenStore::with_session(StoredSession::new(token, alice())),
            stalled: AtomicBool::new(false),
            stall,
        }
    }
}

#[async_trait]
impl TokenStore for SlowFirstReadStore {
    async fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        self.inner.save(session).await
    }

    async fn read(&self) -> Option<StoredSession> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(self.stall).await;
        }
        self.inner.read().await
    }

    async fn clear(&self) -> bool {
        self.inner.clear().await
    }
}
