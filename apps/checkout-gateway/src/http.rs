//! Router, header handling, and response shaping. Protocol errors become
//! the wire envelope exactly once, here.

use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::HeaderName},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tracing::error;

use acp_core::ProtocolError;
use acp_idempotency::Flight;
use acp_security::{RequestAuthConfig, verify_bearer, verify_signature};

use crate::AppState;
use crate::handlers;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
pub const REQUEST_ID_HEADER: &str = "request-id";
pub const API_VERSION_HEADER: &str = "api-version";

/// Client-supplied correlation headers, echoed on every response.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub idempotency_key: Option<String>,
    pub request_id: Option<String>,
}

impl RequestMeta {
    fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            idempotency_key: read(IDEMPOTENCY_KEY_HEADER),
            request_id: read(REQUEST_ID_HEADER),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let auth = RequestAuthConfig {
        signature_secret: state.config.request_signature_secret.clone(),
        signature_tolerance_secs: state.config.signature_tolerance_secs,
        bearer_token: state.config.auth_bearer_token.clone(),
    };

    Router::new()
        .route("/checkout_sessions", post(create))
        .route("/checkout_sessions/{id}", get(get_session).post(update))
        .route("/checkout_sessions/{id}/complete", post(complete))
        .route("/checkout_sessions/{id}/cancel", post(cancel))
        .layer(middleware::from_fn(verify_bearer))
        .layer(middleware::from_fn(verify_signature))
        .layer(Extension(auth))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let meta = RequestMeta::from_headers(&headers);
    match handlers::create(&state, &meta, &body).await {
        Ok(flight) => respond_flight(&state, &meta, StatusCode::CREATED, flight),
        Err(err) => respond_error(&state, &meta, &err),
    }
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let meta = RequestMeta::from_headers(&headers);
    match handlers::get(&state, &id).await {
        Ok(session) => respond(&state, &meta, StatusCode::OK, &session),
        Err(err) => respond_error(&state, &meta, &err),
    }
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let meta = RequestMeta::from_headers(&headers);
    match handlers::update(&state, &meta, &id, &body).await {
        Ok(flight) => respond_flight(&state, &meta, StatusCode::OK, flight),
        Err(err) => respond_error(&state, &meta, &err),
    }
}

async fn complete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let meta = RequestMeta::from_headers(&headers);
    match handlers::complete(&state, &meta, &id, &body).await {
        Ok(flight) => respond_flight(&state, &meta, StatusCode::OK, flight),
        Err(err) => respond_error(&state, &meta, &err),
    }
}

async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let meta = RequestMeta::from_headers(&headers);
    match handlers::cancel(&state, &meta, &id).await {
        Ok(flight) => respond_flight(&state, &meta, StatusCode::OK, flight),
        Err(err) => respond_error(&state, &meta, &err),
    }
}

/// A replayed create answers 200 where a fresh one answers 201; every other
/// operation answers 200 either way.
fn respond_flight<T: Serialize>(
    state: &AppState,
    meta: &RequestMeta,
    fresh_status: StatusCode,
    flight: Flight<T>,
) -> Response {
    let status = if flight.reused {
        StatusCode::OK
    } else {
        fresh_status
    };
    respond(state, meta, status, &flight.value)
}

fn respond<T: Serialize>(
    state: &AppState,
    meta: &RequestMeta,
    status: StatusCode,
    value: &T,
) -> Response {
    (status, echo_headers(state, meta), Json(value)).into_response()
}

fn respond_error(state: &AppState, meta: &RequestMeta, err: &ProtocolError) -> Response {
    if matches!(err, ProtocolError::Internal(_) | ProtocolError::Upstream(_)) {
        error!(error = ?err, "request failed");
    }
    (err.status(), echo_headers(state, meta), Json(err.envelope())).into_response()
}

fn echo_headers(state: &AppState, meta: &RequestMeta) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&state.config.api_version) {
        headers.insert(HeaderName::from_static(API_VERSION_HEADER), value);
    }
    if let Some(key) = &meta.idempotency_key {
        if let Ok(value) = HeaderValue::from_str(key) {
            headers.insert(HeaderName::from_static(IDEMPOTENCY_KEY_HEADER), value);
        }
    }
    if let Some(id) = &meta.request_id {
        if let Ok(value) = HeaderValue::from_str(id) {
            headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
    }
    headers
}
