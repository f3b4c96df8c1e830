use crate::error::RejectionReason;
use crate::modules::metrics::SharedMetrics;
use crate::request::SealedTokenRequest;
use crate::verifier::{bearer_token, SessionVerifier, VerifyError};
use crate::wire::{
    AuthenticatedUser, ErrorResponse, SessionKeyRequest, SessionKeyResponse, SessionTokenResponse,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;

const SESSION_KEY: &str = "session_key";
const SESSION_TOKEN: &str = "session_token";
const ME: &str = "me";

/// Shared state behind every auth endpoint
#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<dyn SessionVerifier>,
    pub metrics: SharedMetrics,
}

impl AuthState {
    /// Record the request and its outcome, then hand the result back.
    fn finish<T>(
        &self,
        endpoint: &str,
        started: Instant,
        result: Result<T, ErrorResponse>,
    ) -> Result<T, ErrorResponse> {
        self.metrics.observe_request(endpoint);
        if let Err(e) = &result {
            self.metrics.observe_error(endpoint, &e.error);
        }
        self.metrics.observe_duration(endpoint, started);
        result
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.error.as_str() {
            "invalid_certificate"
            | "certificate_expired"
            | "invalid_signature"
            | "invalid_session_signature"
            | "invalid_token" => StatusCode::UNAUTHORIZED,
            "no_access" | "scope_mismatch" => StatusCode::FORBIDDEN,
            "invalid_ptb" | "invalid_encryption_key" | "invalid_input" => StatusCode::BAD_REQUEST,
            "chain_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl From<VerifyError> for ErrorResponse {
    fn from(e: VerifyError) -> Self {
        match &e {
            VerifyError::Chain(_) | VerifyError::Internal(_) => error!("Verifier failure: {}", e),
            _ => warn!("Request rejected: {}", e),
        }
        ErrorResponse {
            error: e.as_str().to_string(),
            message: e.to_string(),
        }
    }
}

impl From<JsonRejection> for ErrorResponse {
    fn from(rejection: JsonRejection) -> Self {
        warn!("Malformed request body: {}", rejection.body_text());
        ErrorResponse {
            error: RejectionReason::InvalidInput.as_str().to_string(),
            message: rejection.body_text(),
        }
    }
}

/// Session key registration
/// POST /auth/session-key
pub async fn session_key_handler(
    State(state): State<AuthState>,
    payload: Result<Json<SessionKeyRequest>, JsonRejection>,
) -> Result<Json<SessionKeyResponse>, ErrorResponse> {
    let started = Instant::now();
    let result = register_session_key(&state, payload).await;
    state.finish(SESSION_KEY, started, result.map(Json))
}

async fn register_session_key(
    state: &AuthState,
    payload: Result<Json<SessionKeyRequest>, JsonRejection>,
) -> Result<SessionKeyResponse, ErrorResponse> {
    let Json(payload) = payload?;
    info!("Received session key for {}", payload.address);
    Ok(state.verifier.verify_session_key(payload).await?)
}

/// Sealed token request
/// POST /auth/session_token
pub async fn session_token_handler(
    State(state): State<AuthState>,
    payload: Result<Json<SealedTokenRequest>, JsonRejection>,
) -> Result<Json<SessionTokenResponse>, ErrorResponse> {
    let started = Instant::now();
    let result = issue_session_token(&state, payload).await;
    state.finish(SESSION_TOKEN, started, result.map(Json))
}

async fn issue_session_token(
    state: &AuthState,
    payload: Result<Json<SealedTokenRequest>, JsonRejection>,
) -> Result<SessionTokenResponse, ErrorResponse> {
    let Json(payload) = payload?;
    info!("Received token request for {}", payload.certificate.user);
    Ok(state.verifier.issue_session_token(&payload).await?)
}

/// Token introspection
/// GET /auth/me
pub async fn me_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Json<AuthenticatedUser>, ErrorResponse> {
    let started = Instant::now();
    let result = authenticate(&state, &headers);
    state.finish(ME, started, result.map(Json))
}

fn authenticate(state: &AuthState, headers: &HeaderMap) -> Result<AuthenticatedUser, ErrorResponse> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ErrorResponse {
            error: "invalid_token".to_string(),
            message: "Missing Authorization header".to_string(),
        })?;
    let token = bearer_token(header)?;
    Ok(state.verifier.authenticate(token)?)
}

pub async fn health_handler() -> &'static str {
    "ok"
}

/// Prometheus scrape endpoint
/// GET /metrics
pub async fn metrics_handler(State(state): State<AuthState>) -> (StatusCode, String) {
    match state.metrics.encode_text() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub fn router(verifier: Arc<dyn SessionVerifier>, metrics: SharedMetrics) -> Router {
    Router::new()
        .route("/auth/session-key", post(session_key_handler))
        .route("/auth/session_token", post(session_token_handler))
        .route("/auth/me", get(me_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(AuthState { verifier, metrics })
}
