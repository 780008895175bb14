//! REST adapter (design §4.I): JSON bodies, status codes per the
//! Error->HTTP table, request id echoed via `x-request-id`. Router shape
//! grounded in the teacher's `api/handlers.rs` (`axum::Router` + `AppState`
//! extractor), generalized from a single-conversation API to the
//! session/context/action surface.

use super::middleware::{authenticate_and_throttle, RateLimiterRegistry};
use crate::actions::Action;
use crate::auth::{AuthGate, Credentials, Principal, TransportMetadata};
use crate::error::{ErrorEnvelope, ErrorKind};
use crate::executor::{ActionExecutor, BatchOptions};
use crate::pages::{ContextId, PageManager};
use crate::session::{NewSession, SessionId, SessionStore};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct RestState {
    pub sessions: Arc<dyn SessionStore>,
    pub pages: Arc<PageManager>,
    pub executor: Arc<ActionExecutor>,
    pub auth: Arc<dyn AuthGate>,
    pub limiter: Arc<RateLimiterRegistry>,
}

pub fn router(state: RestState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(health))
        .route("/health/ready", get(health))
        .route("/api/v1/sessions", post(create_session))
        .route("/api/v1/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/v1/sessions/:id/refresh", post(refresh_session))
        .route("/api/v1/contexts", post(create_context))
        .route("/api/v1/contexts/:id/execute", post(execute_in_context))
        .route("/api/v1/contexts/:id/execute-batch", post(execute_batch))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn err_response(err: ErrorKind, req_id: String) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let envelope = ErrorEnvelope::from_kind(&err, req_id.clone());
    let mut response = (status, Json(serde_json::json!({ "error": envelope }))).into_response();
    if let Ok(value) = req_id.parse() {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

async fn authenticate_rest(
    state: &RestState,
    headers: &HeaderMap,
    path: &str,
) -> Result<Option<Principal>, ErrorKind> {
    let credentials = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| Credentials::Bearer(token.to_string()))
        .or_else(|| {
            headers
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .map(|key| Credentials::ApiKey(key.to_string()))
        });
    let meta = TransportMetadata {
        remote_addr: None,
        user_agent: headers.get("user-agent").and_then(|v| v.to_str().ok()).map(str::to_string),
        protocol: "rest",
    };
    authenticate_and_throttle(state.auth.as_ref(), &state.limiter, path, credentials, meta).await
}

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Serialize)]
struct SessionCreatedResponse {
    session_id: SessionId,
}

async fn create_session(
    State(state): State<RestState>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionRequest>,
) -> Response {
    let req_id = request_id(&headers);
    if let Err(err) = authenticate_rest(&state, &headers, "/api/v1/sessions").await {
        return err_response(err, req_id);
    }
    match state
        .sessions
        .create(NewSession {
            user_id: body.user_id,
            username: body.username,
            roles: body.roles,
            metadata: serde_json::Value::Null,
            ttl: std::time::Duration::from_secs(3600),
        })
        .await
    {
        Ok(session_id) => Json(SessionCreatedResponse { session_id }).into_response(),
        Err(err) => err_response(err, req_id),
    }
}

async fn get_session(State(state): State<RestState>, headers: HeaderMap, Path(id): Path<SessionId>) -> Response {
    let req_id = request_id(&headers);
    if let Err(err) = authenticate_rest(&state, &headers, "/api/v1/sessions/:id").await {
        return err_response(err, req_id);
    }
    match state.sessions.get(id).await {
        Ok(Some(session)) => Json(session).into_response(),
        Ok(None) => err_response(ErrorKind::NotFound(format!("session {id}")), req_id),
        Err(err) => err_response(err, req_id),
    }
}

async fn delete_session(State(state): State<RestState>, headers: HeaderMap, Path(id): Path<SessionId>) -> Response {
    let req_id = request_id(&headers);
    if let Err(err) = authenticate_rest(&state, &headers, "/api/v1/sessions/:id").await {
        return err_response(err, req_id);
    }
    if let Err(err) = state.pages.close_pages_for_session(id).await {
        return err_response(err, req_id);
    }
    match state.sessions.delete(id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err_response(err, req_id),
    }
}

async fn refresh_session(State(state): State<RestState>, headers: HeaderMap, Path(id): Path<SessionId>) -> Response {
    let req_id = request_id(&headers);
    if let Err(err) = authenticate_rest(&state, &headers, "/api/v1/sessions/:id/refresh").await {
        return err_response(err, req_id);
    }
    match state.sessions.touch(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err_response(err, req_id),
    }
}

#[derive(Deserialize)]
pub struct CreateContextRequest {
    pub session_id: SessionId,
}

#[derive(Serialize)]
struct ContextCreatedResponse {
    context_id: ContextId,
}

async fn create_context(
    State(state): State<RestState>,
    headers: HeaderMap,
    Json(body): Json<CreateContextRequest>,
) -> Response {
    let req_id = request_id(&headers);
    let principal = match authenticate_rest(&state, &headers, "/api/v1/contexts").await {
        Ok(p) => p,
        Err(err) => return err_response(err, req_id),
    };
    if let Some(principal) = &principal {
        if !principal.owns_session(body.session_id) {
            return err_response(ErrorKind::Forbidden("session".into()), req_id);
        }
    }
    let context_id = state.pages.create_context(body.session_id).await;
    Json(ContextCreatedResponse { context_id }).into_response()
}

async fn execute_in_context(
    State(state): State<RestState>,
    headers: HeaderMap,
    Path(_context_id): Path<ContextId>,
    Json(action): Json<Action>,
) -> Response {
    let req_id = request_id(&headers);
    let principal = match authenticate_rest(&state, &headers, "/api/v1/contexts/:id/execute").await {
        Ok(Some(p)) => p,
        Ok(None) => return err_response(ErrorKind::Unauthenticated, req_id),
        Err(err) => return err_response(err, req_id),
    };
    let result = state.executor.execute(action, &principal).await;
    Json(result).into_response()
}

/// Batch execution entry point, `{stopOnError, parallel, maxConcurrency}`.
#[derive(Deserialize)]
pub struct BatchRequest {
    pub actions: Vec<Action>,
    #[serde(default)]
    pub options: BatchOptionsDto,
}

#[derive(Deserialize, Default)]
pub struct BatchOptionsDto {
    #[serde(default)]
    pub stop_on_error: bool,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
}

fn default_concurrency() -> usize {
    4
}

impl From<BatchOptionsDto> for BatchOptions {
    fn from(dto: BatchOptionsDto) -> Self {
        Self {
            stop_on_error: dto.stop_on_error,
            parallel: dto.parallel,
            max_concurrency: dto.max_concurrency,
        }
    }
}

pub async fn execute_batch(
    State(state): State<RestState>,
    headers: HeaderMap,
    Json(body): Json<BatchRequest>,
) -> Response {
    let req_id = request_id(&headers);
    let principal = match authenticate_rest(&state, &headers, "/api/v1/contexts/:id/execute-batch").await {
        Ok(Some(p)) => p,
        Ok(None) => return err_response(ErrorKind::Unauthenticated, req_id),
        Err(err) => return err_response(err, req_id),
    };
    let results = state
        .executor
        .execute_batch(body.actions, &principal, body.options.into())
        .await;
    Json(results).into_response()
}
