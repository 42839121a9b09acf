//! HTTP handlers for the inbound turn interface

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::context::models::{ClarificationState, ConversationState, Role};
use crate::error::ContextError;
use crate::metrics::METRICS;
use crate::session::{IngestReport, SessionManager, TurnReport};

/// Error codes returned in [`ApiError`]
pub mod error_codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
    pub const UPSTREAM_ERROR: &str = "UPSTREAM_ERROR";
    pub const PERSISTENCE_ERROR: &str = "PERSISTENCE_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}

/// API error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn map_error(err: ContextError) -> (StatusCode, Json<ApiError>) {
    let (status, code) = match &err {
        ContextError::Validation(_) => (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR),
        ContextError::SessionNotFound(_) => (StatusCode::NOT_FOUND, error_codes::SESSION_NOT_FOUND),
        ContextError::CapabilityUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, error_codes::UPSTREAM_ERROR)
        }
        ContextError::Persistence(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, error_codes::PERSISTENCE_ERROR)
        }
        ContextError::Configuration(_) => {
            error!("Request failed: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR)
        }
    };
    (status, Json(ApiError::new(code, err.to_string())))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestRequest {
    pub role: Role,
    pub content: String,
}

/// Session snapshot with the derived workflow state
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionView {
    pub clarification_state: ClarificationState,
    #[serde(flatten)]
    pub state: ConversationState,
}

/// Create a session
///
/// POST /api/v1/sessions
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), (StatusCode, Json<ApiError>)> {
    let session_id = state.manager.create_session().await.map_err(map_error)?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id })))
}

/// Submit a user turn
///
/// POST /api/v1/sessions/:id/messages
pub async fn submit_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<TurnReport> {
    info!("Turn request for session {}", session_id);
    state
        .manager
        .submit(&session_id, &request.content)
        .await
        .map(Json)
        .map_err(map_error)
}

/// Append earlier history without generating a reply
///
/// POST /api/v1/sessions/:id/history
pub async fn ingest_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<IngestReport> {
    state
        .manager
        .ingest(&session_id, request.role, &request.content)
        .await
        .map(Json)
        .map_err(map_error)
}

/// GET /api/v1/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionView> {
    let snapshot = state.manager.snapshot(&session_id).await.map_err(map_error)?;
    Ok(Json(SessionView {
        clarification_state: snapshot.clarification_state(),
        state: snapshot,
    }))
}

/// Retry persistence of the in-memory state
///
/// POST /api/v1/sessions/:id/flush
pub async fn flush_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    state.manager.flush(&session_id).await.map_err(map_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/sessions/:id
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    state.manager.end_session(&session_id).await.map_err(map_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Prometheus text exposition
///
/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_prometheus(),
    )
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
