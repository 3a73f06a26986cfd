//! Shared server state, health check and HTTP error mapping

use crate::board::{BoardError, BoardManager};
use crate::events::EventBus;
use crate::AuthConfig;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

/// Shared server state
pub struct ServerState {
    pub board: Arc<BoardManager>,
    pub event_bus: Arc<EventBus>,
    /// Auth config; `None` runs the API in open mode
    pub auth_config: Option<AuthConfig>,
}

pub type BoardState = Arc<ServerState>;

// ============================================================================
// Health check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
}

/// 200 `"ok"` when the node store answers, 503 `"unhealthy"` otherwise.
pub async fn health(State(state): State<BoardState>) -> (StatusCode, Json<HealthResponse>) {
    let store_ok = state.board.store().health_check().await.unwrap_or(false);

    let (http_status, status, store) = if store_ok {
        (StatusCode::OK, "ok", "connected")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", "disconnected")
    };

    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store: store.to_string(),
        }),
    )
}

// ============================================================================
// Errors
// ============================================================================

/// Error returned by every handler, rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Internal(e) => {
                tracing::error!("request failed: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<BoardError> for AppError {
    fn from(err: BoardError) -> Self {
        let message = err.to_string();
        match err {
            BoardError::NotFound { .. } => AppError::NotFound(message),
            BoardError::SizeInvalid(_)
            | BoardError::SameTarget(_)
            | BoardError::AnchorImmutable(_)
            | BoardError::ProtectedNode(_)
            | BoardError::OwnerMismatch { .. }
            | BoardError::InvalidInput(_) => AppError::BadRequest(message),
            BoardError::NameDuplicate { .. } | BoardError::RequestConflict(_) => {
                AppError::Conflict(message)
            }
            BoardError::ServerInvariantViolation(_) => {
                AppError::Internal(anyhow::anyhow!(message))
            }
            BoardError::Store(e) => AppError::Internal(e),
        }
    }
}
