//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::Value;

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/cache/:key", get(cached_document))
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let engine = &state.engine;
    Json(StatusResponse {
        endpoint: engine.endpoint().to_string(),
        state: engine.state(),
        running: engine.is_running(),
        connected: engine.is_connected(),
        stats: engine.stats(),
        keys: engine.cache().keys(),
    })
}

/// The last document cached under `key`.
///
/// Missing keys are a 404 once the engine is connected and a 503 before.
async fn cached_document(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let engine = &state.engine;
    if let Some(document) = engine.cache().load::<Value>(&key) {
        return Ok(Json(document));
    }

    if engine.is_connected() {
        Err(AppError::NotFound {
            message: format!("nothing cached under {key:?}"),
        })
    } else {
        Err(AppError::Unavailable {
            message: format!("not connected to {}", engine.endpoint()),
        })
    }
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound { message: String },
    Unavailable { message: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound { message } => (StatusCode::NOT_FOUND, message),
            AppError::Unavailable { message } => (StatusCode::SERVICE_UNAVAILABLE, message),
        };

        tracing::debug!(%status, %message, "request failed");

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}
