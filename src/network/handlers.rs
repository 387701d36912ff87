//! HTTP route handlers
//!
//! Translate requests into engine calls and engine results into status codes.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::put;
use axum::Router;

use crate::engine::Engine;
use crate::error::LedgerError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,

    /// Request bodies above this size are rejected
    pub max_value_size: usize,
}

/// Build the key-value router
pub fn build_router(engine: Arc<Engine>) -> Router {
    let state = AppState {
        max_value_size: engine.config().max_value_size,
        engine,
    };

    Router::new()
        .route(
            "/v1/key/{key}",
            put(handle_put).get(handle_get).delete(handle_delete),
        )
        .with_state(state)
}

/// Handle PUT /v1/key/{key}
async fn handle_put(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Body,
) -> Result<StatusCode, ApiError> {
    let bytes = to_bytes(body, state.max_value_size)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to read body: {}", e)))?;
    let value = String::from_utf8(bytes.to_vec())
        .map_err(|e| ApiError::Internal(format!("body is not valid UTF-8: {}", e)))?;

    // May block on a full append queue
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || engine.put(&key, &value))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(StatusCode::CREATED)
}

/// Handle GET /v1/key/{key}
async fn handle_get(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<String, ApiError> {
    Ok(state.engine.get(&key)?)
}

/// Handle DELETE /v1/key/{key}
async fn handle_delete(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || engine.delete(&key))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(StatusCode::OK)
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Errors surfaced to HTTP clients
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    Internal(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::KeyNotFound => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "no such key").into_response(),
            ApiError::Internal(message) => {
                tracing::warn!(error = %message, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            }
        }
    }
}
