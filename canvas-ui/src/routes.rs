//! HTTP route handlers for the session API.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use canvas::core::types::{SessionKey, SharedState};
use canvas::io::broadcast::SnapshotEvent;
use canvas::session::{TurnRequest, TurnResponse};
use tracing::{error, info, warn};

use crate::state::{AppState, SharedSession};

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/sessions/{key}", get(get_session).delete(close_session))
        .route("/sessions/{key}/turn", post(run_turn))
        .route("/sessions/{key}/reset", post(reset_session))
}

async fn health() -> &'static str {
    "ok"
}

/// GET /api/sessions/{key} - current session document.
pub(crate) async fn get_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<SharedState>, StatusCode> {
    let session = lookup(&state, &key)?;
    let session = session.lock().await;
    Ok(Json(session.store.get().clone()))
}

/// DELETE /api/sessions/{key} - end the live session; its persisted document stays.
pub(crate) async fn close_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> StatusCode {
    let Ok(key) = SessionKey::new(&key) else {
        return StatusCode::BAD_REQUEST;
    };
    match state.close_session(&key) {
        Ok(true) => {
            info!(session = %key, "session closed");
            StatusCode::NO_CONTENT
        }
        Ok(false) => StatusCode::NOT_FOUND,
        Err(err) => {
            error!(session = %key, "close session failed: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// POST /api/sessions/{key}/turn - reconcile the handed-over state and apply calls.
pub(crate) async fn run_turn(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, StatusCode> {
    let mut session = lookup(&state, &key)?.lock_owned().await;
    let engine = Arc::clone(&state.engine);
    let result = tokio::task::spawn_blocking(move || engine.run_turn(&mut session, &request))
        .await
        .map_err(|err| {
            error!(session = %key, "turn task failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    result.map(Json).map_err(|err| {
        error!(session = %key, "turn failed: {err:#}");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// POST /api/sessions/{key}/reset - replace the document with the initial template.
pub(crate) async fn reset_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<SnapshotEvent>, StatusCode> {
    let mut session = lookup(&state, &key)?.lock_owned().await;
    let engine = Arc::clone(&state.engine);
    let result = tokio::task::spawn_blocking(move || engine.reset_session(&mut session))
        .await
        .map_err(|err| {
            error!(session = %key, "reset task failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    result.map(Json).map_err(|err| {
        error!(session = %key, "reset failed: {err:#}");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn lookup(state: &AppState, raw: &str) -> Result<SharedSession, StatusCode> {
    let key = SessionKey::new(raw).map_err(|err| {
        warn!("{err}");
        StatusCode::BAD_REQUEST
    })?;
    state.session(&key).map_err(|err| {
        error!(session = %key, "open session failed: {err:#}");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
