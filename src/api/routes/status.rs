//! GET /api/status

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::StatusResponse;
use crate::api::state::AppState;

/// Sync status; answers even when the backend is not configured
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let response = match &state.session {
        Some(session) => StatusResponse::from_session(session.status(), session.snapshot().len()),
        None => StatusResponse::offline(),
    };
    Json(response)
}
