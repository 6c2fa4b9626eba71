//! Lead Routes
//!
//! - GET /api/leads - Live read from the backend
//! - GET /api/snapshot - The session's current snapshot

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::leads::Lead;
use crate::store::Snapshot;

/// GET /api/leads
///
/// Rows exactly as the backend returned them, newest first.
pub async fn list_leads(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Lead>>> {
    let leads = state.source()?.fetch_all().await?;
    tracing::debug!(count = leads.len(), "Served live lead list");
    Ok(Json(leads))
}

/// GET /api/snapshot
pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> ApiResult<Json<Snapshot>> {
    Ok(Json(state.session()?.snapshot()))
}
