//! GET /api/stats

use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::stats::StatsReport;

pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatsReport>> {
    let session = state.session()?;
    Ok(Json(session.stats(Utc::now())))
}
