//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (ready to serve traffic)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
///
/// Kubernetes liveness probe.
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Ready once the session has completed its first fetch. A server without
/// a session has nothing to wait for.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    match &state.session {
        Some(session) if !session.status().bootstrapped => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    }
}

/// GET /health
///
/// Full health status with component details.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (backend, feed) = match &state.session {
        Some(session) => {
            let status = session.status();
            let backend = if status.connected { "ok" } else { "error" };
            let feed = match (session.has_feed(), status.feed_connected) {
                (false, _) => "disabled",
                (true, true) => "ok",
                (true, false) => "disconnected",
            };
            (backend, feed)
        }
        None if !state.is_configured() => ("unconfigured", "disabled"),
        None => ("error", "disabled"),
    };

    let overall_status = match (backend, feed) {
        ("ok", "ok") | ("ok", "disabled") => "healthy",
        ("ok", _) => "degraded",
        _ => "unhealthy",
    };

    Json(HealthResponse {
        status: overall_status.to_string(),
        backend: backend.to_string(),
        feed: feed.to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
