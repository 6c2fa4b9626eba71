//! Data Transfer Objects
//!
//! Response types for the API endpoints that are not domain types already.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::SessionStatus;

/// Sync status response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    /// Backend credentials are present
    pub configured: bool,
    /// The last fetch reached the backend
    pub connected: bool,
    /// The change feed is joined
    pub feed_connected: bool,
    pub bootstrapped: bool,
    pub last_fetch_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Leads in the current snapshot
    pub lead_count: usize,
}

impl StatusResponse {
    pub fn from_session(status: SessionStatus, lead_count: usize) -> Self {
        Self {
            configured: true,
            connected: status.connected,
            feed_connected: status.feed_connected,
            bootstrapped: status.bootstrapped,
            last_fetch_at: status.last_fetch_at,
            last_error: status.last_error,
            lead_count,
        }
    }

    /// Status reported when no session is running
    pub fn offline() -> Self {
        Self {
            configured: false,
            connected: false,
            feed_connected: false,
            bootstrapped: false,
            last_fetch_at: None,
            last_error: None,
            lead_count: 0,
        }
    }
}

/// Full health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy, degraded, unhealthy
    pub status: String,
    /// Backend status: ok, error, unconfigured
    pub backend: String,
    /// Change feed status: ok, disconnected, disabled
    pub feed: String,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
