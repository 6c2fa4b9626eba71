//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use super::error::{ApiError, ApiResult};
use crate::config::Config;
use crate::realtime::{ChangeFeed, RealtimeSubscriber};
use crate::remote::{LeadSource, RestClient};
use crate::session::LeadSession;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Direct backend access for live reads
    pub source: Option<Arc<dyn LeadSource>>,
    /// The server's sync session
    pub session: Option<Arc<LeadSession>>,
    /// Why there is no backend, when there is none
    unconfigured: Option<String>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Build clients and open the sync session; must run inside a Tokio runtime
    ///
    /// Missing backend settings are not fatal: the server still starts and
    /// backend-dependent routes report the problem.
    pub fn from_config(config: &Config) -> Self {
        let source = match RestClient::from_config(config) {
            Ok(client) => Arc::new(client) as Arc<dyn LeadSource>,
            Err(e) => {
                tracing::warn!(error = %e, "Backend not configured, lead routes disabled");
                return Self::unconfigured(e.to_string());
            }
        };

        let feed = if config.sync.realtime_enabled {
            match RealtimeSubscriber::from_config(config) {
                Ok(subscriber) => Some(Arc::new(subscriber) as Arc<dyn ChangeFeed>),
                Err(e) => {
                    tracing::warn!(error = %e, "Change feed unavailable, polling only");
                    None
                }
            }
        } else {
            None
        };

        let session = LeadSession::open(
            Arc::clone(&source),
            feed,
            &config.sync,
            config.stats.clone(),
        );
        Self::new(source, Some(Arc::new(session)))
    }

    pub fn new(source: Arc<dyn LeadSource>, session: Option<Arc<LeadSession>>) -> Self {
        Self {
            source: Some(source),
            session,
            unconfigured: None,
            start_time: Instant::now(),
        }
    }

    /// State for a server without backend credentials
    pub fn unconfigured(reason: impl Into<String>) -> Self {
        Self {
            source: None,
            session: None,
            unconfigured: Some(reason.into()),
            start_time: Instant::now(),
        }
    }

    pub fn source(&self) -> ApiResult<&Arc<dyn LeadSource>> {
        self.source.as_ref().ok_or_else(|| self.configuration_error())
    }

    pub fn session(&self) -> ApiResult<&Arc<LeadSession>> {
        self.session.as_ref().ok_or_else(|| self.configuration_error())
    }

    pub fn is_configured(&self) -> bool {
        self.unconfigured.is_none()
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn configuration_error(&self) -> ApiError {
        ApiError::Configuration(
            self.unconfigured
                .clone()
                .unwrap_or_else(|| "No lead session running".to_string()),
        )
    }
}
