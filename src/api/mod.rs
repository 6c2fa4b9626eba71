//! Leadwatch REST API
//!
//! HTTP API layer, built with Axum.
//!
//! # Endpoints
//!
//! ## Leads
//! - `GET /api/leads` - Live read from the backend
//! - `GET /api/snapshot` - Current session snapshot
//! - `GET /api/stats` - Counters, status breakdown, daily histogram
//! - `GET /api/status` - Sync connectivity
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws` - Real-time streaming connection
//!
//! # Example
//!
//! ```rust,no_run
//! use leadwatch::api::{serve, AppState};
//! use leadwatch::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     let state = AppState::from_config(&config);
//!     serve(state, &config.api).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ApiConfig;
use crate::websocket::websocket_handler;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    build_router_with_cors(state, CorsLayer::permissive())
}

fn build_router_with_cors(state: AppState, cors: CorsLayer) -> Router {
    let api_routes = Router::new()
        .route("/leads", get(routes::leads::list_leads))
        .route("/snapshot", get(routes::leads::get_snapshot))
        .route("/stats", get(routes::stats::get_stats))
        .route("/status", get(routes::status::get_status));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health_routes)
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// CORS for the configured dashboard origins; permissive when none parse
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    }
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router_with_cors(state, cors_layer(config));

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Leadwatch API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Leadwatch API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StatsConfig, SyncConfig};
    use crate::leads::{Lead, LeadSchema};
    use crate::remote::{LeadSource, TransportError};
    use crate::session::LeadSession;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use futures_util::StreamExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::util::ServiceExt;

    struct FixedSource {
        rows: Option<Value>,
    }

    #[async_trait]
    impl LeadSource for FixedSource {
        async fn fetch_all(&self) -> Result<Vec<Lead>, TransportError> {
            match &self.rows {
                Some(rows) => crate::remote::decode_rows(rows.clone(), &LeadSchema::default()),
                None => Err(TransportError::Status {
                    status: 503,
                    message: "upstream down".to_string(),
                }),
            }
        }
    }

    fn rows() -> Value {
        json!([
            {
                "id": 2,
                "created_at": "2024-03-02T10:00:00Z",
                "statut": "rdv_pris",
                "nom": "Durand",
                "historique_conversation": [{"role": "agent", "content": "Bonjour"}]
            },
            {"id": 1, "created_at": "2024-03-01T10:00:00Z", "statut": "nouveau", "nom": "Martin"}
        ])
    }

    fn sync_config() -> SyncConfig {
        SyncConfig {
            poll_interval_ms: 60_000,
            realtime_enabled: false,
            ..SyncConfig::default()
        }
    }

    async fn configured_state(rows: Option<Value>) -> AppState {
        let source: Arc<dyn LeadSource> = Arc::new(FixedSource { rows });
        let session = Arc::new(LeadSession::open(
            Arc::clone(&source),
            None,
            &sync_config(),
            StatsConfig::default(),
        ));

        tokio::time::timeout(Duration::from_secs(2), async {
            while session.status().last_fetch_at.is_none() && session.status().last_error.is_none()
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        AppState::new(source, Some(session))
    }

    fn unconfigured_state() -> AppState {
        AppState::unconfigured("Missing backend configuration: url, api_key")
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_live() {
        let (status, _) = get(build_router(unconfigured_state()), "/health/live").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready_without_session() {
        let (status, _) = get(build_router(unconfigured_state()), "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready_after_bootstrap() {
        let app = build_router(configured_state(Some(rows())).await);
        let (status, _) = get(app, "/health/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_not_ready_when_bootstrap_fails() {
        let app = build_router(configured_state(None).await);
        let (status, _) = get(app, "/health/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health_full() {
        let app = build_router(configured_state(Some(rows())).await);
        let (status, json) = get(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["backend"], "ok");
        assert_eq!(json["feed"], "disabled");

        let (_, json) = get(build_router(unconfigured_state()), "/health").await;
        assert_eq!(json["backend"], "unconfigured");
    }

    #[tokio::test]
    async fn test_leads_returns_raw_rows() {
        let app = build_router(configured_state(Some(rows())).await);
        let (status, json) = get(app, "/api/leads").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, rows());
    }

    #[tokio::test]
    async fn test_leads_missing_configuration() {
        let (status, json) = get(build_router(unconfigured_state()), "/api/leads").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Missing backend configuration: url, api_key");
    }

    #[tokio::test]
    async fn test_leads_upstream_failure() {
        let app = build_router(configured_state(None).await);
        let (status, json) = get(app, "/api/leads").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_snapshot_and_stats() {
        let state = configured_state(Some(rows())).await;

        let (status, json) = get(build_router(state.clone()), "/api/snapshot").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["id"], 2);

        let (status, json) = get(build_router(state), "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 2);
        assert_eq!(json["agent_messages"], 1);
        assert_eq!(json["appointments_booked"], 1);
        assert_eq!(json["by_status"]["nouveau"], 1);
    }

    #[tokio::test]
    async fn test_snapshot_without_session() {
        let (status, json) = get(build_router(unconfigured_state()), "/api/snapshot").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_status() {
        let (status, json) = get(build_router(unconfigured_state()), "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["configured"], false);
        assert_eq!(json["lead_count"], 0);

        let app = build_router(configured_state(Some(rows())).await);
        let (_, json) = get(app, "/api/status").await;
        assert_eq!(json["configured"], true);
        assert_eq!(json["connected"], true);
        assert_eq!(json["bootstrapped"], true);
        assert_eq!(json["feed_connected"], false);
        assert_eq!(json["lead_count"], 2);
        assert!(json["last_fetch_at"].is_string());
    }

    #[tokio::test]
    async fn test_websocket_initial_messages() {
        let app = build_router(configured_state(Some(rows())).await);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();

        let mut types = Vec::new();
        while types.len() < 4 {
            let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let tokio_tungstenite::tungstenite::Message::Text(text) = frame {
                let json: Value = serde_json::from_str(&text).unwrap();
                if json["type"] == "snapshot" {
                    assert_eq!(json["leads"].as_array().unwrap().len(), 2);
                }
                types.push(json["type"].as_str().unwrap().to_string());
            }
        }

        assert_eq!(types, ["connected", "snapshot", "stats", "status"]);
    }
}
