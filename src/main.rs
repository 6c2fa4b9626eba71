//! Leadwatch API Server
//!
//! Run with: cargo run --bin leadwatch
//!
//! # Configuration
//!
//! Read from `~/.config/leadwatch/config.toml`, `/etc/leadwatch/config.toml`
//! or `./config.toml`, then overridden by environment variables:
//! - `SUPABASE_URL` / `NEXT_PUBLIC_SUPABASE_URL`: backend base URL
//! - `SUPABASE_ANON_KEY` / `NEXT_PUBLIC_SUPABASE_ANON_KEY`: backend API key
//! - `LEADWATCH_TABLE`: lead table (default: leads_ouways)
//! - `LEADWATCH_POLL_INTERVAL_MS`: backstop fetch period (default: 5000)
//! - `LEADWATCH_API_HOST`, `LEADWATCH_API_PORT`: bind address (default: 0.0.0.0:8090)
//! - `LEADWATCH_LOG_LEVEL`, `LEADWATCH_LOG_FORMAT`: logging (default: info, pretty)
//! - `RUST_LOG`: full filter, wins over the level above

use leadwatch::api::{serve, AppState};
use leadwatch::config::{Config, LoadedConfig};
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let loaded = match std::env::args().nth(1) {
        Some(path) => LoadedConfig::from_file(Path::new(&path))?,
        None => Config::load_default(),
    };
    loaded.config.logging.init();
    loaded.log();
    let config = loaded.config;

    tracing::info!("Starting Leadwatch API server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        table = %config.backend.table,
        poll_interval_ms = config.sync.poll_interval_ms,
        realtime = config.sync.realtime_enabled,
        "Sync settings"
    );

    let state = AppState::from_config(&config);
    let session = state.session.clone();

    // Run server
    serve(state, &config.api).await?;

    // Graceful shutdown
    if let Some(session) = session {
        session.close().await;
    }
    tracing::info!("Leadwatch API server stopped");

    Ok(())
}
