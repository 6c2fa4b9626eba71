//! # Leadwatch
//!
//! Real-time monitoring of the leads handled by an AI prospecting agent.
//! Keeps a local, always-consistent view of a backend lead table, combining
//! a periodic full read with a live change feed, and derives dashboard
//! statistics and "new lead" notifications from it.
//!
//! ## Modules
//!
//! - [`leads`]: lead records and conversation history decoding
//! - [`remote`]: full reads from the backend's row API
//! - [`realtime`]: insert/update/delete change feed
//! - [`store`]: the reconciliation store and its snapshots
//! - [`stats`]: counters and rollups over a snapshot
//! - [`notify`]: new-lead notifications
//! - [`session`]: wires the above into a running sync session
//! - [`api`]: REST API and WebSocket server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use leadwatch::config::Config;
//! use leadwatch::session::LeadSession;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     let session = LeadSession::from_config(&config)?;
//!
//!     let mut notifications = session.notifications();
//!     while let Ok(notification) = notifications.recv().await {
//!         let stats = session.stats(Utc::now()).stats;
//!         println!("{} ({} leads total)", notification.message, stats.total);
//!     }
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod leads;
pub mod notify;
pub mod realtime;
pub mod remote;
pub mod session;
pub mod stats;
pub mod store;
pub mod websocket;

// Re-export top-level types for convenience
pub use config::{Config, ConfigError, LoadedConfig};
pub use leads::{ConversationEntry, Lead, LeadId, LeadSchema, LeadStatus};
pub use notify::{Notification, NotificationEmitter};
pub use realtime::{ChangeEvent, ChangeFeed, RealtimeSubscriber};
pub use remote::{LeadSource, RestClient, TransportError};
pub use session::{LeadSession, SessionStatus};
pub use stats::{compute_stats, LeadStats, StatsReport};
pub use store::{LeadStore, Snapshot, StoreEvent};

pub use api::{build_router, serve, ApiError, AppState};
