//! Change Event Subscriber
//!
//! Push side of the sync layer: insert/update/delete notifications for the
//! lead table over the backend's realtime WebSocket.
//!
//! ## Architecture
//!
//! - **Messages**: Phoenix channel frames and decoded `ChangeEvent`s
//! - **Subscriber**: socket task, heartbeat, `Subscription` handle
//!
//! The subscriber never reconnects by itself. When a `Disconnected` event
//! arrives, the owning session decides when to subscribe again.

mod messages;
mod subscriber;

pub use messages::{parse_frame, ChangeEvent, FrameError, Inbound, PhoenixMessage};
pub use subscriber::{FeedEvent, RealtimeSubscriber, Subscription, SubscriptionError};

use async_trait::async_trait;

/// A source of change events for the lead table
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription; one per session
    async fn subscribe(&self) -> Result<Subscription, SubscriptionError>;
}
