//! Change Feed Subscriber
//!
//! Holds one WebSocket to the backend's realtime endpoint, joins the lead
//! table channel and forwards decoded changes, in arrival order, to the
//! owner of the [`Subscription`].

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::messages::{parse_frame, ChangeEvent, Inbound, PhoenixMessage};
use super::ChangeFeed;
use crate::config::{BackendConfig, Config, ConfigError, Credentials};
use crate::leads::LeadSchema;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const JOIN_REF: &str = "1";

/// What a subscription delivers to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// The channel join was acknowledged
    Connected,
    Change(ChangeEvent),
    /// The socket or channel is gone; no further events follow
    Disconnected(String),
}

/// A live subscription
///
/// Dropping it (or calling [`Subscription::close`]) releases the socket task.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<FeedEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(events: mpsc::UnboundedReceiver<FeedEvent>, task: JoinHandle<()>) -> Self {
        Self {
            events,
            task: Some(task),
        }
    }

    /// A subscription fed by a channel with no background task of its own
    pub fn from_receiver(events: mpsc::UnboundedReceiver<FeedEvent>) -> Self {
        Self { events, task: None }
    }

    /// Next event, or `None` once the feed is finished
    pub async fn next(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.events.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Realtime change feed for the lead table
pub struct RealtimeSubscriber {
    socket_url: String,
    api_key: String,
    topic: String,
    table: String,
    db_schema: String,
    schema: LeadSchema,
    heartbeat: Duration,
}

impl RealtimeSubscriber {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let credentials = config.backend.credentials()?;
        Ok(Self::new(
            &credentials,
            &config.backend,
            config.sync.heartbeat_interval(),
        ))
    }

    pub fn new(credentials: &Credentials, backend: &BackendConfig, heartbeat: Duration) -> Self {
        Self {
            socket_url: realtime_url(&credentials.base_url, &credentials.api_key),
            api_key: credentials.api_key.clone(),
            topic: format!("realtime:{}:{}", backend.db_schema, backend.table),
            table: backend.table.clone(),
            db_schema: backend.db_schema.clone(),
            schema: backend.fields.clone(),
            heartbeat,
        }
    }

    pub fn socket_url(&self) -> &str {
        &self.socket_url
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl ChangeFeed for RealtimeSubscriber {
    async fn subscribe(&self) -> Result<Subscription, SubscriptionError> {
        let (mut socket, _) = connect_async(self.socket_url.as_str())
            .await
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;

        let join = PhoenixMessage::join(
            &self.topic,
            &self.db_schema,
            &self.table,
            &self.api_key,
            JOIN_REF,
        );
        socket
            .send(Message::Text(serde_json::to_string(&join)?))
            .await
            .map_err(|e| SubscriptionError::Send(e.to_string()))?;

        tracing::info!(topic = %self.topic, "Joining change feed");

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(
            socket,
            tx,
            self.topic.clone(),
            self.schema.clone(),
            self.heartbeat,
        ));

        Ok(Subscription::new(rx, task))
    }
}

/// Pump frames until the socket ends or the owner goes away
async fn run_socket(
    socket: Socket,
    tx: mpsc::UnboundedSender<FeedEvent>,
    topic: String,
    schema: LeadSchema,
    heartbeat_period: Duration,
) {
    let (mut sink, mut stream) = socket.split();

    let mut heartbeat = tokio::time::interval(heartbeat_period);
    // Skip the first immediate tick
    heartbeat.tick().await;
    let mut next_ref: u64 = 2;

    let reason = loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                let frame = PhoenixMessage::heartbeat(&next_ref.to_string());
                next_ref += 1;
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => break format!("heartbeat encoding failed: {}", e),
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    break format!("heartbeat failed: {}", e);
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match parse_frame(&text, JOIN_REF, &schema) {
                    Ok(Inbound::Joined) => {
                        tracing::info!(topic = %topic, "Change feed connected");
                        if tx.send(FeedEvent::Connected).is_err() {
                            return;
                        }
                    }
                    Ok(Inbound::Change(change)) => {
                        tracing::debug!(topic = %topic, lead_id = %change.id(), "Change received");
                        if tx.send(FeedEvent::Change(change)).is_err() {
                            return;
                        }
                    }
                    Ok(Inbound::ChannelError(reason)) => break reason,
                    Ok(Inbound::Ignored) => {}
                    Err(e) => {
                        tracing::warn!(topic = %topic, error = %e, "Skipping undecodable frame");
                    }
                },
                Some(Ok(Message::Close(_))) => break "closed by server".to_string(),
                Some(Ok(_)) => {}
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_string(),
            }
        }
    };

    tracing::warn!(topic = %topic, reason = %reason, "Change feed disconnected");
    let _ = tx.send(FeedEvent::Disconnected(reason));
}

/// Realtime websocket URL for a project base URL
fn realtime_url(base_url: &str, api_key: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        format!("wss://{}", base)
    };

    format!(
        "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        ws_base,
        urlencoding::encode(api_key)
    )
}

/// Errors establishing a subscription
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Failed to connect to change feed: {0}")]
    Connect(String),

    #[error("Failed to send to change feed: {0}")]
    Send(String),

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}
