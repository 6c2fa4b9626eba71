//! WebSocket Handler
//!
//! Handles WebSocket upgrade requests and manages the connection lifecycle.
//! Each connection gets the current snapshot, stats and status on connect,
//! then a fresh snapshot and stats after every store change.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use uuid::Uuid;

use super::messages::{ClientMessage, ServerMessage};
use crate::api::dto::StatusResponse;
use crate::api::AppState;
use crate::session::LeadSession;

type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = Uuid::new_v4().to_string();

    let session = match state.session() {
        Ok(session) => Arc::clone(session),
        Err(e) => {
            let error_msg = ServerMessage::Error {
                message: e.to_string(),
            };
            if let Ok(text) = serde_json::to_string(&error_msg) {
                let _ = sender.send(Message::Text(text)).await;
            }
            let _ = sender.close().await;
            return;
        }
    };

    // Channel for sending messages to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let _ = tx.send(ServerMessage::Connected {
        connection_id: connection_id.clone(),
    });
    send_state(&tx, &session);
    let _ = tx.send(status_message(&session));

    tracing::debug!(connection_id = %connection_id, "WebSocket connected");

    let conn_id_for_send = connection_id.clone();

    // Task to forward messages from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        tracing::debug!(
                            connection_id = %conn_id_for_send,
                            "WebSocket send failed, closing connection"
                        );
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                }
            }
        }
    });

    // Task to push session updates into the channel
    let mut update_task = tokio::spawn(forward_updates(Arc::clone(&session), tx.clone()));

    let conn_id_for_recv = connection_id.clone();

    // Task to receive messages from WebSocket and handle them
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_ws_message(&session, &tx, &conn_id_for_recv, msg) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %conn_id_for_recv,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
            }
        }
    });

    // Wait for any task to complete
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            update_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
            update_task.abort();
        }
        _ = &mut update_task => {
            send_task.abort();
            recv_task.abort();
        }
    }

    tracing::debug!(connection_id = %connection_id, "WebSocket disconnected");
}

/// Relay snapshot, status and notification changes until the session ends
async fn forward_updates(session: Arc<LeadSession>, tx: Outbox) {
    let mut snapshots = session.watch_snapshot();
    let mut statuses = session.watch_status();
    let mut notifications = session.notifications();

    loop {
        let delivered = tokio::select! {
            changed = snapshots.changed() => match changed {
                Ok(()) => send_state(&tx, &session),
                Err(_) => break,
            },
            changed = statuses.changed() => match changed {
                Ok(()) => tx.send(status_message(&session)).is_ok(),
                Err(_) => break,
            },
            notification = notifications.recv() => match notification {
                Ok(notification) => tx.send(ServerMessage::Notification { notification }).is_ok(),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "WebSocket client missed notifications");
                    true
                }
                Err(RecvError::Closed) => break,
            },
        };

        if !delivered {
            break;
        }
    }
}

/// Queue the current snapshot and its stats; false once the connection is gone
fn send_state(tx: &Outbox, session: &LeadSession) -> bool {
    let snapshot = session.snapshot();
    let stats = session.stats(Utc::now());
    tx.send(ServerMessage::Snapshot { leads: snapshot }).is_ok()
        && tx.send(ServerMessage::Stats { stats }).is_ok()
}

fn status_message(session: &LeadSession) -> ServerMessage {
    ServerMessage::Status {
        status: StatusResponse::from_session(session.status(), session.snapshot().len()),
    }
}

/// Handle a received WebSocket message
///
/// Returns false if the connection should be closed.
fn handle_ws_message(
    session: &LeadSession,
    tx: &Outbox,
    connection_id: &str,
    message: Message,
) -> bool {
    match message {
        Message::Text(text) => {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Refresh) => {
                    send_state(tx, session);
                }
                Ok(ClientMessage::Ping) => {
                    let _ = tx.send(ServerMessage::Pong);
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        text = %text,
                        "Invalid client message"
                    );
                    // Send error but keep connection open
                    let _ = tx.send(ServerMessage::Error {
                        message: format!("Invalid message format: {}", e),
                    });
                }
            }
            true
        }
        Message::Binary(_) => {
            let _ = tx.send(ServerMessage::Error {
                message: "Binary messages not supported".to_string(),
            });
            true
        }
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "Client requested close");
            false
        }
    }
}
