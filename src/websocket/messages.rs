//! WebSocket Message Types
//!
//! Messages exchanged between dashboards and the server.

use serde::{Deserialize, Serialize};

use crate::api::dto::StatusResponse;
use crate::notify::Notification;
use crate::stats::StatsReport;
use crate::store::Snapshot;

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for a fresh snapshot and stats
    Refresh,
    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established
    Connected {
        /// Unique connection identifier
        connection_id: String,
    },
    /// The full current snapshot, newest lead first
    Snapshot { leads: Snapshot },
    Stats {
        #[serde(flatten)]
        stats: StatsReport,
    },
    /// New leads arrived
    Notification {
        #[serde(flatten)]
        notification: Notification,
    },
    Status {
        #[serde(flatten)]
        status: StatusResponse,
    },
    /// Pong response to ping
    Pong,
    /// Error message
    Error {
        /// Error description
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_client_message_parse() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "refresh"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Refresh));

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type": "subscribe"}"#).is_err());
    }

    #[test]
    fn test_notification_is_flattened() {
        let msg = ServerMessage::Notification {
            notification: Notification::new(2, Utc::now()),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "notification");
        assert_eq!(json["count"], 2);
        assert_eq!(json["message"], "2 nouveaux leads !");
    }

    #[test]
    fn test_snapshot_message() {
        let msg = ServerMessage::Snapshot {
            leads: Snapshot::default(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["leads"], serde_json::json!([]));
    }
}
