//! Realtime Message Types
//!
//! Phoenix channel frames exchanged with the backend's change feed, and the
//! change events decoded from them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::leads::{Lead, LeadId, LeadSchema, RowError};

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const EVENT_SYSTEM: &str = "system";

/// One Phoenix channel frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, rename = "ref")]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    /// Join a table channel, filtered to every change operation
    pub fn join(topic: &str, db_schema: &str, table: &str, access_token: &str, msg_ref: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_JOIN.to_string(),
            payload: json!({
                "config": {
                    "broadcast": {"self": false},
                    "presence": {"key": ""},
                    "postgres_changes": [
                        {"event": "*", "schema": db_schema, "table": table}
                    ]
                },
                "access_token": access_token
            }),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: Some(msg_ref.to_string()),
        }
    }

    /// Keepalive frame on the `phoenix` topic
    pub fn heartbeat(msg_ref: &str) -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }
}

/// A change to the lead table
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert(Lead),
    Update(Lead),
    Delete(LeadId),
}

impl ChangeEvent {
    pub fn id(&self) -> &LeadId {
        match self {
            ChangeEvent::Insert(lead) | ChangeEvent::Update(lead) => &lead.id,
            ChangeEvent::Delete(id) => id,
        }
    }

    /// Build from an operation type and its records
    pub fn from_parts(
        kind: &str,
        record: Option<&Value>,
        old_record: Option<&Value>,
        schema: &LeadSchema,
    ) -> Result<Self, FrameError> {
        match kind.to_ascii_uppercase().as_str() {
            "INSERT" => {
                let record = record.ok_or(FrameError::MissingRecord("record"))?;
                Ok(ChangeEvent::Insert(Lead::from_row(record.clone(), schema)?))
            }
            "UPDATE" => {
                let record = record.ok_or(FrameError::MissingRecord("record"))?;
                Ok(ChangeEvent::Update(Lead::from_row(record.clone(), schema)?))
            }
            "DELETE" => {
                let id = old_record
                    .and_then(|r| r.get(&schema.id_field))
                    .and_then(LeadId::from_value)
                    .ok_or(FrameError::MissingRecord("old_record"))?;
                Ok(ChangeEvent::Delete(id))
            }
            other => Err(FrameError::UnknownChangeType(other.to_string())),
        }
    }
}

/// What a received frame means to the subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to our join request
    Joined,
    /// The channel refused or dropped us
    ChannelError(String),
    Change(ChangeEvent),
    /// Heartbeat replies, presence, informational system messages
    Ignored,
}

/// Decode a text frame
pub fn parse_frame(text: &str, join_ref: &str, schema: &LeadSchema) -> Result<Inbound, FrameError> {
    let msg: PhoenixMessage = serde_json::from_str(text)?;
    classify(&msg, join_ref, schema)
}

/// Interpret a frame received on the socket
///
/// Accepts both the `postgres_changes` shape (`payload.data.type`) and the
/// legacy shape where the event name is the operation.
pub fn classify(
    msg: &PhoenixMessage,
    join_ref: &str,
    schema: &LeadSchema,
) -> Result<Inbound, FrameError> {
    let payload = &msg.payload;

    match msg.event.as_str() {
        EVENT_REPLY => {
            if msg.msg_ref.as_deref() != Some(join_ref) {
                return Ok(Inbound::Ignored);
            }
            match payload.get("status").and_then(Value::as_str) {
                Some("ok") => Ok(Inbound::Joined),
                _ => {
                    let reason = payload
                        .pointer("/response/reason")
                        .and_then(Value::as_str)
                        .unwrap_or("join refused")
                        .to_string();
                    Ok(Inbound::ChannelError(reason))
                }
            }
        }
        EVENT_ERROR => Ok(Inbound::ChannelError("channel error".to_string())),
        EVENT_CLOSE => Ok(Inbound::ChannelError("channel closed".to_string())),
        EVENT_SYSTEM => match payload.get("status").and_then(Value::as_str) {
            Some("error") => Ok(Inbound::ChannelError(
                payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("system error")
                    .to_string(),
            )),
            _ => Ok(Inbound::Ignored),
        },
        EVENT_POSTGRES_CHANGES => {
            let data = payload.get("data").ok_or(FrameError::MissingRecord("data"))?;
            let kind = data
                .get("type")
                .and_then(Value::as_str)
                .ok_or(FrameError::MissingRecord("type"))?;
            ChangeEvent::from_parts(kind, data.get("record"), data.get("old_record"), schema)
                .map(Inbound::Change)
        }
        "INSERT" | "UPDATE" | "DELETE" => ChangeEvent::from_parts(
            &msg.event,
            payload.get("record"),
            payload.get("old_record"),
            schema,
        )
        .map(Inbound::Change),
        _ => Ok(Inbound::Ignored),
    }
}

/// A frame that could not be turned into an event
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Change payload is missing '{0}'")]
    MissingRecord(&'static str),

    #[error("Unknown change type: {0}")]
    UnknownChangeType(String),

    #[error("Invalid record: {0}")]
    Row(#[from] RowError),
}
