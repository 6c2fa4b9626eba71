//! Core lead types
//!
//! - `Lead`: one prospective contact, decoded from a backend row
//! - `LeadId`: the backend-assigned primary key
//! - `LeadStatus`: the mutable classification column
//! - `LeadSchema`: which columns carry the fields the sync layer reads

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use super::history::{normalize_history, ConversationEntry};

/// Status value meaning an appointment was booked with the lead
pub const APPOINTMENT_BOOKED: &str = "rdv_pris";

/// Backend primary key of a lead
///
/// Tables may use integer or uuid keys; both are kept in string form so
/// that `1` and `"1"` identify the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(String);

impl LeadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Read an id from a JSON column value (string or integer)
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LeadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<i64> for LeadId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

/// Classification of a lead in the sales pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LeadStatus {
    /// Appointment booked (`rdv_pris`)
    AppointmentBooked,
    /// Any other backend value, kept verbatim
    Other(String),
}

impl LeadStatus {
    pub fn parse(value: &str) -> Self {
        if value == APPOINTMENT_BOOKED {
            LeadStatus::AppointmentBooked
        } else {
            LeadStatus::Other(value.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LeadStatus::AppointmentBooked => APPOINTMENT_BOOKED,
            LeadStatus::Other(s) => s,
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column names used to decode rows
///
/// The two known table layouts differ only in naming (`statut` vs `status`,
/// `historique_conversation` vs `conversation_history`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadSchema {
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default = "default_created_at_field")]
    pub created_at_field: String,
    #[serde(default = "default_status_field")]
    pub status_field: String,
    #[serde(default = "default_history_field")]
    pub history_field: String,
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_created_at_field() -> String {
    "created_at".to_string()
}

fn default_status_field() -> String {
    "statut".to_string()
}

fn default_history_field() -> String {
    "historique_conversation".to_string()
}

impl Default for LeadSchema {
    fn default() -> Self {
        Self {
            id_field: default_id_field(),
            created_at_field: default_created_at_field(),
            status_field: default_status_field(),
            history_field: default_history_field(),
        }
    }
}

/// A lead record
///
/// The typed fields are decoded once from the row; the row itself is kept
/// so it can be handed back to clients exactly as the backend sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct Lead {
    pub id: LeadId,
    pub created_at: DateTime<Utc>,
    pub status: Option<LeadStatus>,
    pub conversation: Vec<ConversationEntry>,
    row: Map<String, Value>,
}

impl Lead {
    /// Decode a backend row
    pub fn from_row(row: Value, schema: &LeadSchema) -> Result<Self, RowError> {
        let row = match row {
            Value::Object(map) => map,
            other => return Err(RowError::NotAnObject(json_kind(&other))),
        };

        let id = row
            .get(&schema.id_field)
            .and_then(LeadId::from_value)
            .ok_or_else(|| RowError::MissingField(schema.id_field.clone()))?;

        let created_at = match row.get(&schema.created_at_field) {
            Some(Value::String(s)) => parse_timestamp(s).ok_or_else(|| RowError::InvalidTimestamp {
                id: id.clone(),
                value: s.clone(),
            })?,
            _ => return Err(RowError::MissingField(schema.created_at_field.clone())),
        };

        let status = row
            .get(&schema.status_field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(LeadStatus::parse);

        let conversation = normalize_history(row.get(&schema.history_field));

        Ok(Self {
            id,
            created_at,
            status,
            conversation,
            row,
        })
    }

    /// The raw backend row
    pub fn row(&self) -> &Map<String, Value> {
        &self.row
    }

    /// Look up any column of the raw row
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.row.get(name)
    }

    /// Number of conversation entries authored by `role`
    pub fn messages_from(&self, role: &str) -> usize {
        self.conversation.iter().filter(|m| m.role == role).count()
    }

    pub fn is_appointment_booked(&self) -> bool {
        matches!(self.status, Some(LeadStatus::AppointmentBooked))
    }
}

impl Serialize for Lead {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.row.serialize(serializer)
    }
}

/// Errors decoding a single backend row
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("Row is not a JSON object (got {0})")]
    NotAnObject(&'static str),

    #[error("Row is missing required field '{0}'")]
    MissingField(String),

    #[error("Lead {id} has an invalid timestamp: {value}")]
    InvalidTimestamp { id: LeadId, value: String },
}

/// Parse an RFC 3339 timestamp; offset-less timestamps are read as UTC
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
