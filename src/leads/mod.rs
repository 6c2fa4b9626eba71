//! Lead Model
//!
//! - **types**: `Lead`, `LeadId`, `LeadStatus`, `LeadSchema`
//! - **history**: conversation history normalisation shared by every reader

mod history;
mod types;

pub use history::{normalize_history, ConversationEntry, AGENT_ROLE};
pub use types::{Lead, LeadId, LeadSchema, LeadStatus, RowError, APPOINTMENT_BOOKED};
