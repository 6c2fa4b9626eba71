//! Reconciliation Store
//!
//! - **snapshot**: immutable ordered view handed to readers
//! - **store**: the session's single writer, with change notifications
//!
//! # Example
//!
//! ```rust
//! use leadwatch::leads::{Lead, LeadSchema};
//! use leadwatch::store::LeadStore;
//! use serde_json::json;
//!
//! let schema = LeadSchema::default();
//! let store = LeadStore::new();
//! store.replace_all(vec![
//!     Lead::from_row(json!({"id": 1, "created_at": "2024-03-01T10:00:00Z"}), &schema).unwrap(),
//!     Lead::from_row(json!({"id": 2, "created_at": "2024-03-02T10:00:00Z"}), &schema).unwrap(),
//! ]);
//!
//! let ids: Vec<_> = store.snapshot().ids().map(|id| id.to_string()).collect();
//! assert_eq!(ids, ["2", "1"]);
//! ```

mod snapshot;
#[allow(clippy::module_inception)]
mod store;

pub use snapshot::Snapshot;
pub use store::{LeadStore, StoreEvent};
