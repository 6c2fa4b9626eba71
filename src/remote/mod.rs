//! Remote Accessor
//!
//! Authenticated reads against the backend's row API. One call, one round
//! trip, no retries: the session's poll timer is the retry policy.

mod client;
mod error;

pub use client::{decode_rows, RestClient};
pub use error::TransportError;

use async_trait::async_trait;

use crate::leads::Lead;

/// Anything that can produce the full lead list, newest first
#[async_trait]
pub trait LeadSource: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<Lead>, TransportError>;
}
