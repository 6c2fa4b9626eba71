//! Remote accessor error types

use thiserror::Error;

/// Errors reading from the backend's row API
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Backend request timed out")]
    Timeout,

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed payload: {0}")]
    Decode(String),
}

impl TransportError {
    /// Classify a reqwest error the way callers care about it
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Unavailable(e.to_string())
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Request(e)
        }
    }
}
