//! Transport-level error classification.
//!
//! Every variant here means the provider could not give an answer, so a
//! `NetworkError` never invalidates a session by itself.

use thiserror::Error;

/// Why a request to the identity provider produced no answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Connection to '{url}' failed: {message}")]
    ConnectionFailed { url: String, message: String },

    /// The caller's deadline passed first.
    #[error("{operation} timed out")]
    Timeout { operation: String },

    /// Body could not be read or decoded.
    #[error("Unreadable response: {message}")]
    InvalidResponse { message: String },

    #[error("Network error: {message}")]
    Other { message: String },
}

impl NetworkError {
    /// Whether the caller's own deadline ended the request.
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetworkError::Timeout { .. })
    }
}

/// Classify a reqwest error for the request to `url`.
pub fn classify_reqwest_error(err: &reqwest::Error, url: &str) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout {
            operation: format!("request to {}", url),
        }
    } else if err.is_connect() {
        NetworkError::ConnectionFailed {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else if err.is_decode() || err.is_body() {
        NetworkError::InvalidResponse {
            message: err.to_string(),
        }
    } else {
        NetworkError::Other {
            message: err.to_string(),
        }
    }
}
