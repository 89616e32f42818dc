//! Error category classification.
//!
//! Categories decide how the coordinator reacts to a failure: whether the
//! session survives it and whether it is worth another attempt.

use std::fmt;

/// High-level categorization of session errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The provider rejected the credentials, or they cannot be used at all.
    /// Fatal to the session.
    Auth,

    /// Provider unreachable (connection, DNS, timeout, 5xx).
    /// Transient; retried on the next activation.
    Network,

    /// Local credential store failures (filesystem, permissions).
    Storage,

    /// A data-refresh subscriber failed. Isolated and never fatal.
    Subscriber,
}

impl ErrorCategory {
    /// Returns true if errors in this category are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Storage)
    }

    /// Returns a short label for the category suitable for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "auth",
            ErrorCategory::Network => "network",
            ErrorCategory::Storage => "storage",
            ErrorCategory::Subscriber => "subscriber",
        }
    }

    /// Returns suggested recovery actions for this category.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "Sign in again",
            ErrorCategory::Network => "Check your internet connection; the session is kept",
            ErrorCategory::Storage => "Check file permissions and available disk space",
            ErrorCategory::Subscriber => "Reload the affected view",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
