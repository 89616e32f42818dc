//! Session error taxonomy.
//!
//! Provider and storage failures are converted into these variants at the
//! Validator/Refresher/store boundary. Nothing above that boundary returns a
//! raw transport error.

use std::fmt;

use super::category::ErrorCategory;

/// Errors the session subsystem records and reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No persisted credentials (user not signed in).
    CredentialMissing,

    /// Persisted credentials cannot be used (access token without refresh
    /// token, or an unreadable blob).
    CredentialStructurallyInvalid,

    /// Provider permanently rejected the credentials. Forces sign-out.
    ProviderRejected { reason: String },

    /// Provider could not be reached. The session is preserved.
    ProviderUnreachable { reason: String },

    /// A data-refresh subscriber failed. Logged, never fatal.
    SubscriberFailure { subscriber: String, message: String },

    /// The local credential store failed.
    CredentialsStore { message: String },
}

impl SessionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::CredentialMissing
            | SessionError::CredentialStructurallyInvalid
            | SessionError::ProviderRejected { .. } => ErrorCategory::Auth,
            SessionError::ProviderUnreachable { .. } => ErrorCategory::Network,
            SessionError::SubscriberFailure { .. } => ErrorCategory::Subscriber,
            SessionError::CredentialsStore { .. } => ErrorCategory::Storage,
        }
    }

    /// Whether the user has to sign in again.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            SessionError::ProviderRejected { .. }
                | SessionError::CredentialStructurallyInvalid
                | SessionError::CredentialMissing
        )
    }

    /// Transient failures leave the session untouched and stay silent.
    pub fn is_transient(&self) -> bool {
        self.category().is_retryable()
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::CredentialMissing => {
                "You are not signed in. Please sign in to continue.".to_string()
            }
            SessionError::CredentialStructurallyInvalid => {
                "Your saved session was damaged and has been removed. Please sign in again."
                    .to_string()
            }
            SessionError::ProviderRejected { .. } => {
                "Your session has expired. Please sign in again.".to_string()
            }
            SessionError::ProviderUnreachable { .. } => {
                "Could not reach the sign-in service. Your session is kept.".to_string()
            }
            SessionError::SubscriberFailure { subscriber, .. } => {
                format!("Could not refresh '{}'.", subscriber)
            }
            SessionError::CredentialsStore { .. } => {
                "Could not access saved credentials. Please check file permissions.".to_string()
            }
        }
    }

    /// What the user can do about it.
    pub fn recovery_hint(&self) -> &'static str {
        self.category().recovery_hint()
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            SessionError::CredentialMissing => "E_SESSION_MISSING",
            SessionError::CredentialStructurallyInvalid => "E_SESSION_CORRUPT",
            SessionError::ProviderRejected { .. } => "E_SESSION_REJECTED",
            SessionError::ProviderUnreachable { .. } => "E_SESSION_UNREACHABLE",
            SessionError::SubscriberFailure { .. } => "E_SESSION_SUBSCRIBER",
            SessionError::CredentialsStore { .. } => "E_SESSION_STORE",
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::CredentialMissing => write!(f, "No credentials stored"),
            SessionError::CredentialStructurallyInvalid => {
                write!(f, "Stored credentials are structurally invalid")
            }
            SessionError::ProviderRejected { reason } => {
                write!(f, "Provider rejected credentials: {}", reason)
            }
            SessionError::ProviderUnreachable { reason } => {
                write!(f, "Provider unreachable: {}", reason)
            }
            SessionError::SubscriberFailure {
                subscriber,
                message,
            } => write!(f, "Subscriber '{}' failed: {}", subscriber, message),
            SessionError::CredentialsStore { message } => {
                write!(f, "Credentials store error: {}", message)
            }
        }
    }
}

impl std::error::Error for SessionError {}

impl From<crate::traits::CredentialsError> for SessionError {
    fn from(err: crate::traits::CredentialsError) -> Self {
        match err {
            crate::traits::CredentialsError::Serialization(_) => {
                SessionError::CredentialStructurallyInvalid
            }
            other => SessionError::CredentialsStore {
                message: other.to_string(),
            },
        }
    }
}
