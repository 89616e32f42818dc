//! Identity provider trait abstraction.
//!
//! The provider boundary is two calls, both bounded by a caller-supplied
//! timeout. An `Ok` response means the provider answered (valid or not);
//! an `Err` means no answer could be obtained.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::{Credentials, SessionUser};

/// Answer to a validation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateResponse {
    pub valid: bool,
    pub user: Option<SessionUser>,
    pub reason: Option<String>,
}

impl ValidateResponse {
    pub fn valid(user: SessionUser) -> Self {
        Self {
            valid: true,
            user: Some(user),
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            user: None,
            reason: Some(reason.into()),
        }
    }
}

/// Answer to a refresh request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshResponse {
    pub credentials: Option<Credentials>,
    pub user: Option<SessionUser>,
    /// The refresh token is permanently invalid.
    pub rejected: bool,
    pub reason: Option<String>,
}

impl RefreshResponse {
    pub fn refreshed(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            user: None,
            rejected: false,
            reason: None,
        }
    }

    pub fn with_user(mut self, user: SessionUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            credentials: None,
            user: None,
            rejected: true,
            reason: Some(reason.into()),
        }
    }
}

/// The provider gave no answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),
    #[error("provider unreachable: {0}")]
    Unreachable(String),
    #[error("provider sent an unusable response: {0}")]
    InvalidResponse(String),
}

/// Trait for the remote identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Check whether the credentials' access token is still accepted.
    async fn validate(
        &self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<ValidateResponse, ProviderError>;

    /// Exchange a refresh token for a new credential pair.
    async fn refresh(
        &self,
        refresh_token: &str,
        timeout: Duration,
    ) -> Result<RefreshResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_constructors() {
        let ok = ValidateResponse::valid(SessionUser::new("u"));
        assert!(ok.valid);
        assert_eq!(ok.user.unwrap().id, "u");

        let bad = ValidateResponse::invalid("revoked");
        assert!(!bad.valid);
        assert_eq!(bad.reason.as_deref(), Some("revoked"));

        let rejected = RefreshResponse::rejected("invalid_grant");
        assert!(rejected.rejected);
        assert!(rejected.credentials.is_none());

        let refreshed = RefreshResponse::refreshed(Credentials::with_tokens("a", "r"))
            .with_user(SessionUser::new("u"));
        assert!(!refreshed.rejected);
        assert!(refreshed.credentials.is_some());
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));
        let err = ProviderError::Unreachable("refused".to_string());
        assert!(err.to_string().contains("refused"));
    }
}
