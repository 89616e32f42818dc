//! Refresher: exchanges a refresh token for a new credential pair.
//!
//! As with the validator, only an explicit provider rejection yields
//! [`RefreshOutcome::Rejected`]; every other failure is `Unreachable` and must
//! never cause credentials to be deleted.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::auth::{Credentials, SessionUser};
use crate::traits::IdentityProvider;

/// Default bound on a refresh round trip.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed {
        credentials: Credentials,
        user: SessionUser,
    },
    /// The refresh token is permanently invalid.
    Rejected(String),
    /// Transient; the refresh token may still be good.
    Unreachable(String),
}

#[derive(Clone)]
pub struct Refresher {
    provider: Arc<dyn IdentityProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for Refresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refresher")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Refresher {
    pub fn new(provider: Arc<dyn IdentityProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub async fn refresh(&self, current: &Credentials) -> RefreshOutcome {
        let Some(refresh_token) = current.refresh_token.as_deref() else {
            return RefreshOutcome::Rejected("no refresh token".to_string());
        };

        let call = AssertUnwindSafe(self.provider.refresh(refresh_token, self.timeout)).catch_unwind();
        let response = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                debug!("Refresh timed out after {:?}", self.timeout);
                return RefreshOutcome::Unreachable(format!("timed out after {:?}", self.timeout));
            }
            Ok(Err(_)) => {
                warn!("Identity provider panicked during refresh");
                return RefreshOutcome::Unreachable("provider panicked".to_string());
            }
            Ok(Ok(Err(e))) => {
                debug!("Refresh got no answer: {}", e);
                return RefreshOutcome::Unreachable(e.to_string());
            }
            Ok(Ok(Ok(response))) => response,
        };

        if response.rejected {
            return RefreshOutcome::Rejected(
                response
                    .reason
                    .unwrap_or_else(|| "refresh token rejected".to_string()),
            );
        }

        let Some(mut credentials) = response.credentials else {
            // Neither rejected nor refreshed: treat as a bad answer, keep the token
            return RefreshOutcome::Unreachable("refresh response carried no credentials".to_string());
        };
        if !credentials.has_token() {
            return RefreshOutcome::Unreachable("refresh response carried no access token".to_string());
        }
        if credentials.refresh_token.is_none() {
            credentials.refresh_token = Some(refresh_token.to_string());
        }

        let user = response
            .user
            .or_else(|| credentials.user_id.clone().map(SessionUser::new))
            .or_else(|| current.user_id.clone().map(SessionUser::new))
            .unwrap_or_else(|| SessionUser::new("unknown"));
        if credentials.user_id.is_none() {
            credentials.user_id = Some(user.id.clone());
        }

        RefreshOutcome::Refreshed { credentials, user }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockIdentityProvider, MockRefresh};

    fn refresher(provider: &MockIdentityProvider, timeout: Duration) -> Refresher {
        Refresher::new(Arc::new(provider.clone()), timeout)
    }

    #[tokio::test]
    async fn test_refreshed_keeps_user_and_fills_refresh_token() {
        let provider = MockIdentityProvider::new();
        provider.set_refresh(MockRefresh::Refreshed(
            Credentials {
                access_token: Some("a2".to_string()),
                ..Default::default()
            },
            None,
        ));

        let outcome = refresher(&provider, DEFAULT_REFRESH_TIMEOUT)
            .refresh(&Credentials::with_tokens("a1", "r1").for_user("u-7"))
            .await;

        match outcome {
            RefreshOutcome::Refreshed { credentials, user } => {
                assert_eq!(credentials.access_token.as_deref(), Some("a2"));
                assert_eq!(credentials.refresh_token.as_deref(), Some("r1"));
                assert_eq!(credentials.user_id.as_deref(), Some("u-7"));
                assert_eq!(user.id, "u-7");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(provider.refresh_tokens_seen(), vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected() {
        let provider = MockIdentityProvider::new();
        provider.set_refresh(MockRefresh::Rejected("invalid_grant".to_string()));
        let outcome = refresher(&provider, DEFAULT_REFRESH_TIMEOUT)
            .refresh(&Credentials::with_tokens("a1", "r1"))
            .await;
        assert_eq!(outcome, RefreshOutcome::Rejected("invalid_grant".to_string()));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_is_rejected_without_call() {
        let provider = MockIdentityProvider::new();
        let creds = Credentials {
            access_token: Some("a1".to_string()),
            ..Default::default()
        };
        let outcome = refresher(&provider, DEFAULT_REFRESH_TIMEOUT)
            .refresh(&creds)
            .await;
        assert!(matches!(outcome, RefreshOutcome::Rejected(_)));
        assert_eq!(provider.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_and_panic_are_unreachable() {
        let provider = MockIdentityProvider::new();
        provider.push_refresh(MockRefresh::Hang);
        provider.push_refresh(MockRefresh::Panic);
        let refresher = refresher(&provider, Duration::from_millis(30));
        let creds = Credentials::with_tokens("a1", "r1");

        assert!(matches!(
            refresher.refresh(&creds).await,
            RefreshOutcome::Unreachable(_)
        ));
        assert!(matches!(
            refresher.refresh(&creds).await,
            RefreshOutcome::Unreachable(_)
        ));
    }

    #[tokio::test]
    async fn test_empty_answer_is_unreachable() {
        let provider = MockIdentityProvider::new();
        provider.set_refresh(MockRefresh::Refreshed(Credentials::default(), None));
        let outcome = refresher(&provider, DEFAULT_REFRESH_TIMEOUT)
            .refresh(&Credentials::with_tokens("a1", "r1"))
            .await;
        assert!(matches!(outcome, RefreshOutcome::Unreachable(_)));
    }
}
