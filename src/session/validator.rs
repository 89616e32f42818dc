//! Validator: lightweight "is this access token still accepted?" check.
//!
//! Provider failures, timeouts and panics are all converted into
//! [`ValidationOutcome::Unreachable`] here. Only an explicit provider answer
//! produces `Invalid`.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

use crate::auth::{Credentials, SessionUser};
use crate::traits::IdentityProvider;

/// Default bound on a validation round trip.
pub const DEFAULT_VALIDATE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid(SessionUser),
    /// The credentials were rejected (or are known to be expired).
    Invalid(String),
    /// No answer; says nothing about the credentials.
    Unreachable(String),
}

#[derive(Clone)]
pub struct Validator {
    provider: Arc<dyn IdentityProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Validator {
    pub fn new(provider: Arc<dyn IdentityProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn validate(&self, credentials: &Credentials) -> ValidationOutcome {
        if !credentials.has_token() {
            return ValidationOutcome::Invalid("no access token".to_string());
        }
        if credentials.is_expired() {
            debug!("Access token past its expiry, skipping provider round trip");
            return ValidationOutcome::Invalid("access token expired".to_string());
        }

        let call = AssertUnwindSafe(self.provider.validate(credentials, self.timeout)).catch_unwind();
        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                debug!("Validation timed out after {:?}", self.timeout);
                ValidationOutcome::Unreachable(format!("timed out after {:?}", self.timeout))
            }
            Ok(Err(_)) => {
                warn!("Identity provider panicked during validation");
                ValidationOutcome::Unreachable("provider panicked".to_string())
            }
            Ok(Ok(Err(e))) => {
                debug!("Validation got no answer: {}", e);
                ValidationOutcome::Unreachable(e.to_string())
            }
            Ok(Ok(Ok(response))) if response.valid => {
                let user = response
                    .user
                    .or_else(|| credentials.user_id.clone().map(SessionUser::new))
                    .unwrap_or_else(|| SessionUser::new("unknown"));
                ValidationOutcome::Valid(user)
            }
            Ok(Ok(Ok(response))) => ValidationOutcome::Invalid(
                response
                    .reason
                    .unwrap_or_else(|| "access token rejected".to_string()),
            ),
        }
    }
}
