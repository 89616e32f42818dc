//! HTTP identity provider adapter.
//!
//! Maps [`CentralApiClient`] results onto the [`IdentityProvider`] contract.
//! The important decision made here is which HTTP answers count as a
//! *rejection* (credentials permanently bad) versus *no answer* (transient):
//!
//! | Answer | Validate | Refresh |
//! |--------|----------|---------|
//! | 2xx | valid | refreshed |
//! | 401 / 403 | invalid | rejected |
//! | 400 with `invalid_grant`-style error | unreachable | rejected |
//! | anything else, timeouts, transport errors | unreachable | unreachable |

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::auth::central_api::{
    error_reason, get_jwt_expires_in, truncate_body, CentralApiClient, CentralApiError,
};
use crate::auth::{Credentials, SessionUser};
use crate::error::NetworkError;
use crate::traits::{IdentityProvider, ProviderError, RefreshResponse, ValidateResponse};

/// OAuth error codes that mean the refresh token will never work again.
const REJECTING_OAUTH_ERRORS: &[&str] = &["invalid_grant", "invalid_token", "unauthorized_client"];

/// Identity provider backed by the HTTP session API.
#[derive(Debug, Clone)]
pub struct CentralIdentityProvider {
    client: CentralApiClient,
}

impl CentralIdentityProvider {
    pub fn new(client: CentralApiClient) -> Self {
        Self { client }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::new(CentralApiClient::with_base_url(base_url.into()))
    }

    pub fn client(&self) -> &CentralApiClient {
        &self.client
    }
}

fn transport_error(err: CentralApiError, timeout: Duration) -> ProviderError {
    match err {
        CentralApiError::Network(NetworkError::Timeout { .. }) => ProviderError::Timeout(timeout),
        CentralApiError::Network(e) => ProviderError::Unreachable(e.to_string()),
        CentralApiError::InvalidResponse(msg) => ProviderError::InvalidResponse(msg),
        CentralApiError::ServerError { status, message } => ProviderError::Unreachable(format!(
            "HTTP {}: {}",
            status,
            truncate_body(&message, 200)
        )),
    }
}

fn rejection_reason(status: u16, body: &str) -> String {
    error_reason(body).unwrap_or_else(|| format!("HTTP {}", status))
}

fn is_rejecting_body(body: &str) -> bool {
    error_reason(body)
        .map(|reason| {
            REJECTING_OAUTH_ERRORS
                .iter()
                .any(|code| reason == *code || reason.starts_with(&format!("{}:", code)))
        })
        .unwrap_or(false)
}

#[async_trait]
impl IdentityProvider for CentralIdentityProvider {
    async fn validate(
        &self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<ValidateResponse, ProviderError> {
        let Some(access_token) = credentials.access_token.as_deref() else {
            return Ok(ValidateResponse::invalid("no access token"));
        };

        match self.client.validate_session(access_token, timeout).await {
            Ok(session) => {
                let mut user = SessionUser::new(session.user_id);
                user.username = session.username;
                Ok(ValidateResponse::valid(user))
            }
            Err(CentralApiError::ServerError { status, message })
                if status == 401 || status == 403 =>
            {
                debug!("Provider refused access token ({})", status);
                Ok(ValidateResponse::invalid(rejection_reason(status, &message)))
            }
            Err(e) => Err(transport_error(e, timeout)),
        }
    }

    async fn refresh(
        &self,
        refresh_token: &str,
        timeout: Duration,
    ) -> Result<RefreshResponse, ProviderError> {
        match self.client.refresh_token(refresh_token, timeout).await {
            Ok(token) => {
                let expires_in = token
                    .expires_in
                    .or_else(|| get_jwt_expires_in(&token.access_token));
                let credentials = Credentials {
                    access_token: Some(token.access_token),
                    // Providers that don't rotate keep the old refresh token valid
                    refresh_token: Some(
                        token
                            .refresh_token
                            .unwrap_or_else(|| refresh_token.to_string()),
                    ),
                    expires_at: expires_in
                        .map(|secs| chrono::Utc::now().timestamp() + i64::from(secs)),
                    user_id: token.user_id.clone(),
                };

                let mut response = RefreshResponse::refreshed(credentials);
                if let Some(id) = token.user_id {
                    let mut user = SessionUser::new(id);
                    user.username = token.username;
                    response = response.with_user(user);
                }
                Ok(response)
            }
            Err(CentralApiError::ServerError { status, message })
                if status == 401
                    || status == 403
                    || (status == 400 && is_rejecting_body(&message)) =>
            {
                debug!("Provider rejected refresh token ({})", status);
                Ok(RefreshResponse::rejected(rejection_reason(status, &message)))
            }
            Err(e) => Err(transport_error(e, timeout)),
        }
    }
}
