//! HTTP client for the identity provider's session endpoints.
//!
//! Only two calls are needed by the session subsystem:
//! - `GET /auth/session` to check whether an access token is still accepted
//! - `POST /auth/refresh` to exchange a refresh token for a new pair

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{classify_reqwest_error, NetworkError};

/// Default URL for the identity provider.
pub const DEFAULT_PROVIDER_URL: &str = "http://localhost:8080";

/// Error type for identity provider client operations.
#[derive(Debug)]
pub enum CentralApiError {
    /// Transport failure (connect, timeout, TLS, ...)
    Network(NetworkError),
    /// Server answered with a non-success status
    ServerError { status: u16, message: String },
    /// Body could not be parsed
    InvalidResponse(String),
}

impl CentralApiError {
    /// HTTP status, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            CentralApiError::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for CentralApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CentralApiError::Network(e) => write!(f, "Network error: {}", e),
            CentralApiError::ServerError { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
            CentralApiError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
        }
    }
}

impl std::error::Error for CentralApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CentralApiError::Network(e) => Some(e),
            _ => None,
        }
    }
}

/// Response from the token refresh endpoint (POST /auth/refresh).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u32>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Response from the session endpoint (GET /auth/session).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// OAuth2-style error body: `{"error": "...", "error_description": "..."}`.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Extract a provider-supplied reason from an error body, if it has one.
pub fn error_reason(body: &str) -> Option<String> {
    let parsed: OAuthErrorBody = serde_json::from_str(body).ok()?;
    Some(match parsed.error_description {
        Some(desc) => format!("{}: {}", parsed.error, desc),
        None => parsed.error,
    })
}

/// At most `max` characters of a response body, for error messages.
pub fn truncate_body(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// JWT claims for extracting expiration time.
#[derive(Deserialize)]
struct JwtClaims {
    exp: i64,
}

/// Extract the expiration time from a JWT access token.
///
/// Returns the number of seconds until the token expires, or None if the token
/// cannot be parsed.
pub fn get_jwt_expires_in(access_token: &str) -> Option<u32> {
    let parts: Vec<&str> = access_token.split('.').collect();
    let payload = URL_SAFE_NO_PAD.decode(parts.get(1)?).ok()?;
    let claims: JwtClaims = serde_json::from_slice(&payload).ok()?;
    let now = chrono::Utc::now().timestamp();
    let remaining = claims.exp.saturating_sub(now).max(0);
    Some(u32::try_from(remaining).unwrap_or(u32::MAX))
}

/// Client for the identity provider.
#[derive(Debug, Clone)]
pub struct CentralApiClient {
    /// Base URL for the provider
    pub base_url: String,
    /// Reusable HTTP client
    client: Client,
}

impl CentralApiClient {
    /// Create a new client with the default base URL.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_PROVIDER_URL.to_string())
    }

    /// Create a new client with a custom base URL.
    pub fn with_base_url(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Check whether an access token is still accepted.
    ///
    /// GET /auth/session
    pub async fn validate_session(
        &self,
        access_token: &str,
        timeout: Duration,
    ) -> Result<SessionResponse, CentralApiError> {
        let url = format!("{}/auth/session", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| CentralApiError::Network(classify_reqwest_error(&e, &url)))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| CentralApiError::Network(classify_reqwest_error(&e, &url)))?;

        if !(200..300).contains(&status) {
            return Err(CentralApiError::ServerError {
                status,
                message: text,
            });
        }

        serde_json::from_str::<SessionResponse>(&text).map_err(|e| {
            CentralApiError::InvalidResponse(format!(
                "{}. Response: {}",
                e,
                truncate_body(&text, 200)
            ))
        })
    }

    /// Refresh an access token using a refresh token.
    ///
    /// POST /auth/refresh
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        timeout: Duration,
    ) -> Result<TokenResponse, CentralApiError> {
        let url = format!("{}/auth/refresh", self.base_url);

        let body = serde_json::json!({
            "refresh_token": refresh_token,
            "grant_type": "refresh_token",
        });

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| CentralApiError::Network(classify_reqwest_error(&e, &url)))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| CentralApiError::Network(classify_reqwest_error(&e, &url)))?;

        if !(200..300).contains(&status) {
            return Err(CentralApiError::ServerError {
                status,
                message: text,
            });
        }

        serde_json::from_str::<TokenResponse>(&text).map_err(|e| {
            CentralApiError::InvalidResponse(format!(
                "{}. Response: {}",
                e,
                truncate_body(&text, 200)
            ))
        })
    }
}

impl Default for CentralApiClient {
    fn default() -> Self {
        Self::new()
    }
}
