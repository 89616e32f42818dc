//! Credentials provider trait abstraction.
//!
//! Both the recovery coordinator and the credential sanitizer read and clear
//! the persisted blob through this trait. "Nothing stored" is `Ok(None)`,
//! never an error.

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::Credentials;

/// Credentials operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialsError {
    /// Failed to save credentials
    #[error("Failed to save credentials: {0}")]
    SaveFailed(String),
    /// Failed to clear credentials
    #[error("Failed to clear credentials: {0}")]
    ClearFailed(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(String),
    /// The stored blob could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Other error
    #[error("Credentials error: {0}")]
    Other(String),
}

/// Trait for credentials storage and retrieval.
///
/// Implementations must write the whole blob at once: a reader never sees a
/// half-written record, and the last writer wins.
///
/// # Example
///
/// ```ignore
/// use sessionkeeper::traits::CredentialsProvider;
///
/// async fn signed_in<P: CredentialsProvider>(provider: &P) -> bool {
///     matches!(provider.load().await, Ok(Some(creds)) if creds.is_structurally_valid())
/// }
/// ```
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    /// Load credentials from storage.
    ///
    /// # Returns
    /// - `Ok(Some(credentials))` if credentials exist and were loaded successfully
    /// - `Ok(None)` if no credentials are stored
    /// - `Err(CredentialsError::Serialization(_))` if the stored blob is unreadable
    async fn load(&self) -> Result<Option<Credentials>, CredentialsError>;

    /// Replace the stored credentials.
    async fn save(&self, creds: &Credentials) -> Result<(), CredentialsError>;

    /// Delete the stored credentials. Succeeds if nothing was stored.
    async fn clear(&self) -> Result<(), CredentialsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_error_display() {
        assert_eq!(
            CredentialsError::ClearFailed("delete error".to_string()).to_string(),
            "Failed to clear credentials: delete error"
        );
        assert_eq!(
            CredentialsError::Serialization("invalid json".to_string()).to_string(),
            "Serialization error: invalid json"
        );
    }

    #[test]
    fn test_credentials_error_implements_error_trait() {
        let err = CredentialsError::Other("x".to_string());
        let _: &dyn std::error::Error = &err;
    }
}
