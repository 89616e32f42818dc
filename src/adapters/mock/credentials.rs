//! In-memory credentials provider for testing.
//!
//! Stores credentials in memory and counts every operation, so tests can
//! assert exactly how often the persisted blob was read, replaced or deleted.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::auth::credentials::Credentials;
use crate::traits::{CredentialsError, CredentialsProvider};

#[derive(Debug, Default)]
struct Counters {
    loads: AtomicUsize,
    saves: AtomicUsize,
    clears: AtomicUsize,
}

/// In-memory credentials provider for testing.
///
/// Clones share the same storage.
///
/// # Example
///
/// ```ignore
/// let provider = InMemoryCredentials::with_credentials(Credentials::with_tokens("a1", "r1"));
/// provider.clear().await?;
/// assert!(provider.load().await?.is_none());
/// assert_eq!(provider.clear_count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentials {
    /// Stored credentials
    credentials: Arc<Mutex<Option<Credentials>>>,
    /// Error returned by the next loads, if set
    load_error: Arc<Mutex<Option<CredentialsError>>>,
    /// Whether save should fail
    save_should_fail: Arc<Mutex<bool>>,
    /// Whether clear should fail
    clear_should_fail: Arc<Mutex<bool>>,
    counters: Arc<Counters>,
}

impl InMemoryCredentials {
    /// Create a new, empty in-memory credentials provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider with initial credentials.
    pub fn with_credentials(creds: Credentials) -> Self {
        let provider = Self::new();
        provider.set_credentials(Some(creds));
        provider
    }

    /// Make every load fail with `error` until reset with `None`.
    ///
    /// `CredentialsError::Serialization` simulates a corrupt blob.
    pub fn set_load_error(&self, error: Option<CredentialsError>) {
        *self.load_error.lock().unwrap() = error;
    }

    /// Configure whether save should fail.
    pub fn set_save_should_fail(&self, should_fail: bool) {
        *self.save_should_fail.lock().unwrap() = should_fail;
    }

    /// Configure whether clear should fail.
    pub fn set_clear_should_fail(&self, should_fail: bool) {
        *self.clear_should_fail.lock().unwrap() = should_fail;
    }

    /// Get the current credentials synchronously.
    pub fn get_credentials(&self) -> Option<Credentials> {
        self.credentials.lock().unwrap().clone()
    }

    /// Set credentials synchronously (simulates another process writing).
    pub fn set_credentials(&self, creds: Option<Credentials>) {
        *self.credentials.lock().unwrap() = creds;
    }

    pub fn load_count(&self) -> usize {
        self.counters.loads.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.counters.saves.load(Ordering::SeqCst)
    }

    /// Number of clears that removed an existing blob.
    pub fn clear_count(&self) -> usize {
        self.counters.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialsProvider for InMemoryCredentials {
    async fn load(&self) -> Result<Option<Credentials>, CredentialsError> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.load_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.credentials.lock().unwrap().clone())
    }

    async fn save(&self, creds: &Credentials) -> Result<(), CredentialsError> {
        if *self.save_should_fail.lock().unwrap() {
            return Err(CredentialsError::SaveFailed("Mock save failure".to_string()));
        }
        self.counters.saves.fetch_add(1, Ordering::SeqCst);
        *self.credentials.lock().unwrap() = Some(creds.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CredentialsError> {
        if *self.clear_should_fail.lock().unwrap() {
            return Err(CredentialsError::ClearFailed("Mock clear failure".to_string()));
        }
        // A corrupt blob counts as stored even though it can't be loaded
        let had_blob = self.credentials.lock().unwrap().take().is_some()
            || self.load_error.lock().unwrap().take().is_some();
        if had_blob {
            self.counters.clears.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
