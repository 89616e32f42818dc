//! File-based credentials provider adapter.
//!
//! Wraps [`CredentialsManager`] and runs its blocking file I/O on tokio's
//! blocking pool.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::auth::credentials::{Credentials, CredentialsManager};
use crate::traits::{CredentialsError, CredentialsProvider};

/// File-based credentials provider.
///
/// Credentials are stored in `~/.sessionkeeper/.credentials.json` unless a
/// path is given explicitly.
#[derive(Debug, Clone)]
pub struct FileCredentialsProvider {
    manager: CredentialsManager,
}

impl FileCredentialsProvider {
    /// Create a provider for the default location in the home directory.
    pub fn new() -> Result<Self, CredentialsError> {
        CredentialsManager::new()
            .map(|manager| Self { manager })
            .ok_or_else(|| {
                CredentialsError::Other("Failed to determine home directory".to_string())
            })
    }

    /// Create a provider for an explicit file path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            manager: CredentialsManager::with_path(path),
        }
    }

    /// Get the path to the credentials file.
    pub fn credentials_path(&self) -> &Path {
        self.manager.credentials_path()
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, CredentialsError>
    where
        T: Send + 'static,
        F: FnOnce(CredentialsManager) -> Result<T, CredentialsError> + Send + 'static,
    {
        let manager = self.manager.clone();
        tokio::task::spawn_blocking(move || op(manager))
            .await
            .map_err(|e| CredentialsError::Other(format!("credentials task failed: {}", e)))?
    }
}

#[async_trait]
impl CredentialsProvider for FileCredentialsProvider {
    async fn load(&self) -> Result<Option<Credentials>, CredentialsError> {
        self.blocking(|manager| manager.load()).await
    }

    async fn save(&self, creds: &Credentials) -> Result<(), CredentialsError> {
        let creds = creds.clone();
        self.blocking(move |manager| manager.save(&creds)).await
    }

    async fn clear(&self) -> Result<(), CredentialsError> {
        self.blocking(|manager| manager.clear()).await
    }
}
