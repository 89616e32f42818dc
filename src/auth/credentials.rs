//! Credentials storage and management.
//!
//! This module provides the persisted credential blob and the file-backed
//! manager that reads, writes and deletes it at
//! `~/.sessionkeeper/.credentials.json`.
//!
//! Writes go to a temporary file in the same directory which is then renamed
//! over the target, so readers only ever see a complete blob.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::traits::CredentialsError;

/// The credentials directory name.
const CREDENTIALS_DIR: &str = ".sessionkeeper";

/// The credentials file name.
const CREDENTIALS_FILE: &str = ".credentials.json";

/// Authentication credentials issued by the identity provider.
///
/// A blob with an access token but no refresh token is structurally
/// invalid and is never used to authenticate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Access token presented to the provider.
    pub access_token: Option<String>,
    /// Refresh token for obtaining new access tokens.
    pub refresh_token: Option<String>,
    /// Access token expiration as Unix timestamp (seconds since epoch).
    pub expires_at: Option<i64>,
    /// The authenticated user's ID.
    pub user_id: Option<String>,
}

impl Credentials {
    /// Create new empty credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for a complete token pair.
    pub fn with_tokens(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
            ..Default::default()
        }
    }

    /// Set the expiration timestamp.
    pub fn expiring_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the user ID.
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Check if the credentials have an access token.
    pub fn has_token(&self) -> bool {
        self.access_token.is_some()
    }

    /// Check if the credentials have a refresh token.
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// True when neither token is present.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }

    /// An access token without a refresh token can never be renewed and
    /// must be purged.
    pub fn is_structurally_valid(&self) -> bool {
        !(self.has_token() && !self.has_refresh_token())
    }

    /// Check if the token is known to be expired.
    ///
    /// Credentials without an expiration are not considered expired; the
    /// provider is the authority for those.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => chrono::Utc::now().timestamp() >= expires_at,
            None => false,
        }
    }

    /// Check if the token expires within `secs` seconds from now.
    pub fn expires_within(&self, secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                expires_at.saturating_sub(chrono::Utc::now().timestamp()) < secs
            }
            None => false,
        }
    }
}

/// The user a session belongs to, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

impl SessionUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Manages credential storage and retrieval on disk.
#[derive(Debug, Clone)]
pub struct CredentialsManager {
    /// Path to the credentials file.
    credentials_path: PathBuf,
}

impl CredentialsManager {
    /// Create a new CredentialsManager rooted in the home directory.
    ///
    /// Returns `None` if the home directory cannot be determined.
    pub fn new() -> Option<Self> {
        let home = dirs::home_dir()?;
        Some(Self {
            credentials_path: home.join(CREDENTIALS_DIR).join(CREDENTIALS_FILE),
        })
    }

    /// Create a manager for an explicit credentials file path.
    pub fn with_path(credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
        }
    }

    /// Get the path to the credentials file.
    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    /// Load credentials from the credentials file.
    ///
    /// A missing file is `Ok(None)`. A file that cannot be parsed is
    /// reported as [`CredentialsError::Serialization`] so callers can purge it.
    pub fn load(&self) -> Result<Option<Credentials>, CredentialsError> {
        let file = match File::open(&self.credentials_path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CredentialsError::Io(e.to_string())),
        };

        let creds: Credentials = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| CredentialsError::Serialization(e.to_string()))?;

        if creds.is_empty() && creds.user_id.is_none() {
            return Ok(None);
        }
        Ok(Some(creds))
    }

    /// Save credentials atomically.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self, credentials: &Credentials) -> Result<(), CredentialsError> {
        let parent = self
            .credentials_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| CredentialsError::SaveFailed(e.to_string()))?;

        let mut tmp =
            NamedTempFile::new_in(parent).map_err(|e| CredentialsError::SaveFailed(e.to_string()))?;
        serde_json::to_writer_pretty(&mut tmp, credentials)
            .map_err(|e| CredentialsError::Serialization(e.to_string()))?;
        tmp.flush()
            .map_err(|e| CredentialsError::SaveFailed(e.to_string()))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| CredentialsError::SaveFailed(e.to_string()))?;
        tmp.persist(&self.credentials_path)
            .map_err(|e| CredentialsError::SaveFailed(e.error.to_string()))?;
        Ok(())
    }

    /// Remove the credentials file. A missing file is not an error.
    pub fn clear(&self) -> Result<(), CredentialsError> {
        match fs::remove_file(&self.credentials_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CredentialsError::ClearFailed(e.to_string())),
        }
    }
}
