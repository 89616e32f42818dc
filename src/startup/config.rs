//! Session configuration.
//!
//! Defaults suit an interactive client. Every field can be set with a
//! builder method, and the common ones can be overridden from the
//! environment with [`SessionConfig::from_env`].

use std::path::PathBuf;
use std::time::Duration;

use crate::activation::DEFAULT_DEBOUNCE_WINDOW;
use crate::auth::central_api::DEFAULT_PROVIDER_URL;
use crate::auth::CredentialsManager;
use crate::session::{
    SessionStateStore, DEFAULT_MIN_CHECK_INTERVAL, DEFAULT_PROACTIVE_REFRESH_THRESHOLD,
    DEFAULT_REFRESH_TIMEOUT, DEFAULT_VALIDATE_TIMEOUT,
};

/// Identity provider base URL.
pub const ENV_PROVIDER_URL: &str = "SESSIONKEEPER_PROVIDER_URL";
/// Path of the persisted credentials file.
pub const ENV_CREDENTIALS: &str = "SESSIONKEEPER_CREDENTIALS";
/// Rate-limit window in milliseconds.
pub const ENV_MIN_INTERVAL_MS: &str = "SESSIONKEEPER_MIN_INTERVAL_MS";

/// Configuration for the session subsystem.
///
/// # Example
///
/// ```ignore
/// use sessionkeeper::startup::SessionConfig;
///
/// let config = SessionConfig::default()
///     .with_provider_url("https://id.example.com")
///     .with_probe_refresh_on_sweep(true);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub provider_url: String,
    /// `None` means the default location under the home directory.
    pub credentials_path: Option<PathBuf>,
    pub min_check_interval: Duration,
    pub validate_timeout: Duration,
    pub refresh_timeout: Duration,
    pub proactive_refresh_threshold: Duration,
    pub unreachable_alert_threshold: u32,
    /// Ask the provider about the refresh token during sweeps
    pub probe_refresh_on_sweep: bool,
    pub debounce_window: Duration,
    /// Watch the credentials file for changes made by other processes
    pub watch_credentials_file: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            credentials_path: None,
            min_check_interval: DEFAULT_MIN_CHECK_INTERVAL,
            validate_timeout: DEFAULT_VALIDATE_TIMEOUT,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            proactive_refresh_threshold: DEFAULT_PROACTIVE_REFRESH_THRESHOLD,
            unreachable_alert_threshold: SessionStateStore::DEFAULT_UNREACHABLE_THRESHOLD,
            probe_refresh_on_sweep: false,
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            watch_credentials_file: true,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider_url(mut self, url: impl Into<String>) -> Self {
        self.provider_url = url.into();
        self
    }

    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    pub fn with_min_check_interval(mut self, interval: Duration) -> Self {
        self.min_check_interval = interval;
        self
    }

    pub fn with_validate_timeout(mut self, timeout: Duration) -> Self {
        self.validate_timeout = timeout;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_proactive_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.proactive_refresh_threshold = threshold;
        self
    }

    pub fn with_unreachable_alert_threshold(mut self, threshold: u32) -> Self {
        self.unreachable_alert_threshold = threshold;
        self
    }

    pub fn with_probe_refresh_on_sweep(mut self, probe: bool) -> Self {
        self.probe_refresh_on_sweep = probe;
        self
    }

    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    pub fn with_watch_credentials_file(mut self, watch: bool) -> Self {
        self.watch_credentials_file = watch;
        self
    }

    /// Defaults overridden by `SESSIONKEEPER_*` environment variables.
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(ENV_PROVIDER_URL) {
            if !url.trim().is_empty() {
                config.provider_url = url.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var(ENV_CREDENTIALS) {
            if !path.trim().is_empty() {
                config.credentials_path = Some(PathBuf::from(path.trim()));
            }
        }
        if let Ok(ms) = std::env::var(ENV_MIN_INTERVAL_MS) {
            match ms.trim().parse::<u64>() {
                Ok(ms) => config.min_check_interval = Duration::from_millis(ms),
                Err(_) => tracing::warn!("Ignoring invalid {}={:?}", ENV_MIN_INTERVAL_MS, ms),
            }
        }

        config
    }

    /// The configured credentials path, or the default one.
    ///
    /// `None` only if no path was configured and there is no home directory.
    pub fn resolved_credentials_path(&self) -> Option<PathBuf> {
        self.credentials_path.clone().or_else(|| {
            CredentialsManager::new().map(|manager| manager.credentials_path().to_path_buf())
        })
    }
}
