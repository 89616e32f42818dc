//! Startup orchestration.
//!
//! Builds the coordinator from a [`SessionConfig`], sweeps the persisted
//! credentials, runs the first recovery and starts the background pieces
//! (activation loop, session-loss sweeps, credentials file watcher).

use std::path::PathBuf;
use std::sync::Arc;

use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::config::SessionConfig;
use crate::activation::{spawn_activation_loop, spawn_file_watcher, ActivationLoop};
use crate::adapters::{CentralIdentityProvider, FileCredentialsProvider};
use crate::session::{ActivationEvent, RecoveryCoordinator, RecoveryOutcome, SweepOutcome};
use crate::traits::{CredentialsProvider, IdentityProvider};

/// Error type for startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("no credentials path configured and no home directory found")]
    NoCredentialsPath,
}

/// Everything running after a successful start.
pub struct SessionRuntime {
    pub coordinator: RecoveryCoordinator,
    pub activation: ActivationLoop,
    /// Kept alive for as long as the file should be watched
    pub watcher: Option<RecommendedWatcher>,
    pub session_watch: JoinHandle<()>,
    pub startup_sweep: SweepOutcome,
    pub startup_outcome: RecoveryOutcome,
}

impl SessionRuntime {
    /// Stop the background tasks and the watcher.
    pub fn shutdown(self) {
        drop(self.watcher);
        self.session_watch.abort();
        self.activation.handle.abort();
    }
}

/// Build a coordinator with every knob taken from `config`.
pub fn build_coordinator(
    config: &SessionConfig,
    credentials: Arc<dyn CredentialsProvider>,
    provider: Arc<dyn IdentityProvider>,
) -> RecoveryCoordinator {
    RecoveryCoordinator::builder(credentials, provider)
        .min_check_interval(config.min_check_interval)
        .validate_timeout(config.validate_timeout)
        .refresh_timeout(config.refresh_timeout)
        .proactive_refresh_threshold(config.proactive_refresh_threshold)
        .unreachable_alert_threshold(config.unreachable_alert_threshold)
        .probe_refresh_on_sweep(config.probe_refresh_on_sweep)
        .build()
}

/// Start against the credentials file and the HTTP identity provider.
pub async fn start(config: &SessionConfig) -> Result<SessionRuntime, StartupError> {
    let path = config
        .resolved_credentials_path()
        .ok_or(StartupError::NoCredentialsPath)?;
    tracing::debug!("Using credentials at {}", path.display());

    let credentials = Arc::new(FileCredentialsProvider::with_path(&path));
    let provider = Arc::new(CentralIdentityProvider::with_base_url(
        config.provider_url.clone(),
    ));
    Ok(start_with(config, credentials, provider, Some(path)).await)
}

/// Start with injected collaborators. `watch_path` enables the file watcher
/// when `config.watch_credentials_file` is set.
pub async fn start_with(
    config: &SessionConfig,
    credentials: Arc<dyn CredentialsProvider>,
    provider: Arc<dyn IdentityProvider>,
    watch_path: Option<PathBuf>,
) -> SessionRuntime {
    let coordinator = build_coordinator(config, credentials, provider);

    let startup_sweep = coordinator.sanitizer().sweep().await;
    let session_watch = coordinator.sanitizer().watch_session_loss();
    let startup_outcome = coordinator
        .handle_activation(ActivationEvent::ManualTrigger)
        .await;
    tracing::info!("Startup check: {}", startup_outcome);

    let activation = spawn_activation_loop(coordinator.clone(), config.debounce_window);

    let watcher = match watch_path {
        Some(path) if config.watch_credentials_file => {
            match spawn_file_watcher(&path, activation.source.clone()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    // Activation events still work without it
                    tracing::warn!("Could not watch {}: {}", path.display(), e);
                    None
                }
            }
        }
        _ => None,
    };

    SessionRuntime {
        coordinator,
        activation,
        watcher,
        session_watch,
        startup_sweep,
        startup_outcome,
    }
}
