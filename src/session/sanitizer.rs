//! Credential sanitizer.
//!
//! Inspects the persisted credential blob outside the recovery flow and
//! purges it when it can never authenticate: an unreadable blob, an access
//! token without a refresh token, or (when probing is enabled) a refresh
//! token the provider permanently rejects.
//!
//! The sanitizer and the recovery coordinator share one gate, so a sweep never
//! interleaves with a recovery attempt. The `*_locked` helpers assume the
//! caller already holds it.

use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::Credentials;
use crate::error::SessionError;
use crate::traits::{CredentialsError, CredentialsProvider};

use super::refresher::{RefreshOutcome, Refresher};
use super::state::{SessionState, SessionStateStore};

/// Serializes sweeps with recovery attempts.
pub type SessionGate = Arc<AsyncMutex<()>>;

/// What a sweep found and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    NoCredentials,
    Kept,
    PurgedStructurallyInvalid,
    /// The provider rejected the refresh token; the blob was deleted and the
    /// session marked invalid.
    PurgedRejected(String),
    /// The store could not be read or cleared. Nothing was changed.
    StoreUnavailable(String),
}

impl SweepOutcome {
    pub fn purged(&self) -> bool {
        matches!(
            self,
            SweepOutcome::PurgedStructurallyInvalid | SweepOutcome::PurgedRejected(_)
        )
    }
}

#[derive(Clone)]
pub struct CredentialSanitizer {
    credentials: Arc<dyn CredentialsProvider>,
    store: Arc<SessionStateStore>,
    probe: Option<Refresher>,
    gate: SessionGate,
}

impl std::fmt::Debug for CredentialSanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSanitizer")
            .field("probe", &self.probe.is_some())
            .finish_non_exhaustive()
    }
}

impl CredentialSanitizer {
    pub fn new(credentials: Arc<dyn CredentialsProvider>, store: Arc<SessionStateStore>) -> Self {
        Self {
            credentials,
            store,
            probe: None,
            gate: SessionGate::default(),
        }
    }

    /// Also ask the provider about the refresh token on each sweep.
    pub fn with_probe(mut self, refresher: Refresher) -> Self {
        self.probe = Some(refresher);
        self
    }

    pub(crate) fn with_gate(mut self, gate: SessionGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn probes(&self) -> bool {
        self.probe.is_some()
    }

    pub async fn sweep(&self) -> SweepOutcome {
        self.sweep_with(self.probe.as_ref()).await
    }

    /// Structural checks only, never contacting the provider. Used when the
    /// blob changed on disk, which includes our own writes.
    pub async fn sweep_local(&self) -> SweepOutcome {
        self.sweep_with(None).await
    }

    async fn sweep_with(&self, probe: Option<&Refresher>) -> SweepOutcome {
        let _gate = self.gate.lock().await;
        let outcome = self.sweep_locked(probe).await;
        match &outcome {
            SweepOutcome::NoCredentials | SweepOutcome::Kept => {
                debug!("Credential sweep: {:?}", outcome)
            }
            _ => info!("Credential sweep: {:?}", outcome),
        }
        outcome
    }

    async fn sweep_locked(&self, probe: Option<&Refresher>) -> SweepOutcome {
        let credentials = match self.credentials.load().await {
            Ok(Some(credentials)) if !credentials.is_empty() => credentials,
            Ok(_) => return SweepOutcome::NoCredentials,
            Err(CredentialsError::Serialization(msg)) => {
                warn!("Stored credentials are unreadable: {}", msg);
                return self.purge_structural().await;
            }
            Err(e) => return SweepOutcome::StoreUnavailable(e.to_string()),
        };

        if !credentials.is_structurally_valid() {
            warn!("Stored credentials have an access token but no refresh token");
            return self.purge_structural().await;
        }

        let Some(refresher) = probe else {
            return SweepOutcome::Kept;
        };
        match refresher.refresh(&credentials).await {
            RefreshOutcome::Refreshed {
                credentials: fresh,
                user,
            } => {
                // The old refresh token may be single-use; keep the rotated pair
                if let Err(e) = self.credentials.save(&fresh).await {
                    warn!("Could not persist rotated credentials: {}", e);
                } else if let SessionState::Valid { user: current, .. } = self.store.get() {
                    if current.id == user.id {
                        self.store.set(SessionState::Valid {
                            user: current,
                            credentials: fresh,
                        });
                    }
                }
                self.store.reset_unreachable();
                SweepOutcome::Kept
            }
            RefreshOutcome::Rejected(reason) => {
                self.store.reset_unreachable();
                self.invalidate_rejected_locked(&credentials, &reason).await;
                SweepOutcome::PurgedRejected(reason)
            }
            RefreshOutcome::Unreachable(reason) => {
                debug!("Sweep probe got no answer, keeping credentials: {}", reason);
                SweepOutcome::Kept
            }
        }
    }

    async fn purge_structural(&self) -> SweepOutcome {
        match self.purge_structural_locked().await {
            Ok(()) => SweepOutcome::PurgedStructurallyInvalid,
            Err(e) => SweepOutcome::StoreUnavailable(e.to_string()),
        }
    }

    /// Delete an unusable blob and end a session that relied on it.
    pub(crate) async fn purge_structural_locked(&self) -> Result<(), CredentialsError> {
        if let Err(e) = self.credentials.clear().await {
            warn!("Failed to purge unusable credentials: {}", e);
            return Err(e);
        }
        self.store
            .set_last_error(Some(SessionError::CredentialStructurallyInvalid));
        if self.store.get().is_valid() {
            self.store.set(SessionState::Invalid {
                reason: "stored credentials are structurally invalid".to_string(),
            });
        }
        Ok(())
    }

    /// Apply a permanent refresh rejection for `attempted`.
    ///
    /// Idempotent: the blob is deleted only if it still holds `attempted`,
    /// and the state is written only if it is not already `Invalid`. Returns
    /// whether anything changed.
    pub(crate) async fn invalidate_rejected_locked(
        &self,
        attempted: &Credentials,
        reason: &str,
    ) -> bool {
        let mut changed = false;
        match self.credentials.load().await {
            Ok(Some(current)) if current == *attempted => match self.credentials.clear().await {
                Ok(()) => {
                    info!("Deleted credentials after rejected refresh");
                    changed = true;
                }
                Err(e) => warn!("Failed to delete rejected credentials: {}", e),
            },
            Ok(Some(_)) => {
                // Someone signed in again while the refresh was out
                debug!("Credentials replaced since the rejected attempt, leaving them");
                return false;
            }
            Ok(None) => {}
            Err(CredentialsError::Serialization(_)) => {
                if self.credentials.clear().await.is_ok() {
                    changed = true;
                }
            }
            Err(e) => warn!("Could not re-read credentials before purge: {}", e),
        }

        if !matches!(self.store.get(), SessionState::Invalid { .. }) {
            self.store.set(SessionState::Invalid {
                reason: reason.to_string(),
            });
            changed = true;
        }
        self.store.set_last_error(Some(SessionError::ProviderRejected {
            reason: reason.to_string(),
        }));
        changed
    }

    /// Sweep every time the session goes from valid to no-session.
    ///
    /// Abort the returned handle on shutdown.
    pub fn watch_session_loss(&self) -> JoinHandle<()> {
        let sanitizer = self.clone();
        let mut rx = self.store.watch();
        tokio::spawn(async move {
            let mut was_valid = rx.borrow_and_update().is_valid();
            while rx.changed().await.is_ok() {
                let is_valid = rx.borrow_and_update().is_valid();
                if was_valid && !is_valid {
                    debug!("Session lost, sweeping stored credentials");
                    sanitizer.sweep().await;
                }
                was_valid = is_valid;
            }
            debug!("Session watch stopped");
        })
    }
}
