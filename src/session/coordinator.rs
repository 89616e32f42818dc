//! Recovery coordinator.
//!
//! Turns activation events into at most one validate-then-refresh sequence at
//! a time and reports a [`RecoveryOutcome`] to every caller.
//!
//! # Concurrency contract
//!
//! - The first caller while nothing is in flight runs the attempt itself.
//! - Callers arriving while an attempt is in flight are coalesced into a
//!   single follow-up attempt that starts as soon as the current one ends.
//!   They all wait for, and receive, the follow-up's outcome.
//! - The follow-up goes through the rate limit like any other attempt, so a
//!   burst that lands right after a successful check costs no extra network
//!   round trip.
//! - A follow-up queued behind a failed attempt that ended less than
//!   `min_check_interval` ago reuses that failure instead of calling the
//!   provider again, unless one of the merged events is a
//!   [`ActivationEvent::ManualTrigger`].
//! - The in-flight slot is released by a drop guard. Cancelling the caller's
//!   future or a panic inside the attempt cannot leave it held.
//!
//! Every attempt also holds the [`SessionGate`] shared with the credential
//! sanitizer, which serializes all writes to the state store and the
//! credential blob. Subscribers are notified after the gate is released.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{Credentials, SessionUser};
use crate::error::SessionError;
use crate::traits::{CredentialsError, CredentialsProvider, IdentityProvider};

use super::events::{ActivationEvent, FailureReason, RecoveryOutcome};
use super::refresher::{RefreshOutcome, Refresher, DEFAULT_REFRESH_TIMEOUT};
use super::registry::{CallbackRegistry, NotifyReport};
use super::sanitizer::{CredentialSanitizer, SessionGate};
use super::state::{SessionState, SessionStateStore};
use super::validator::{ValidationOutcome, Validator, DEFAULT_VALIDATE_TIMEOUT};

/// Minimum time between two checks when the last one concluded valid.
pub const DEFAULT_MIN_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// Refresh proactively when the access token expires within this window.
pub const DEFAULT_PROACTIVE_REFRESH_THRESHOLD: Duration = Duration::from_secs(300);

struct PendingAttempt {
    event: ActivationEvent,
    merged: usize,
    /// Some merged event asked for a check regardless of recent failures
    forced: bool,
    tx: watch::Sender<Option<RecoveryOutcome>>,
}

#[derive(Default)]
struct FlightState {
    in_flight: bool,
    pending: Option<PendingAttempt>,
    last_failure: Option<(Instant, RecoveryOutcome)>,
}

struct CoordinatorInner {
    store: Arc<SessionStateStore>,
    registry: Arc<CallbackRegistry>,
    credentials: Arc<dyn CredentialsProvider>,
    validator: Validator,
    refresher: Refresher,
    sanitizer: CredentialSanitizer,
    gate: SessionGate,
    flight: Mutex<FlightState>,
    /// Rotated credentials the store refused to persist. Authoritative over
    /// the stored blob until a save succeeds.
    unsaved: Mutex<Option<Credentials>>,
    min_check_interval: Duration,
    proactive_refresh_threshold: Duration,
}

/// Releases the in-flight slot, handing it to the pending follow-up if any.
struct FlightGuard {
    inner: Arc<CoordinatorInner>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let next = {
            let mut flight = self.inner.lock_flight();
            let next = flight.pending.take();
            if next.is_none() {
                flight.in_flight = false;
            }
            next
        };
        let Some(pending) = next else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = self.inner.clone();
                handle.spawn(inner.run_follow_up(pending));
            }
            Err(_) => {
                // Dropping the sender wakes the waiters with Interrupted
                warn!("No runtime to run the coalesced recovery attempt on");
                self.inner.lock_flight().in_flight = false;
            }
        }
    }
}

/// Builder for [`RecoveryCoordinator`].
pub struct CoordinatorBuilder {
    credentials: Arc<dyn CredentialsProvider>,
    provider: Arc<dyn IdentityProvider>,
    store: Option<Arc<SessionStateStore>>,
    registry: Option<Arc<CallbackRegistry>>,
    min_check_interval: Duration,
    validate_timeout: Duration,
    refresh_timeout: Duration,
    proactive_refresh_threshold: Duration,
    unreachable_alert_threshold: u32,
    probe_refresh_on_sweep: bool,
}

impl CoordinatorBuilder {
    pub fn store(mut self, store: Arc<SessionStateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(mut self, registry: Arc<CallbackRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn min_check_interval(mut self, interval: Duration) -> Self {
        self.min_check_interval = interval;
        self
    }

    pub fn validate_timeout(mut self, timeout: Duration) -> Self {
        self.validate_timeout = timeout;
        self
    }

    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn proactive_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.proactive_refresh_threshold = threshold;
        self
    }

    /// Ignored when an explicit store is supplied.
    pub fn unreachable_alert_threshold(mut self, threshold: u32) -> Self {
        self.unreachable_alert_threshold = threshold;
        self
    }

    pub fn probe_refresh_on_sweep(mut self, probe: bool) -> Self {
        self.probe_refresh_on_sweep = probe;
        self
    }

    pub fn build(self) -> RecoveryCoordinator {
        let store = self.store.unwrap_or_else(|| {
            Arc::new(SessionStateStore::with_unreachable_threshold(
                self.unreachable_alert_threshold,
            ))
        });
        let registry = self.registry.unwrap_or_default();
        let validator = Validator::new(self.provider.clone(), self.validate_timeout);
        let refresher = Refresher::new(self.provider, self.refresh_timeout);

        let gate = SessionGate::default();
        let mut sanitizer = CredentialSanitizer::new(self.credentials.clone(), store.clone())
            .with_gate(gate.clone());
        if self.probe_refresh_on_sweep {
            sanitizer = sanitizer.with_probe(refresher.clone());
        }

        RecoveryCoordinator {
            inner: Arc::new(CoordinatorInner {
                store,
                registry,
                credentials: self.credentials,
                validator,
                refresher,
                sanitizer,
                gate,
                flight: Mutex::new(FlightState::default()),
                unsaved: Mutex::new(None),
                min_check_interval: self.min_check_interval,
                proactive_refresh_threshold: self.proactive_refresh_threshold,
            }),
        }
    }
}

/// The recovery coordinator. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct RecoveryCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl std::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("in_flight", &self.is_in_flight())
            .field("min_check_interval", &self.inner.min_check_interval)
            .finish_non_exhaustive()
    }
}

impl RecoveryCoordinator {
    pub fn builder(
        credentials: Arc<dyn CredentialsProvider>,
        provider: Arc<dyn IdentityProvider>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            credentials,
            provider,
            store: None,
            registry: None,
            min_check_interval: DEFAULT_MIN_CHECK_INTERVAL,
            validate_timeout: DEFAULT_VALIDATE_TIMEOUT,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            proactive_refresh_threshold: DEFAULT_PROACTIVE_REFRESH_THRESHOLD,
            unreachable_alert_threshold: SessionStateStore::DEFAULT_UNREACHABLE_THRESHOLD,
            probe_refresh_on_sweep: false,
        }
    }

    pub fn store(&self) -> &Arc<SessionStateStore> {
        &self.inner.store
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.inner.registry
    }

    pub fn sanitizer(&self) -> &CredentialSanitizer {
        &self.inner.sanitizer
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.lock_flight().in_flight
    }

    /// Bring the session back in line with the provider after `event`.
    ///
    /// Never fails: provider and storage problems are reported through
    /// [`RecoveryOutcome::Failed`].
    pub async fn handle_activation(&self, event: ActivationEvent) -> RecoveryOutcome {
        let waiting = {
            let mut flight = self.inner.lock_flight();
            if flight.in_flight {
                let pending = flight.pending.get_or_insert_with(|| PendingAttempt {
                    event,
                    merged: 0,
                    forced: false,
                    tx: watch::channel(None).0,
                });
                pending.merged += 1;
                pending.forced |= event == ActivationEvent::ManualTrigger;
                Some(pending.tx.subscribe())
            } else {
                flight.in_flight = true;
                None
            }
        };

        match waiting {
            Some(rx) => {
                debug!("Recovery in flight, coalescing {} activation", event);
                wait_for_outcome(rx).await
            }
            None => {
                let _guard = FlightGuard {
                    inner: self.inner.clone(),
                };
                self.inner.guarded_attempt(event).await
            }
        }
    }

    /// Store freshly issued credentials and mark the session valid.
    ///
    /// Used after sign-in. Subscribers are notified as for a recovery.
    pub async fn establish(
        &self,
        mut credentials: Credentials,
        user: SessionUser,
    ) -> Result<RecoveryOutcome, SessionError> {
        if !credentials.has_token() || !credentials.is_structurally_valid() {
            return Err(SessionError::CredentialStructurallyInvalid);
        }
        if credentials.user_id.is_none() {
            credentials.user_id = Some(user.id.clone());
        }

        {
            let _gate = self.inner.gate.lock().await;
            self.inner.credentials.save(&credentials).await?;
            self.inner.set_unsaved(None);
            self.inner.lock_flight().last_failure = None;
            let store = &self.inner.store;
            store.reset_unreachable();
            store.set_last_error(None);
            store.set(SessionState::Valid { user, credentials });
            store.record_check(true);
        }
        info!("Session established");
        self.inner.notify_subscribers();
        Ok(RecoveryOutcome::Recovered)
    }

    /// Delete the stored credentials and forget the session.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let _gate = self.inner.gate.lock().await;
        self.inner.credentials.clear().await?;
        self.inner.set_unsaved(None);
        self.inner.lock_flight().last_failure = None;
        self.inner.store.reset();
        info!("Logged out");
        Ok(())
    }
}

async fn wait_for_outcome(mut rx: watch::Receiver<Option<RecoveryOutcome>>) -> RecoveryOutcome {
    loop {
        let current = rx.borrow_and_update().clone();
        if let Some(outcome) = current {
            return outcome;
        }
        if rx.changed().await.is_err() {
            return rx
                .borrow()
                .clone()
                .unwrap_or(RecoveryOutcome::Failed(FailureReason::Interrupted));
        }
    }
}

impl CoordinatorInner {
    fn lock_flight(&self) -> MutexGuard<'_, FlightState> {
        self.flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn unsaved(&self) -> Option<Credentials> {
        self.unsaved.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_unsaved(&self, credentials: Option<Credentials>) {
        *self.unsaved.lock().unwrap_or_else(|e| e.into_inner()) = credentials;
    }

    /// Persist freshly rotated credentials. On failure they are kept in
    /// memory so the next attempt never falls back to the spent pair on disk.
    async fn persist_rotated(&self, fresh: &Credentials) -> Result<(), CredentialsError> {
        match self.credentials.save(fresh).await {
            Ok(()) => {
                self.set_unsaved(None);
                Ok(())
            }
            Err(e) => {
                warn!("Could not persist refreshed credentials, keeping them in memory: {}", e);
                self.set_unsaved(Some(fresh.clone()));
                Err(e)
            }
        }
    }

    /// Outcome of a failed attempt that ended inside the rate-limit window.
    fn recent_failure(&self) -> Option<RecoveryOutcome> {
        let flight = self.lock_flight();
        let (at, outcome) = flight.last_failure.as_ref()?;
        (at.elapsed() < self.min_check_interval).then(|| outcome.clone())
    }

    async fn run_follow_up(self: Arc<Self>, pending: PendingAttempt) {
        let _guard = FlightGuard {
            inner: self.clone(),
        };
        if !pending.forced {
            if let Some(outcome) = self.recent_failure() {
                debug!(
                    "Attempt failed moments ago, sharing its outcome with {} coalesced activation(s)",
                    pending.merged
                );
                pending.tx.send_replace(Some(outcome));
                return;
            }
        }
        debug!(
            "Running coalesced recovery for {} activation(s), first: {}",
            pending.merged, pending.event
        );
        let outcome = self.guarded_attempt(pending.event).await;
        pending.tx.send_replace(Some(outcome));
    }

    async fn guarded_attempt(&self, event: ActivationEvent) -> RecoveryOutcome {
        let outcome = match AssertUnwindSafe(self.attempt(event)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Recovery attempt for {} panicked", event);
                RecoveryOutcome::Failed(FailureReason::Interrupted)
            }
        };
        self.lock_flight().last_failure = outcome
            .is_failure()
            .then(|| (Instant::now(), outcome.clone()));
        outcome
    }

    async fn attempt(&self, event: ActivationEvent) -> RecoveryOutcome {
        let attempt_id = Uuid::new_v4();
        let outcome = {
            let _gate = self.gate.lock().await;
            self.recover(event, attempt_id).await
        };

        match &outcome {
            RecoveryOutcome::Recovered => {
                info!("Session recovered ({}, attempt {})", event, attempt_id);
                self.notify_subscribers();
            }
            RecoveryOutcome::AlreadyValid => {
                debug!("Session already valid ({}, attempt {})", event, attempt_id)
            }
            RecoveryOutcome::Failed(reason) => {
                info!("Recovery failed: {} ({}, attempt {})", reason, event, attempt_id)
            }
        }
        outcome
    }

    fn notify_subscribers(&self) -> NotifyReport {
        let report = self.registry.notify_all();
        if !report.all_succeeded() {
            warn!(
                "{} of {} subscribers failed to refresh",
                report.failures.len(),
                report.failures.len() + report.notified
            );
        }
        report
    }

    fn recently_valid(&self) -> bool {
        let Some(check) = self.store.last_check() else {
            return false;
        };
        check.concluded_valid
            && check.at.elapsed() < self.min_check_interval
            && self.store.get().is_valid()
    }

    async fn recover(&self, event: ActivationEvent, attempt_id: Uuid) -> RecoveryOutcome {
        if self.recently_valid() {
            debug!("Skipping {} activation, checked moments ago", event);
            return RecoveryOutcome::AlreadyValid;
        }

        let loaded = match self.unsaved() {
            Some(unsaved) => match self.persist_rotated(&unsaved).await {
                Ok(()) => {
                    info!("Persisted credentials left over from an earlier failed save");
                    Ok(Some(unsaved))
                }
                Err(_) => Ok(Some(unsaved)),
            },
            None => self.credentials.load().await,
        };
        let credentials = match loaded {
            Ok(Some(credentials)) if !credentials.is_empty() => credentials,
            Ok(_) => return self.no_credentials(),
            Err(CredentialsError::Serialization(msg)) => {
                warn!("Stored credentials are unreadable: {}", msg);
                return self.purge_unusable().await;
            }
            Err(e) => {
                warn!("Could not read stored credentials: {}", e);
                let message = e.to_string();
                self.store.set_last_error(Some(SessionError::CredentialsStore {
                    message: message.clone(),
                }));
                return RecoveryOutcome::Failed(FailureReason::Storage(message));
            }
        };
        if !credentials.is_structurally_valid() {
            warn!("Stored credentials have an access token but no refresh token");
            return self.purge_unusable().await;
        }

        let previous = self.store.get();
        match self.validator.validate(&credentials).await {
            ValidationOutcome::Valid(user) => {
                self.store.reset_unreachable();
                let credentials = self.refresh_if_expiring(credentials).await;
                self.accept_valid(user, credentials, &previous)
            }
            ValidationOutcome::Invalid(reason) => {
                debug!("Access token not accepted ({}), refreshing", reason);
                self.refresh(credentials, attempt_id).await
            }
            ValidationOutcome::Unreachable(reason) => {
                debug!("Validation unreachable ({}), trying refresh", reason);
                self.refresh(credentials, attempt_id).await
            }
        }
    }

    fn no_credentials(&self) -> RecoveryOutcome {
        if self.store.get().is_valid() {
            self.store.set(SessionState::Invalid {
                reason: "stored credentials are gone".to_string(),
            });
        }
        self.store.set_last_error(Some(SessionError::CredentialMissing));
        self.store.record_check(false);
        RecoveryOutcome::Failed(FailureReason::CredentialMissing)
    }

    async fn purge_unusable(&self) -> RecoveryOutcome {
        if let Err(e) = self.sanitizer.purge_structural_locked().await {
            return RecoveryOutcome::Failed(FailureReason::Storage(e.to_string()));
        }
        self.store.record_check(false);
        RecoveryOutcome::Failed(FailureReason::CredentialStructurallyInvalid)
    }

    fn accept_valid(
        &self,
        user: SessionUser,
        credentials: Credentials,
        previous: &SessionState,
    ) -> RecoveryOutcome {
        let same_user = previous.user().is_some_and(|current| current.id == user.id);
        let next = SessionState::Valid { user, credentials };
        if *previous != next {
            self.store.set(next);
        }
        // A pending save is still worth reporting
        if self.unsaved().is_none() {
            self.store.set_last_error(None);
        }
        self.store.record_check(true);
        if same_user {
            RecoveryOutcome::AlreadyValid
        } else {
            RecoveryOutcome::Recovered
        }
    }

    /// Rotate tokens that are about to expire. Any failure keeps the current
    /// pair; the session is still valid right now.
    async fn refresh_if_expiring(&self, credentials: Credentials) -> Credentials {
        let threshold =
            i64::try_from(self.proactive_refresh_threshold.as_secs()).unwrap_or(i64::MAX);
        if !credentials.expires_within(threshold) {
            return credentials;
        }
        debug!("Access token expires within {}s, refreshing early", threshold);
        match self.refresher.refresh(&credentials).await {
            RefreshOutcome::Refreshed {
                credentials: fresh, ..
            } => {
                // The old refresh token may already be spent, so the fresh
                // pair is used even when it could not be saved
                if let Err(e) = self.persist_rotated(&fresh).await {
                    self.store.set_last_error(Some(e.into()));
                }
                fresh
            }
            RefreshOutcome::Rejected(reason) => {
                warn!("Early refresh rejected ({}), keeping current token", reason);
                credentials
            }
            RefreshOutcome::Unreachable(reason) => {
                debug!("Early refresh unreachable: {}", reason);
                credentials
            }
        }
    }

    async fn refresh(&self, credentials: Credentials, attempt_id: Uuid) -> RecoveryOutcome {
        match self.refresher.refresh(&credentials).await {
            RefreshOutcome::Refreshed {
                credentials: fresh,
                user,
            } => {
                self.store.reset_unreachable();
                let saved = self.persist_rotated(&fresh).await;
                self.store.set(SessionState::Valid {
                    user,
                    credentials: fresh,
                });
                match saved {
                    Ok(()) => self.store.set_last_error(None),
                    Err(e) => self.store.set_last_error(Some(e.into())),
                }
                self.store.record_check(true);
                RecoveryOutcome::Recovered
            }
            RefreshOutcome::Rejected(reason) => {
                info!("Refresh token rejected ({}, attempt {})", reason, attempt_id);
                self.set_unsaved(None);
                self.store.reset_unreachable();
                self.sanitizer
                    .invalidate_rejected_locked(&credentials, &reason)
                    .await;
                self.store.record_check(false);
                RecoveryOutcome::Failed(FailureReason::Rejected(reason))
            }
            RefreshOutcome::Unreachable(reason) => {
                // State untouched: a transient failure is not a sign-out
                self.store.record_unreachable();
                self.store
                    .set_last_error(Some(SessionError::ProviderUnreachable { reason }));
                self.store.record_check(false);
                RecoveryOutcome::Failed(FailureReason::Unreachable)
            }
        }
    }
}
