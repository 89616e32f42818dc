//! Session state store.
//!
//! Process-wide record of the last known [`SessionState`], the last error and
//! the last completed check. Every write goes through [`SessionStateStore::set`]
//! (or the `record_*` helpers), each of which is atomic on its own.
//!
//! The store does not serialize *sequences* of writes. Compound
//! read-then-write logic must be serialized by the caller; the recovery
//! coordinator does this with its single-flight guard. The store is not safe
//! for uncoordinated concurrent writers in that sense.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::auth::{Credentials, SessionUser};
use crate::error::SessionError;

/// Current belief about the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No check has completed yet (or the user logged out).
    #[default]
    Unknown,
    Valid {
        user: SessionUser,
        credentials: Credentials,
    },
    /// The session is over; the UI should ask the user to sign in.
    Invalid { reason: String },
}

impl SessionState {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionState::Valid { .. })
    }

    /// `Invalid` or `Unknown`.
    pub fn is_no_session(&self) -> bool {
        !self.is_valid()
    }

    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            SessionState::Valid { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Unknown => "unknown",
            SessionState::Valid { .. } => "valid",
            SessionState::Invalid { .. } => "invalid",
        }
    }
}

/// When the last check finished and what it concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckRecord {
    pub at: Instant,
    pub concluded_valid: bool,
}

/// Everything the store knows, read atomically.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub last_error: Option<SessionError>,
    pub last_check: Option<CheckRecord>,
    pub consecutive_unreachable: u32,
    /// Set once the unreachable streak reaches the alert threshold.
    pub unreachable_exhausted: bool,
}

type Listener = Arc<dyn Fn(&SessionState) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

#[derive(Debug, Default)]
struct StoreInner {
    state: SessionState,
    last_error: Option<SessionError>,
    last_check: Option<CheckRecord>,
    consecutive_unreachable: u32,
}

/// Handle returned by [`SessionStateStore::subscribe`].
#[must_use = "dropping the handle keeps the listener registered; call unsubscribe() to remove it"]
pub struct Unsubscribe {
    listeners: Weak<Mutex<Listeners>>,
    id: u64,
}

impl Unsubscribe {
    /// Remove the listener. Safe to call from inside the listener itself.
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            let mut listeners = listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.entries.retain(|(id, _)| *id != self.id);
        }
    }
}

/// The session state store.
pub struct SessionStateStore {
    inner: Mutex<StoreInner>,
    watch_tx: watch::Sender<SessionState>,
    listeners: Arc<Mutex<Listeners>>,
    unreachable_threshold: u32,
}

impl std::fmt::Debug for SessionStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStateStore")
            .field("inner", &*self.lock())
            .field("unreachable_threshold", &self.unreachable_threshold)
            .finish()
    }
}

impl Default for SessionStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateStore {
    /// Default number of consecutive unreachable outcomes before the streak
    /// is surfaced.
    pub const DEFAULT_UNREACHABLE_THRESHOLD: u32 = 3;

    pub fn new() -> Self {
        Self::with_unreachable_threshold(Self::DEFAULT_UNREACHABLE_THRESHOLD)
    }

    pub fn with_unreachable_threshold(threshold: u32) -> Self {
        let (watch_tx, _) = watch::channel(SessionState::Unknown);
        Self {
            inner: Mutex::new(StoreInner::default()),
            watch_tx,
            listeners: Arc::new(Mutex::new(Listeners::default())),
            unreachable_threshold: threshold.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            state: inner.state.clone(),
            last_error: inner.last_error.clone(),
            last_check: inner.last_check,
            consecutive_unreachable: inner.consecutive_unreachable,
            unreachable_exhausted: inner.consecutive_unreachable >= self.unreachable_threshold,
        }
    }

    /// Replace the state and notify listeners. Returns the previous state.
    pub fn set(&self, state: SessionState) -> SessionState {
        let previous = {
            let mut inner = self.lock();
            let previous = std::mem::replace(&mut inner.state, state.clone());
            self.watch_tx.send_replace(state.clone());
            previous
        };

        if previous.label() != state.label() {
            info!("Session state {} -> {}", previous.label(), state.label());
        }
        self.notify_listeners(&state);
        previous
    }

    /// Register a listener called after every `set`.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.entries.push((id, Arc::new(listener)));
        Unsubscribe {
            listeners: Arc::downgrade(&self.listeners),
            id,
        }
    }

    /// Receiver that always holds the latest state; for async consumers.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.watch_tx.subscribe()
    }

    fn notify_listeners(&self, state: &SessionState) {
        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.entries.iter().map(|(_, l)| l.clone()).collect()
        };
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(state))).is_err() {
                warn!("Session state listener panicked");
            }
        }
    }

    pub fn last_check(&self) -> Option<CheckRecord> {
        self.lock().last_check
    }

    /// Record that a check just finished.
    pub fn record_check(&self, concluded_valid: bool) {
        self.lock().last_check = Some(CheckRecord {
            at: Instant::now(),
            concluded_valid,
        });
    }

    pub fn last_error(&self) -> Option<SessionError> {
        self.lock().last_error.clone()
    }

    pub fn set_last_error(&self, error: Option<SessionError>) {
        self.lock().last_error = error;
    }

    /// Count one more consecutive unreachable outcome. Returns the streak.
    pub fn record_unreachable(&self) -> u32 {
        let streak = {
            let mut inner = self.lock();
            inner.consecutive_unreachable = inner.consecutive_unreachable.saturating_add(1);
            inner.consecutive_unreachable
        };
        if streak == self.unreachable_threshold {
            warn!(
                "Identity provider unreachable {} times in a row",
                streak
            );
        }
        streak
    }

    /// The provider answered; end the unreachable streak.
    pub fn reset_unreachable(&self) {
        self.lock().consecutive_unreachable = 0;
    }

    /// Forget everything (logout). Listeners see `Unknown`.
    pub fn reset(&self) {
        {
            let mut inner = self.lock();
            inner.last_error = None;
            inner.last_check = None;
            inner.consecutive_unreachable = 0;
        }
        self.set(SessionState::Unknown);
    }
}
