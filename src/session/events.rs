//! Activation triggers and recovery results.

use std::fmt;

/// A normalized "the app became active again" trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivationEvent {
    /// Document/tab became visible.
    TabVisible,
    /// Window regained focus.
    WindowFocus,
    /// Page restored from cache, process resumed or app foregrounded.
    PageRestored,
    /// Explicit request (startup, user action, credentials changed on disk).
    ManualTrigger,
}

impl ActivationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationEvent::TabVisible => "tab_visible",
            ActivationEvent::WindowFocus => "window_focus",
            ActivationEvent::PageRestored => "page_restored",
            ActivationEvent::ManualTrigger => "manual",
        }
    }
}

impl fmt::Display for ActivationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a recovery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Nothing persisted; the validator was not called.
    CredentialMissing,
    /// Persisted blob was unusable and has been purged.
    CredentialStructurallyInvalid,
    /// Provider permanently rejected the refresh token.
    Rejected(String),
    /// Provider could not be reached. Session state was left alone.
    Unreachable,
    /// The local credential store failed.
    Storage(String),
    /// The attempt was cancelled before it produced a result.
    Interrupted,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::CredentialMissing => f.write_str("CredentialMissing"),
            FailureReason::CredentialStructurallyInvalid => {
                f.write_str("CredentialStructurallyInvalid")
            }
            FailureReason::Rejected(reason) => write!(f, "rejected: {}", reason),
            FailureReason::Unreachable => f.write_str("unreachable"),
            FailureReason::Storage(msg) => write!(f, "storage: {}", msg),
            FailureReason::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Terminal result of one `handle_activation` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The session went from not-valid to valid; subscribers were notified.
    Recovered,
    /// The session was already valid (or checked moments ago).
    AlreadyValid,
    Failed(FailureReason),
}

impl RecoveryOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RecoveryOutcome::Failed(_))
    }
}

impl fmt::Display for RecoveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryOutcome::Recovered => f.write_str("recovered"),
            RecoveryOutcome::AlreadyValid => f.write_str("already valid"),
            RecoveryOutcome::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}
