//! Raw environment signals and their normalization.

use crate::session::ActivationEvent;

/// A raw signal from the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformSignal {
    VisibilityChanged { visible: bool },
    FocusGained,
    FocusLost,
    /// Process resumed after suspension or restored from a cache.
    Resumed,
    /// App brought back to the foreground.
    Foregrounded,
    /// Explicit user or startup request.
    Manual,
    /// The persisted credentials file was created, changed or removed.
    CredentialsFileChanged,
}

impl PlatformSignal {
    /// Map to an activation event. Signals meaning "became inactive" map to
    /// `None` and never start a recovery.
    pub fn normalize(&self) -> Option<ActivationEvent> {
        match self {
            Self::VisibilityChanged { visible: true } => Some(ActivationEvent::TabVisible),
            Self::VisibilityChanged { visible: false } | Self::FocusLost => None,
            Self::FocusGained => Some(ActivationEvent::WindowFocus),
            Self::Resumed | Self::Foregrounded => Some(ActivationEvent::PageRestored),
            Self::Manual | Self::CredentialsFileChanged => Some(ActivationEvent::ManualTrigger),
        }
    }

    /// Environment signals are debounced; explicit ones always go through.
    pub fn is_debounced(&self) -> bool {
        !matches!(self, Self::Manual | Self::CredentialsFileChanged)
    }

    /// Parse a command typed on the console.
    pub fn from_command(command: &str) -> Option<Self> {
        match command.trim().to_ascii_lowercase().as_str() {
            "visible" | "show" => Some(Self::VisibilityChanged { visible: true }),
            "hidden" | "hide" => Some(Self::VisibilityChanged { visible: false }),
            "focus" => Some(Self::FocusGained),
            "blur" => Some(Self::FocusLost),
            "restore" | "resume" => Some(Self::Resumed),
            "foreground" => Some(Self::Foregrounded),
            "check" => Some(Self::Manual),
            _ => None,
        }
    }
}
