//! Leading-edge debouncing of activation signals.
//!
//! Focus and visibility usually fire together when a window comes back. The
//! first signal in a window is admitted immediately; the rest are dropped
//! until the window has passed.

use std::time::Duration;

use tokio::time::Instant;

/// Default debounce window (250ms).
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_admitted: Option<Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_admitted: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns true if a signal at `now` should go through.
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last_admitted {
            Some(last) if now.saturating_duration_since(last) < self.window => false,
            _ => {
                self.last_admitted = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_admitted = None;
    }
}
