//! Environment signal source.
//!
//! Turns host signals (visibility, focus, resume, credential file changes)
//! into [`ActivationEvent`](crate::session::ActivationEvent)s for the
//! recovery coordinator.
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │  File Watcher   │     │ Host / console   │
//! │  (notify crate) │     │ signals          │
//! └────────┬────────┘     └────────┬─────────┘
//!          └───────────┬───────────┘
//!                      ▼
//!              ┌───────────────┐
//!              │ normalize +   │
//!              │ debounce      │
//!              └───────┬───────┘
//!                      ▼
//!           ┌─────────────────────┐
//!           │ RecoveryCoordinator │
//!           └─────────────────────┘
//! ```

mod debouncer;
mod file_watcher;
mod source;
mod types;

pub use debouncer::{Debouncer, DEFAULT_DEBOUNCE_WINDOW};
pub use file_watcher::spawn_file_watcher;
pub use source::{spawn_activation_loop, ActivationLoop, ActivationReport, ActivationSource};
pub use types::PlatformSignal;
