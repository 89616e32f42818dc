//! Session consistency.
//!
//! Keeps the locally cached session in agreement with the identity provider.
//!
//! ```text
//! activation event ──▶ RecoveryCoordinator ──▶ Validator ──▶ Refresher
//!                              │                   (IdentityProvider)
//!                              ▼
//!                      SessionStateStore ──▶ listeners / watch
//!                              │
//!                              ▼ (Recovered only)
//!                      CallbackRegistry ──▶ data-refresh subscribers
//!
//! CredentialSanitizer: startup + every valid → no-session transition
//! ```

pub mod coordinator;
pub mod events;
pub mod refresher;
pub mod registry;
pub mod sanitizer;
pub mod state;
pub mod validator;

pub use coordinator::{
    CoordinatorBuilder, RecoveryCoordinator, DEFAULT_MIN_CHECK_INTERVAL,
    DEFAULT_PROACTIVE_REFRESH_THRESHOLD,
};
pub use events::{ActivationEvent, FailureReason, RecoveryOutcome};
pub use refresher::{RefreshOutcome, Refresher, DEFAULT_REFRESH_TIMEOUT};
pub use registry::{
    subscriber_fn, CallbackRegistry, NotifyReport, Subscriber, SubscriberError,
    SubscriptionHandle,
};
pub use sanitizer::{CredentialSanitizer, SessionGate, SweepOutcome};
pub use state::{CheckRecord, SessionSnapshot, SessionState, SessionStateStore, Unsubscribe};
pub use validator::{ValidationOutcome, Validator, DEFAULT_VALIDATE_TIMEOUT};
