//! Common test utilities for integration tests.
//!
//! Fixtures for credentials, a coordinator wired to in-memory collaborators,
//! and a few purpose-built test doubles.
//!
//! # Example
//!
//! ```ignore
//! let harness = Harness::with_credentials(test_credentials());
//! harness.provider.set_validate(MockValidate::Invalid("expired".into()));
//! harness.coordinator.handle_activation(ActivationEvent::TabVisible).await;
//! ```

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sessionkeeper::adapters::mock::{InMemoryCredentials, MockIdentityProvider};
use sessionkeeper::auth::Credentials;
use sessionkeeper::session::{
    subscriber_fn, CoordinatorBuilder, RecoveryCoordinator, SessionState, Subscriber,
};
use sessionkeeper::traits::{CredentialsError, CredentialsProvider};

/// Complete token pair that won't expire during the test run.
pub fn test_credentials() -> Credentials {
    Credentials {
        access_token: Some("a1".to_string()),
        refresh_token: Some("r1".to_string()),
        expires_at: Some(i64::MAX),
        user_id: Some("user-1".to_string()),
    }
}

/// Access token without a refresh token.
pub fn orphaned_access_token() -> Credentials {
    Credentials {
        access_token: Some("a1".to_string()),
        refresh_token: None,
        expires_at: None,
        user_id: Some("user-1".to_string()),
    }
}

/// Coordinator wired to an in-memory store and a scripted provider.
pub struct Harness {
    pub creds: InMemoryCredentials,
    pub provider: MockIdentityProvider,
    pub coordinator: RecoveryCoordinator,
}

impl Harness {
    pub fn new(initial: Option<Credentials>) -> Self {
        Self::configured(initial, |builder| builder)
    }

    pub fn with_credentials(initial: Credentials) -> Self {
        Self::new(Some(initial))
    }

    pub fn configured(
        initial: Option<Credentials>,
        configure: impl FnOnce(CoordinatorBuilder) -> CoordinatorBuilder,
    ) -> Self {
        let creds = InMemoryCredentials::new();
        creds.set_credentials(initial);
        let provider = MockIdentityProvider::new();
        let builder =
            RecoveryCoordinator::builder(Arc::new(creds.clone()), Arc::new(provider.clone()));
        Self {
            creds,
            provider,
            coordinator: configure(builder).build(),
        }
    }
}

/// Subscriber counting its notifications.
pub fn counting_subscriber(name: &str) -> (Arc<dyn Subscriber>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let subscriber = subscriber_fn(name, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (subscriber, calls)
}

/// Records every state label the store publishes.
pub fn record_states(coordinator: &RecoveryCoordinator) -> Arc<Mutex<Vec<&'static str>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    // Dropping the handle leaves the listener registered
    let _ = coordinator.store().subscribe(move |state: &SessionState| {
        sink.lock().unwrap().push(state.label());
    });
    seen
}

/// Credentials store whose next load panics.
#[derive(Clone, Default)]
pub struct PanickingCredentials {
    pub inner: InMemoryCredentials,
    panic_next: Arc<AtomicBool>,
}

impl PanickingCredentials {
    pub fn arm(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialsProvider for PanickingCredentials {
    async fn load(&self) -> Result<Option<Credentials>, CredentialsError> {
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("credential store bug");
        }
        self.inner.load().await
    }

    async fn save(&self, creds: &Credentials) -> Result<(), CredentialsError> {
        self.inner.save(creds).await
    }

    async fn clear(&self) -> Result<(), CredentialsError> {
        self.inner.clear().await
    }
}
