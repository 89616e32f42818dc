//! Mock identity provider for testing.
//!
//! Answers are scripted per call: queued answers are used first, then the
//! default answer. Every call is counted and the refresh tokens presented are
//! recorded.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::{Credentials, SessionUser};
use crate::traits::{IdentityProvider, ProviderError, RefreshResponse, ValidateResponse};

/// Scripted answer to a validate call.
#[derive(Debug, Clone)]
pub enum MockValidate {
    Valid(SessionUser),
    Invalid(String),
    Unreachable(String),
    /// Never answers; only the caller's timeout ends the call
    Hang,
    /// Panics inside the provider
    Panic,
}

/// Scripted answer to a refresh call.
#[derive(Debug, Clone)]
pub enum MockRefresh {
    Refreshed(Credentials, Option<SessionUser>),
    Rejected(String),
    Unreachable(String),
    Hang,
    Panic,
}

#[derive(Debug)]
struct Script<T> {
    default: T,
    queue: VecDeque<T>,
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> T {
        self.queue.pop_front().unwrap_or_else(|| self.default.clone())
    }
}

/// Mock identity provider with scripted answers.
///
/// # Example
///
/// ```ignore
/// let provider = MockIdentityProvider::new();
/// provider.set_validate(MockValidate::Invalid("expired".into()));
/// provider.set_refresh(MockRefresh::Refreshed(Credentials::with_tokens("a2", "r2"), None));
/// provider.set_delay(Duration::from_millis(50));
/// // ... run the coordinator ...
/// assert_eq!(provider.validate_calls(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockIdentityProvider {
    validate: Arc<Mutex<Script<MockValidate>>>,
    refresh: Arc<Mutex<Script<MockRefresh>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    validate_calls: Arc<AtomicUsize>,
    refresh_calls: Arc<AtomicUsize>,
    refresh_tokens_seen: Arc<Mutex<Vec<String>>>,
}

impl MockIdentityProvider {
    /// Every call answers "valid" for `user-1`; refresh is unreachable.
    pub fn new() -> Self {
        Self {
            validate: Arc::new(Mutex::new(Script {
                default: MockValidate::Valid(SessionUser::new("user-1")),
                queue: VecDeque::new(),
            })),
            refresh: Arc::new(Mutex::new(Script {
                default: MockRefresh::Unreachable("no refresh scripted".to_string()),
                queue: VecDeque::new(),
            })),
            delay: Arc::new(Mutex::new(None)),
            validate_calls: Arc::new(AtomicUsize::new(0)),
            refresh_calls: Arc::new(AtomicUsize::new(0)),
            refresh_tokens_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the default validate answer.
    pub fn set_validate(&self, answer: MockValidate) {
        self.validate.lock().unwrap().default = answer;
    }

    /// Queue a validate answer for the next call only.
    pub fn push_validate(&self, answer: MockValidate) {
        self.validate.lock().unwrap().queue.push_back(answer);
    }

    /// Set the default refresh answer.
    pub fn set_refresh(&self, answer: MockRefresh) {
        self.refresh.lock().unwrap().default = answer;
    }

    /// Queue a refresh answer for the next call only.
    pub fn push_refresh(&self, answer: MockRefresh) {
        self.refresh.lock().unwrap().queue.push_back(answer);
    }

    /// Delay every answer by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Total provider calls of either kind.
    pub fn total_calls(&self) -> usize {
        self.validate_calls() + self.refresh_calls()
    }

    /// Refresh tokens presented so far, in call order.
    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().unwrap().clone()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn validate(
        &self,
        _credentials: &Credentials,
        timeout: Duration,
    ) -> Result<ValidateResponse, ProviderError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        let answer = self.validate.lock().unwrap().next();
        self.pause().await;

        match answer {
            MockValidate::Valid(user) => Ok(ValidateResponse::valid(user)),
            MockValidate::Invalid(reason) => Ok(ValidateResponse::invalid(reason)),
            MockValidate::Unreachable(reason) => Err(ProviderError::Unreachable(reason)),
            MockValidate::Hang => {
                std::future::pending::<()>().await;
                Err(ProviderError::Timeout(timeout))
            }
            MockValidate::Panic => panic!("mock validate panicked"),
        }
    }

    async fn refresh(
        &self,
        refresh_token: &str,
        timeout: Duration,
    ) -> Result<RefreshResponse, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens_seen
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        let answer = self.refresh.lock().unwrap().next();
        self.pause().await;

        match answer {
            MockRefresh::Refreshed(credentials, user) => {
                let response = RefreshResponse::refreshed(credentials);
                Ok(match user {
                    Some(user) => response.with_user(user),
                    None => response,
                })
            }
            MockRefresh::Rejected(reason) => Ok(RefreshResponse::rejected(reason)),
            MockRefresh::Unreachable(reason) => Err(ProviderError::Unreachable(reason)),
            MockRefresh::Hang => {
                std::future::pending::<()>().await;
                Err(ProviderError::Timeout(timeout))
            }
            MockRefresh::Panic => panic!("mock refresh panicked"),
        }
    }
}
