//! Callback registry for data-refresh subscribers.
//!
//! Subscribers are notified once per successful recovery, in registration
//! order. The registry keeps only [`Weak`] references: whoever registered a
//! subscriber owns it, and dropping the owner's `Arc` silently removes it.
//!
//! Fan-out works on a snapshot taken when it starts, so subscribers may
//! register or unregister (themselves included) from inside their callback.
//! Changes take effect on the next fan-out.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::SessionError;

/// Error a subscriber returns when its refresh fails.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct SubscriberError(pub String);

impl SubscriberError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Something that refetches data after the session recovers.
pub trait Subscriber: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "anonymous"
    }

    fn on_session_recovered(&self) -> Result<(), SubscriberError>;
}

/// Adapter turning a closure into a [`Subscriber`].
pub struct FnSubscriber<F> {
    name: String,
    callback: F,
}

impl<F> Subscriber for FnSubscriber<F>
where
    F: Fn() -> Result<(), SubscriberError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_session_recovered(&self) -> Result<(), SubscriberError> {
        (self.callback)()
    }
}

/// Wrap a closure as a shareable subscriber. Keep the returned `Arc` alive
/// for as long as the subscription should last.
pub fn subscriber_fn<F>(name: impl Into<String>, callback: F) -> Arc<dyn Subscriber>
where
    F: Fn() -> Result<(), SubscriberError> + Send + Sync + 'static,
{
    Arc::new(FnSubscriber {
        name: name.into(),
        callback,
    })
}

/// Token identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Result of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub notified: usize,
    pub failures: Vec<SessionError>,
}

impl NotifyReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Entry {
    handle: SubscriptionHandle,
    subscriber: Weak<dyn Subscriber>,
}

#[derive(Default)]
pub struct CallbackRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("len", &self.len())
            .finish()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, subscriber: &Arc<dyn Subscriber>) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        debug!("Registered subscriber '{}' ({})", subscriber.name(), handle.0);
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Entry {
                handle,
                subscriber: Arc::downgrade(subscriber),
            });
        handle
    }

    /// Returns false if the handle was not registered.
    pub fn unregister(&self, handle: SubscriptionHandle) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|entry| entry.handle != handle);
        entries.len() != before
    }

    /// Live subscribers (owners still holding them).
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|entry| entry.subscriber.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every live subscriber once, in registration order.
    ///
    /// A subscriber that returns an error or panics is logged and skipped;
    /// the rest still run.
    pub fn notify_all(&self) -> NotifyReport {
        let snapshot: Vec<Arc<dyn Subscriber>> = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.retain(|entry| entry.subscriber.strong_count() > 0);
            entries
                .iter()
                .filter_map(|entry| entry.subscriber.upgrade())
                .collect()
        };

        let mut report = NotifyReport::default();
        for subscriber in snapshot {
            let name = subscriber.name().to_string();
            let message = match catch_unwind(AssertUnwindSafe(|| subscriber.on_session_recovered())) {
                Ok(Ok(())) => {
                    report.notified += 1;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => "panicked".to_string(),
            };
            warn!("Subscriber '{}' failed: {}", name, message);
            report.failures.push(SessionError::SubscriberFailure {
                subscriber: name,
                message,
            });
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(
        name: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<dyn Subscriber> {
        let log = log.clone();
        subscriber_fn(name, move || {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_notifies_in_registration_order() {
        let registry = CallbackRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let subs: Vec<_> = ["a", "b", "c"].iter().map(|n| recorder(n, &log)).collect();
        for sub in &subs {
            registry.register(sub);
        }

        let report = registry.notify_all();
        assert_eq!(report.notified, 3);
        assert!(report.all_succeeded());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failures_are_isolated() {
        let registry = CallbackRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = recorder("first", &log);
        let erroring = subscriber_fn("erroring", || Err(SubscriberError::new("fetch failed")));
        let panicking = subscriber_fn("panicking", || panic!("subscriber bug"));
        let last = recorder("last", &log);
        for sub in [&first, &erroring, &panicking, &last] {
            registry.register(sub);
        }

        let report = registry.notify_all();
        assert_eq!(report.notified, 2);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "last"]);
        assert!(matches!(
            &report.failures[0],
            SessionError::SubscriberFailure { subscriber, .. } if subscriber == "erroring"
        ));
    }

    #[test]
    fn test_unregister() {
        let registry = CallbackRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder("a", &log);
        let b = recorder("b", &log);
        let handle_a = registry.register(&a);
        registry.register(&b);

        assert!(registry.unregister(handle_a));
        assert!(!registry.unregister(handle_a));

        registry.notify_all();
        assert_eq!(*log.lock().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_dropped_owner_is_discarded() {
        let registry = CallbackRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let kept = recorder("kept", &log);
        registry.register(&kept);
        {
            let dropped = recorder("dropped", &log);
            registry.register(&dropped);
            assert_eq!(registry.len(), 2);
        }
        assert_eq!(registry.len(), 1);

        registry.notify_all();
        assert_eq!(*log.lock().unwrap(), vec!["kept"]);
    }

    #[test]
    fn test_self_unregister_during_fan_out() {
        let registry = Arc::new(CallbackRegistry::new());
        let calls = Arc::new(Mutex::new(0));
        let handle_slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        let reg = registry.clone();
        let slot = handle_slot.clone();
        let counter = calls.clone();
        let once = subscriber_fn("once", move || {
            *counter.lock().unwrap() += 1;
            if let Some(handle) = slot.lock().unwrap().take() {
                reg.unregister(handle);
            }
            Ok(())
        });
        *handle_slot.lock().unwrap() = Some(registry.register(&once));

        let log = Arc::new(Mutex::new(Vec::new()));
        let after = recorder("after", &log);
        registry.register(&after);

        let report = registry.notify_all();
        assert_eq!(report.notified, 2);
        registry.notify_all();

        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["after", "after"]);
    }

    #[test]
    fn test_register_during_fan_out_waits_for_next_round() {
        let registry = Arc::new(CallbackRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let late = recorder("late", &log);
        let late_slot = Arc::new(Mutex::new(Some(late.clone())));

        let reg = registry.clone();
        let slot = late_slot.clone();
        let registrar = subscriber_fn("registrar", move || {
            if let Some(sub) = slot.lock().unwrap().take() {
                reg.register(&sub);
            }
            Ok(())
        });
        registry.register(&registrar);

        registry.notify_all();
        assert!(log.lock().unwrap().is_empty());

        registry.notify_all();
        assert_eq!(*log.lock().unwrap(), vec!["late"]);
    }
}
