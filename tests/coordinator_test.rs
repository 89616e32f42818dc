//! Recovery coordinator behavior under overlapping activations.
//!
//! Covers:
//! 1. A burst of concurrent activations costs one validate call
//! 2. Mid-flight callers share exactly one follow-up attempt, which reuses
//!    a fresh failure unless a manual check is among them
//! 3. Rate limiting after a successful check
//! 4. Valid answers never downgrade; unreachable answers never downgrade
//! 5. Rejected refresh cleanup happens once even when attempts overlap
//! 6. The in-flight slot is released after cancellation and panics
//! 7. Rotated credentials survive a failed save

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use futures::future::join_all;
use sessionkeeper::adapters::mock::{MockIdentityProvider, MockRefresh, MockValidate};
use sessionkeeper::auth::{Credentials, SessionUser};
use sessionkeeper::error::SessionError;
use sessionkeeper::session::{
    subscriber_fn, ActivationEvent, FailureReason, RecoveryCoordinator, RecoveryOutcome,
    SessionState, SweepOutcome,
};

const EVENTS: [ActivationEvent; 4] = [
    ActivationEvent::TabVisible,
    ActivationEvent::WindowFocus,
    ActivationEvent::PageRestored,
    ActivationEvent::ManualTrigger,
];

#[tokio::test]
async fn test_burst_of_activations_validates_once() {
    let harness = Harness::with_credentials(test_credentials());
    harness.provider.set_delay(Duration::from_millis(50));
    let (subscriber, notified) = counting_subscriber("feed");
    harness.coordinator.registry().register(&subscriber);

    let outcomes = join_all(
        (0..12).map(|i| harness.coordinator.handle_activation(EVENTS[i % EVENTS.len()])),
    )
    .await;

    assert_eq!(harness.provider.validate_calls(), 1);
    assert_eq!(harness.provider.refresh_calls(), 0);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == RecoveryOutcome::Recovered)
            .count(),
        1
    );
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, RecoveryOutcome::Recovered | RecoveryOutcome::AlreadyValid)));
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert!(!harness.coordinator.is_in_flight());
}

#[tokio::test]
async fn test_mid_flight_callers_share_one_follow_up() {
    let harness = Harness::with_credentials(test_credentials());
    harness
        .provider
        .set_validate(MockValidate::Unreachable("offline".to_string()));
    harness
        .provider
        .set_refresh(MockRefresh::Unreachable("offline".to_string()));
    harness.provider.set_delay(Duration::from_millis(30));

    let outcomes = join_all(
        (0..8).map(|_| harness.coordinator.handle_activation(ActivationEvent::TabVisible)),
    )
    .await;

    // The follow-up lands inside the window of the leader's failure and
    // shares it instead of asking the provider again
    assert_eq!(harness.provider.validate_calls(), 1);
    assert_eq!(harness.provider.refresh_calls(), 1);
    assert!(outcomes
        .iter()
        .all(|o| *o == RecoveryOutcome::Failed(FailureReason::Unreachable)));
    assert_eq!(
        harness.coordinator.store().snapshot().consecutive_unreachable,
        1
    );
}

#[tokio::test]
async fn test_manual_trigger_forces_follow_up_after_failure() {
    let harness = Harness::with_credentials(test_credentials());
    harness
        .provider
        .push_validate(MockValidate::Unreachable("offline".to_string()));
    harness
        .provider
        .push_refresh(MockRefresh::Unreachable("offline".to_string()));
    harness.provider.set_delay(Duration::from_millis(30));

    let (first, second, third) = tokio::join!(
        harness
            .coordinator
            .handle_activation(ActivationEvent::TabVisible),
        harness
            .coordinator
            .handle_activation(ActivationEvent::WindowFocus),
        harness
            .coordinator
            .handle_activation(ActivationEvent::ManualTrigger),
    );

    assert_eq!(first, RecoveryOutcome::Failed(FailureReason::Unreachable));
    // An explicit check always reaches the provider
    assert_eq!(harness.provider.validate_calls(), 2);
    assert_eq!(second, RecoveryOutcome::Recovered);
    assert_eq!(third, RecoveryOutcome::Recovered);
    assert!(harness.coordinator.store().get().is_valid());
}

#[tokio::test]
async fn test_unsaved_rotation_is_not_lost() {
    let harness = Harness::configured(Some(test_credentials()), |b| {
        b.min_check_interval(Duration::ZERO)
    });
    harness.creds.set_save_should_fail(true);
    harness
        .provider
        .push_validate(MockValidate::Invalid("expired".to_string()));
    harness.provider.push_refresh(MockRefresh::Refreshed(
        Credentials::with_tokens("a2", "r2").for_user("user-1"),
        None,
    ));
    // Spending r1 a second time would end the session
    harness
        .provider
        .set_refresh(MockRefresh::Rejected("invalid_grant".to_string()));

    assert_eq!(
        harness
            .coordinator
            .handle_activation(ActivationEvent::TabVisible)
            .await,
        RecoveryOutcome::Recovered
    );
    assert!(matches!(
        harness.coordinator.store().last_error(),
        Some(SessionError::CredentialsStore { .. })
    ));

    let outcome = harness
        .coordinator
        .handle_activation(ActivationEvent::WindowFocus)
        .await;
    assert!(!outcome.is_failure());
    assert!(harness.coordinator.store().get().is_valid());
    assert_eq!(harness.provider.refresh_tokens_seen(), vec!["r1".to_string()]);
    assert_eq!(harness.creds.clear_count(), 0);

    // Storage comes back and the rotated pair reaches the disk
    harness.creds.set_save_should_fail(false);
    harness
        .coordinator
        .handle_activation(ActivationEvent::ManualTrigger)
        .await;
    let stored = harness.creds.get_credentials().unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("a2"));
    assert_eq!(stored.refresh_token.as_deref(), Some("r2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_on_multi_thread_runtime() {
    let harness = Harness::with_credentials(test_credentials());
    harness.provider.set_delay(Duration::from_millis(50));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let coordinator = harness.coordinator.clone();
            tokio::spawn(async move { coordinator.handle_activation(EVENTS[i % 4]).await })
        })
        .collect();
    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(!outcome.is_failure());
    }

    assert_eq!(harness.provider.validate_calls(), 1);
}

#[tokio::test]
async fn test_rate_limit_window() {
    let harness = Harness::configured(Some(test_credentials()), |b| {
        b.min_check_interval(Duration::from_millis(100))
    });

    assert_eq!(
        harness
            .coordinator
            .handle_activation(ActivationEvent::TabVisible)
            .await,
        RecoveryOutcome::Recovered
    );
    assert_eq!(
        harness
            .coordinator
            .handle_activation(ActivationEvent::WindowFocus)
            .await,
        RecoveryOutcome::AlreadyValid
    );
    assert_eq!(harness.provider.validate_calls(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(
        harness
            .coordinator
            .handle_activation(ActivationEvent::WindowFocus)
            .await,
        RecoveryOutcome::AlreadyValid
    );
    assert_eq!(harness.provider.validate_calls(), 2);
}

#[tokio::test]
async fn test_failed_check_is_not_rate_limited() {
    let harness = Harness::with_credentials(test_credentials());
    harness
        .provider
        .set_validate(MockValidate::Unreachable("offline".to_string()));
    harness
        .provider
        .set_refresh(MockRefresh::Unreachable("offline".to_string()));

    harness
        .coordinator
        .handle_activation(ActivationEvent::TabVisible)
        .await;
    harness
        .provider
        .set_validate(MockValidate::Valid(SessionUser::new("user-1")));
    assert_eq!(
        harness
            .coordinator
            .handle_activation(ActivationEvent::TabVisible)
            .await,
        RecoveryOutcome::Recovered
    );
    assert_eq!(harness.provider.validate_calls(), 2);
}

#[tokio::test]
async fn test_valid_answers_never_downgrade() {
    let harness = Harness::configured(Some(test_credentials()), |b| {
        b.min_check_interval(Duration::ZERO)
    });
    let states = record_states(&harness.coordinator);

    for event in EVENTS.iter().cycle().take(10) {
        let outcome = harness.coordinator.handle_activation(*event).await;
        assert!(!outcome.is_failure());
    }

    assert_eq!(harness.provider.validate_calls(), 10);
    assert!(!states.lock().unwrap().contains(&"invalid"));
    assert!(harness.coordinator.store().get().is_valid());
}

#[tokio::test]
async fn test_unreachable_streak_is_surfaced_without_downgrade() {
    let harness = Harness::configured(Some(test_credentials()), |b| {
        b.min_check_interval(Duration::ZERO)
            .unreachable_alert_threshold(3)
    });
    harness
        .coordinator
        .handle_activation(ActivationEvent::ManualTrigger)
        .await;

    harness
        .provider
        .set_validate(MockValidate::Unreachable("offline".to_string()));
    harness
        .provider
        .set_refresh(MockRefresh::Unreachable("offline".to_string()));
    for _ in 0..3 {
        assert_eq!(
            harness
                .coordinator
                .handle_activation(ActivationEvent::TabVisible)
                .await,
            RecoveryOutcome::Failed(FailureReason::Unreachable)
        );
    }

    let snapshot = harness.coordinator.store().snapshot();
    assert!(snapshot.state.is_valid());
    assert!(snapshot.unreachable_exhausted);
    assert!(snapshot.last_error.is_some_and(|e| e.is_transient()));
    assert_eq!(harness.creds.clear_count(), 0);

    harness
        .provider
        .set_validate(MockValidate::Valid(SessionUser::new("user-1")));
    harness
        .coordinator
        .handle_activation(ActivationEvent::TabVisible)
        .await;
    let snapshot = harness.coordinator.store().snapshot();
    assert!(!snapshot.unreachable_exhausted);
    assert!(snapshot.last_error.is_none());
}

#[tokio::test]
async fn test_rejected_cleanup_happens_once_under_overlap() {
    let harness = Harness::configured(None, |b| {
        b.min_check_interval(Duration::ZERO)
            .probe_refresh_on_sweep(true)
    });
    harness
        .coordinator
        .establish(test_credentials(), SessionUser::new("user-1"))
        .await
        .unwrap();
    let states = record_states(&harness.coordinator);

    harness
        .provider
        .set_validate(MockValidate::Invalid("expired".to_string()));
    harness
        .provider
        .set_refresh(MockRefresh::Rejected("invalid_grant".to_string()));
    harness.provider.set_delay(Duration::from_millis(20));

    let sanitizer = harness.coordinator.sanitizer().clone();
    let (first, second, sweep) = tokio::join!(
        harness
            .coordinator
            .handle_activation(ActivationEvent::TabVisible),
        harness
            .coordinator
            .handle_activation(ActivationEvent::WindowFocus),
        sanitizer.sweep(),
    );

    assert!(first.is_failure());
    assert!(second.is_failure());
    assert!(sweep.purged() || sweep == SweepOutcome::NoCredentials);
    assert_eq!(harness.creds.clear_count(), 1);
    assert!(harness.creds.get_credentials().is_none());
    assert_eq!(
        states
            .lock()
            .unwrap()
            .iter()
            .filter(|label| **label == "invalid")
            .count(),
        1
    );
    assert!(matches!(
        harness.coordinator.store().get(),
        SessionState::Invalid { .. }
    ));
}

#[tokio::test]
async fn test_guard_released_after_cancellation() {
    let harness = Harness::configured(Some(test_credentials()), |b| {
        b.validate_timeout(Duration::from_secs(30))
    });
    harness.provider.set_validate(MockValidate::Hang);

    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        harness
            .coordinator
            .handle_activation(ActivationEvent::TabVisible),
    )
    .await;
    assert!(cancelled.is_err());
    assert!(!harness.coordinator.is_in_flight());

    harness
        .provider
        .set_validate(MockValidate::Valid(SessionUser::new("user-1")));
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        harness
            .coordinator
            .handle_activation(ActivationEvent::TabVisible),
    )
    .await
    .expect("coordinator stuck after cancellation");
    assert_eq!(outcome, RecoveryOutcome::Recovered);
}

#[tokio::test]
async fn test_waiters_served_after_leader_is_aborted() {
    let harness = Harness::configured(Some(test_credentials()), |b| {
        b.validate_timeout(Duration::from_secs(30))
    });
    harness.provider.set_validate(MockValidate::Hang);

    let coordinator = harness.coordinator.clone();
    let leader =
        tokio::spawn(async move { coordinator.handle_activation(ActivationEvent::TabVisible).await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(harness.coordinator.is_in_flight());

    let coordinator = harness.coordinator.clone();
    let waiter =
        tokio::spawn(async move { coordinator.handle_activation(ActivationEvent::WindowFocus).await });
    tokio::time::sleep(Duration::from_millis(30)).await;

    harness
        .provider
        .set_validate(MockValidate::Valid(SessionUser::new("user-1")));
    leader.abort();

    let outcome = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter never served")
        .unwrap();
    assert_eq!(outcome, RecoveryOutcome::Recovered);
}

#[tokio::test]
async fn test_guard_released_after_panic() {
    let creds = PanickingCredentials::default();
    creds.inner.set_credentials(Some(test_credentials()));
    let provider = MockIdentityProvider::new();
    let coordinator =
        RecoveryCoordinator::builder(Arc::new(creds.clone()), Arc::new(provider.clone())).build();

    creds.arm();
    assert_eq!(
        coordinator
            .handle_activation(ActivationEvent::ManualTrigger)
            .await,
        RecoveryOutcome::Failed(FailureReason::Interrupted)
    );
    assert!(!coordinator.is_in_flight());

    assert_eq!(
        coordinator
            .handle_activation(ActivationEvent::ManualTrigger)
            .await,
        RecoveryOutcome::Recovered
    );
}

#[tokio::test]
async fn test_provider_panic_is_unreachable_not_fatal() {
    let harness = Harness::with_credentials(test_credentials());
    harness.provider.set_validate(MockValidate::Panic);
    harness.provider.set_refresh(MockRefresh::Panic);

    assert_eq!(
        harness
            .coordinator
            .handle_activation(ActivationEvent::ManualTrigger)
            .await,
        RecoveryOutcome::Failed(FailureReason::Unreachable)
    );
    assert_eq!(harness.creds.clear_count(), 0);
    assert!(!harness.coordinator.is_in_flight());
}

#[tokio::test]
async fn test_subscriber_failures_are_isolated() {
    let harness = Harness::with_credentials(test_credentials());
    let (first, first_calls) = counting_subscriber("first");
    let broken = subscriber_fn("broken", || panic!("subscriber bug"));
    let (last, last_calls) = counting_subscriber("last");
    for subscriber in [&first, &broken, &last] {
        harness.coordinator.registry().register(subscriber);
    }

    assert_eq!(
        harness
            .coordinator
            .handle_activation(ActivationEvent::TabVisible)
            .await,
        RecoveryOutcome::Recovered
    );
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(last_calls.load(Ordering::SeqCst), 1);
}
