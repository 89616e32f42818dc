//! Activation dispatch.
//!
//! Raw [`PlatformSignal`]s are sent through an [`ActivationSource`] handle.
//! The dispatch loop normalizes and debounces them, then hands each admitted
//! event to the recovery coordinator on its own task so a slow attempt never
//! blocks signal intake. Outcomes are reported on a channel.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::debouncer::Debouncer;
use super::types::PlatformSignal;
use crate::session::{ActivationEvent, RecoveryCoordinator, RecoveryOutcome, SweepOutcome};

/// Sender side for raw signals. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ActivationSource {
    tx: mpsc::UnboundedSender<PlatformSignal>,
}

impl ActivationSource {
    #[cfg(test)]
    pub(crate) fn from_sender(tx: mpsc::UnboundedSender<PlatformSignal>) -> Self {
        Self { tx }
    }

    /// Returns false once the dispatch loop has stopped.
    pub fn emit(&self, signal: PlatformSignal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

/// Outcome of one dispatched signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    pub signal: PlatformSignal,
    pub event: ActivationEvent,
    /// Set for credential file changes, which sweep before recovering.
    pub sweep: Option<SweepOutcome>,
    pub outcome: RecoveryOutcome,
}

/// Running dispatch loop.
pub struct ActivationLoop {
    pub source: ActivationSource,
    pub reports: mpsc::UnboundedReceiver<ActivationReport>,
    pub handle: JoinHandle<()>,
}

/// Spawn the dispatch loop. It runs until every [`ActivationSource`] clone
/// has been dropped.
pub fn spawn_activation_loop(coordinator: RecoveryCoordinator, debounce: Duration) -> ActivationLoop {
    let (tx, mut rx) = mpsc::unbounded_channel::<PlatformSignal>();
    let (report_tx, reports) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        tracing::info!("Activation loop started (debounce: {:?})", debounce);
        let mut debouncer = Debouncer::new(debounce);

        while let Some(signal) = rx.recv().await {
            let Some(event) = signal.normalize() else {
                tracing::trace!("Ignoring {:?}", signal);
                continue;
            };
            if signal.is_debounced() && !debouncer.admit(Instant::now()) {
                tracing::debug!("Debounced {:?}", signal);
                continue;
            }

            let coordinator = coordinator.clone();
            let report_tx = report_tx.clone();
            tokio::spawn(async move {
                let sweep = if signal == PlatformSignal::CredentialsFileChanged {
                    Some(coordinator.sanitizer().sweep_local().await)
                } else {
                    None
                };
                let outcome = coordinator.handle_activation(event).await;
                // Nobody listening is fine
                let _ = report_tx.send(ActivationReport {
                    signal,
                    event,
                    sweep,
                    outcome,
                });
            });
        }

        tracing::debug!("Activation loop stopped");
    });

    ActivationLoop {
        source: ActivationSource { tx },
        reports,
        handle,
    }
}
