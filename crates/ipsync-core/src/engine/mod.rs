//! Reconciliation loop
//!
//! The ReconciliationLoop is responsible for:
//! - Resolving the public address via AddressResolver (retried until it succeeds)
//! - Comparing it with the last confirmed address in the StateStore
//! - Rewriting target files via TextReconciler when it changed
//! - Delivering exactly one notification per detected change
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ AddressResolver │─── PublicAddress ───┐
//! └─────────────────┘                     │
//!                                         ▼
//!                             ┌─────────────────────┐
//!                             │ ReconciliationLoop  │
//!                             └─────────────────────┘
//!                                         │
//!         ┌───────────────┬───────────────┼───────────────┐
//!         │               │               │               │
//!         ▼               ▼               ▼               ▼
//! ┌─────────────┐ ┌──────────────┐ ┌─────────────┐ ┌─────────────┐
//! │ StateStore  │ │TextReconciler│ │  Notifier   │ │   Events    │
//! │ (compare)   │ │ (rewrite)    │ │ (announce)  │ │  (monitor)  │
//! └─────────────┘ └──────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Resolve the public address (interruptible by shutdown)
//! 2. Read the persisted address; absent counts as changed
//! 3. If changed, persist the new address, then rewrite every target in order
//! 4. Notify once
//! 5. Sleep for the cycle interval (interruptible by shutdown)
//!
//! A failed target edit abandons the cycle and restores the persisted
//! address to its pre-cycle value, so the next cycle sees the same change.

use crate::address::PublicAddress;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::reconcile::{TargetFile, TextReconciler};
use crate::retry::{RetryRunner, Sleeper, TokioSleeper};
use crate::traits::{AddressResolver, NotificationMessage, Notifier, StateStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

/// Events emitted by the ReconciliationLoop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// Loop started
    Started { targets_count: usize },

    /// Public address resolved
    AddressResolved { address: PublicAddress },

    /// Resolved address equals the persisted one
    Unchanged { address: PublicAddress },

    /// Resolved address differs from the persisted one (or none was persisted)
    AddressChanged {
        previous: Option<PublicAddress>,
        current: PublicAddress,
    },

    /// One target file reconciled
    TargetReconciled { path: PathBuf, changed: bool },

    /// Change notification delivered
    NotificationSent { current: PublicAddress },

    /// Cycle abandoned; the next cycle retries
    CycleAbandoned {
        component: &'static str,
        error: String,
    },

    /// Loop stopped
    Stopped { reason: String },
}

/// Result of a completed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing to do
    Unchanged { address: PublicAddress },

    /// Targets rewritten and notification delivered
    Changed {
        previous: Option<PublicAddress>,
        current: PublicAddress,
    },
}

/// Keeps target files in sync with the public address
///
/// ## Lifecycle
///
/// 1. Create with [`ReconciliationLoop::new()`]
/// 2. Start with [`ReconciliationLoop::run()`], or drive single passes with
///    [`ReconciliationLoop::run_cycle()`]
/// 3. Loop runs until a shutdown signal is received
///
/// ## Shutdown
///
/// Shutdown interrupts resolving and sleeping only. Once a change has been
/// detected, persisting, rewriting and notifying complete before the loop
/// exits, so a change is never half-applied by a signal.
pub struct ReconciliationLoop {
    /// Public address lookup
    resolver: Box<dyn AddressResolver>,

    /// Last confirmed address
    state_store: Box<dyn StateStore>,

    /// Change announcements
    notifier: Box<dyn Notifier>,

    /// Files to rewrite, in order
    targets: Vec<TargetFile>,

    reconciler: TextReconciler,

    /// Retries lookups and deliveries
    retry: RetryRunner,

    /// Inter-cycle wait
    sleeper: Arc<dyn Sleeper>,

    cycle_interval: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<LoopEvent>,
}

impl ReconciliationLoop {
    /// Create a new reconciliation loop
    ///
    /// # Parameters
    ///
    /// - `resolver`: Address resolver implementation
    /// - `state_store`: State store implementation
    /// - `notifier`: Notifier implementation
    /// - `config`: Validated before use; supplies targets and timings
    ///
    /// # Returns
    ///
    /// A tuple of (loop, event_receiver) where event_receiver yields loop events
    pub fn new(
        resolver: Box<dyn AddressResolver>,
        state_store: Box<dyn StateStore>,
        notifier: Box<dyn Notifier>,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<LoopEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);

        let engine = Self {
            resolver,
            state_store,
            notifier,
            targets: config.targets,
            reconciler: TextReconciler::new(),
            retry: RetryRunner::with_sleeper(config.engine.retry_backoff(), sleeper.clone()),
            sleeper,
            cycle_interval: config.engine.cycle_interval(),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Replace the sleeper used for retry backoff and the inter-cycle wait
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.retry = RetryRunner::with_sleeper(self.retry.backoff(), sleeper.clone());
        self.sleeper = sleeper;
        self
    }

    /// Run the loop until Ctrl-C
    ///
    /// The signal is latched by a listener task for the whole run, so a
    /// Ctrl-C during reconciliation or notification stops the loop before
    /// its next sleep.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    pub async fn run(&self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let listener = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    let _ = shutdown_tx.send(());
                }
                Err(e) => {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    // Keep the sender alive so the loop is not stopped
                    std::future::pending::<()>().await;
                }
            }
        });

        let result = self.run_with_shutdown(Some(shutdown_rx)).await;
        listener.abort();
        result
    }

    /// Run the loop until `shutdown_rx` fires
    ///
    /// With `None` the loop runs until the task is dropped. The daemon
    /// passes a receiver fed by its SIGTERM/SIGINT handler.
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let mut shutdown = match shutdown_rx {
            Some(rx) => Shutdown::Channel(rx),
            None => Shutdown::Never,
        };

        self.emit_event(LoopEvent::Started {
            targets_count: self.targets.len(),
        });
        info!(
            targets = self.targets.len(),
            interval_secs = self.cycle_interval.as_secs(),
            "Reconciliation loop started"
        );

        loop {
            let current = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                address = self.resolve() => address,
            };

            if let Err(e) = self.process_address(current).await {
                self.abandon_cycle(&e);
            }

            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = self.sleeper.sleep(self.cycle_interval) => {}
            }
        }

        info!("Shutdown signal received");
        self.emit_event(LoopEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });

        Ok(())
    }

    /// Run a single cycle without the trailing sleep
    ///
    /// # Returns
    ///
    /// - `Ok(CycleOutcome)`: The cycle completed
    /// - `Err(Error::Storage | Error::NoMatch | Error::Io)`: The cycle was
    ///   abandoned; the persisted address was restored
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let current = self.resolve().await;
        let outcome = self.process_address(current).await;
        if let Err(e) = &outcome {
            self.abandon_cycle(e);
        }
        outcome
    }

    /// Resolve the public address, retrying until it succeeds
    async fn resolve(&self) -> PublicAddress {
        let address = self
            .retry
            .run_until_success("resolve", || self.resolver.resolve())
            .await;

        debug!(
            resolver = self.resolver.resolver_name(),
            address = %address,
            "Public address resolved"
        );
        self.emit_event(LoopEvent::AddressResolved { address });
        address
    }

    /// Compare, reconcile and notify for a resolved address
    async fn process_address(&self, current: PublicAddress) -> Result<CycleOutcome> {
        let previous = self.state_store.read_last().await?;

        if previous == Some(current) {
            info!(current = %current, "Public address unchanged");
            self.emit_event(LoopEvent::Unchanged { address: current });
            return Ok(CycleOutcome::Unchanged { address: current });
        }

        info!(
            previous = %display_previous(previous),
            current = %current,
            "Public address changed"
        );
        self.emit_event(LoopEvent::AddressChanged { previous, current });

        // Commit first so a crash mid-edit is not re-announced as a new change
        self.state_store.write_last(&current).await?;

        for target in &self.targets {
            match self.reconciler.apply_rules(target, &current).await {
                Ok(report) => {
                    info!(
                        path = %report.path.display(),
                        changed = report.changed,
                        "Target file reconciled"
                    );
                    self.emit_event(LoopEvent::TargetReconciled {
                        path: report.path,
                        changed: report.changed,
                    });
                }
                Err(e) => {
                    error!(
                        path = %target.path.display(),
                        component = e.component(),
                        error = %e,
                        "Failed to reconcile target file"
                    );
                    self.restore_previous(previous).await;
                    return Err(e);
                }
            }
        }

        let message = NotificationMessage::new(previous, current);
        self.retry
            .run_until_success("notify", || self.notifier.notify(&message))
            .await;

        info!(
            notifier = self.notifier.notifier_name(),
            current = %current,
            "Change notification delivered"
        );
        self.emit_event(LoopEvent::NotificationSent { current });

        Ok(CycleOutcome::Changed { previous, current })
    }

    /// Put the persisted address back to its pre-cycle value
    async fn restore_previous(&self, previous: Option<PublicAddress>) {
        let result = match previous {
            Some(address) => self.state_store.write_last(&address).await,
            None => self.state_store.clear().await,
        };

        match result {
            Ok(()) => debug!(
                previous = %display_previous(previous),
                "Persisted address restored"
            ),
            Err(e) => error!(
                component = e.component(),
                error = %e,
                "Failed to restore persisted address"
            ),
        }
    }

    fn abandon_cycle(&self, e: &Error) {
        error!(
            component = e.component(),
            error = %e,
            "Cycle abandoned, retrying next cycle"
        );
        self.emit_event(LoopEvent::CycleAbandoned {
            component: e.component(),
            error: e.to_string(),
        });
    }

    /// Emit a loop event
    fn emit_event(&self, event: LoopEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(TrySendError::Closed(_)) => {
                trace!("No event receiver, dropping event");
            }
        }
    }
}

fn display_previous(previous: Option<PublicAddress>) -> String {
    previous
        .map(|a| a.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Source of the shutdown request
enum Shutdown {
    Channel(oneshot::Receiver<()>),
    Never,
    Fired,
}

impl Shutdown {
    /// Resolve once shutdown has been requested
    ///
    /// A dropped sender counts as a request.
    async fn recv(&mut self) {
        match self {
            Shutdown::Channel(rx) => {
                let _ = rx.await;
            }
            Shutdown::Never => std::future::pending::<()>().await,
            Shutdown::Fired => return,
        }
        *self = Shutdown::Fired;
    }
}
