//! Test doubles and common utilities for loop contract tests
//!
//! Every double is cheap to clone and shares its counters between clones,
//! so a test can hand one clone to the loop and keep another to inspect.

#![allow(dead_code)]

use async_trait::async_trait;
use ipsync_core::config::{StateStoreConfig, SyncConfig};
use ipsync_core::error::{Error, Result};
use ipsync_core::reconcile::{SubstitutionRule, TargetFile};
use ipsync_core::retry::Sleeper;
use ipsync_core::state::MemoryStateStore;
use ipsync_core::traits::{AddressResolver, NotificationMessage, Notifier, StateStore};
use ipsync_core::{LoopEvent, PublicAddress};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Retry backoff used by [`test_config`]
pub const BACKOFF: Duration = Duration::from_secs(60);

/// Cycle interval used by [`test_config`]
pub const INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub fn addr(text: &str) -> PublicAddress {
    PublicAddress::parse(text).expect("valid test address")
}

/// Resolver that plays back a script of results
///
/// Once the script is exhausted it keeps answering with the steady address,
/// or keeps failing when there is none.
#[derive(Clone)]
pub struct ScriptedResolver {
    script: Arc<Mutex<VecDeque<Result<PublicAddress>>>>,
    steady: Option<PublicAddress>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedResolver {
    /// Always returns `address`
    pub fn fixed(address: &str) -> Self {
        Self::failing_then(0, address)
    }

    /// Fails `failures` times, then returns `address` forever
    pub fn failing_then(failures: usize, address: &str) -> Self {
        let script = (0..failures)
            .map(|i| Err(Error::lookup(format!("network unreachable (attempt {})", i + 1))))
            .collect();

        Self {
            script: Arc::new(Mutex::new(script)),
            steady: Some(addr(address)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns each address in turn, then keeps returning the last one
    pub fn sequence(addresses: &[&str]) -> Self {
        let steady = addresses.last().map(|a| addr(a));
        let script = addresses.iter().map(|a| Ok(addr(a))).collect();

        Self {
            script: Arc::new(Mutex::new(script)),
            steady,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Never succeeds
    pub fn unreachable() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            steady: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of resolve() calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressResolver for ScriptedResolver {
    async fn resolve(&self) -> Result<PublicAddress> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }

        self.steady
            .ok_or_else(|| Error::lookup("lookup service unreachable"))
    }

    fn resolver_name(&self) -> &'static str {
        "scripted"
    }
}

/// Notifier that records delivered messages
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    delivered: Arc<Mutex<Vec<NotificationMessage>>>,
    attempts: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
    delay: Duration,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the first `failures` deliveries
    pub fn failing(failures: usize) -> Self {
        let notifier = Self::default();
        notifier.failures_left.store(failures, Ordering::SeqCst);
        notifier
    }

    /// Takes `delay` of real time per delivery
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Successfully delivered messages
    pub fn delivered(&self) -> Vec<NotificationMessage> {
        self.delivered.lock().unwrap().clone()
    }

    /// Number of notify() calls, including rejected ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let rejected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(Error::delivery("relay unavailable"));
        }

        self.delivered.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "recording"
    }
}

/// Memory-backed state store that counts writes and can be made to fail
#[derive(Clone, Default)]
pub struct CountingStateStore {
    inner: MemoryStateStore,
    writes: Arc<AtomicUsize>,
    clears: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl CountingStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that already remembers `address`
    pub fn with_address(address: &str) -> Self {
        Self {
            inner: MemoryStateStore::with_address(addr(address)),
            ..Self::default()
        }
    }

    /// Make subsequent writes fail with a storage error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Currently persisted address
    pub async fn current(&self) -> Option<PublicAddress> {
        self.inner.read_last().await.expect("memory store never fails")
    }
}

#[async_trait]
impl StateStore for CountingStateStore {
    async fn read_last(&self) -> Result<Option<PublicAddress>> {
        self.inner.read_last().await
    }

    async fn write_last(&self, address: &PublicAddress) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::storage("disk full"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_last(address).await
    }

    async fn clear(&self) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear().await
    }
}

/// Sleeper that records requested waits and returns at once
///
/// Optionally fires a shutdown signal once the loop has slept through a
/// given number of cycle intervals.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    waits: Arc<Mutex<Vec<Duration>>>,
    stop: Arc<Mutex<Option<(usize, oneshot::Sender<()>)>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeper that requests shutdown after `cycles` cycle intervals
    pub fn stopping_after(cycles: usize) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let sleeper = Self {
            waits: Arc::default(),
            stop: Arc::new(Mutex::new(Some((cycles, tx)))),
        };
        (sleeper, rx)
    }

    /// All recorded waits, in order
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }

    /// Recorded waits of the given length
    pub fn waits_of(&self, duration: Duration) -> usize {
        self.waits().iter().filter(|d| **d == duration).count()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let interval_waits = {
            let mut waits = self.waits.lock().unwrap();
            waits.push(duration);
            waits.iter().filter(|d| **d == INTERVAL).count()
        };

        {
            let mut stop = self.stop.lock().unwrap();
            if stop.as_ref().is_some_and(|(cycles, _)| interval_waits >= *cycles)
                && let Some((_, tx)) = stop.take()
            {
                let _ = tx.send(());
            }
        }

        // Let other tasks run, as a real wait would
        tokio::task::yield_now().await;
    }
}

/// Write a target file into `dir`
pub fn write_target(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write target file");
    path
}

/// Target with the `host=` rule
pub fn host_target(path: &Path) -> TargetFile {
    TargetFile::new(
        path,
        vec![SubstitutionRule::new(r"host=[\d.]+", "host={new}").expect("valid rule")],
    )
}

/// Configuration with a memory store and the default timings
pub fn test_config(targets: Vec<TargetFile>) -> SyncConfig {
    SyncConfig::new(StateStoreConfig::Memory, targets)
}

/// Drain every event currently queued
pub fn drain_events(rx: &mut mpsc::Receiver<LoopEvent>) -> Vec<LoopEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
