//! Contract Test: Abandoned Cycles & Recovery
//!
//! Constraints verified:
//! - A rule that matches nothing abandons the cycle, leaves the file
//!   untouched and sends no notification
//! - The persisted address is restored to its pre-cycle value, so the next
//!   cycle detects the same change and retries the edit
//! - Storage failures abandon the cycle without touching targets
//! - No failure stops the loop
//!
//! If this test fails, a failed edit can be silently forgotten.

mod common;

use common::*;
use ipsync_core::state::FileStateStore;
use ipsync_core::{CycleOutcome, Error, LoopEvent, ReconciliationLoop, StateStore};
use std::fs;
use std::sync::Arc;

#[tokio::test]
async fn missing_pattern_abandons_cycle_and_restores_state() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_target(dir.path(), "app.conf", "address 1.2.3.4\n");

    let store = CountingStateStore::with_address("1.2.3.4");
    let notifier = RecordingNotifier::new();

    let (engine, mut events) = ReconciliationLoop::new(
        Box::new(ScriptedResolver::fixed("5.6.7.8")),
        Box::new(store.clone()),
        Box::new(notifier.clone()),
        test_config(vec![host_target(&target)]),
    )
    .unwrap();

    let err = engine.run_cycle().await.unwrap_err();

    assert!(matches!(err, Error::NoMatch { .. }), "got {:?}", err);
    assert_eq!(fs::read_to_string(&target).unwrap(), "address 1.2.3.4\n");
    assert_eq!(store.current().await, Some(addr("1.2.3.4")));
    assert_eq!(notifier.attempts(), 0);
    assert!(drain_events(&mut events).iter().any(|e| matches!(
        e,
        LoopEvent::CycleAbandoned {
            component: "reconciler",
            ..
        }
    )));
}

#[tokio::test]
async fn next_cycle_retries_the_failed_edit() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_target(dir.path(), "app.conf", "address 1.2.3.4\n");

    let store = CountingStateStore::with_address("1.2.3.4");
    let notifier = RecordingNotifier::new();

    let (engine, _events) = ReconciliationLoop::new(
        Box::new(ScriptedResolver::fixed("5.6.7.8")),
        Box::new(store.clone()),
        Box::new(notifier.clone()),
        test_config(vec![host_target(&target)]),
    )
    .unwrap();

    assert!(engine.run_cycle().await.is_err());

    // Operator fixes the file between cycles
    fs::write(&target, "host=1.2.3.4\n").unwrap();

    assert_eq!(
        engine.run_cycle().await.unwrap(),
        CycleOutcome::Changed {
            previous: Some(addr("1.2.3.4")),
            current: addr("5.6.7.8"),
        }
    );
    assert_eq!(fs::read_to_string(&target).unwrap(), "host=5.6.7.8\n");
    assert_eq!(notifier.delivered().len(), 1);
}

#[tokio::test]
async fn failed_first_run_clears_state() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_target(dir.path(), "app.conf", "nothing to see\n");

    let store = CountingStateStore::new();

    let (engine, _events) = ReconciliationLoop::new(
        Box::new(ScriptedResolver::fixed("5.6.7.8")),
        Box::new(store.clone()),
        Box::new(RecordingNotifier::new()),
        test_config(vec![host_target(&target)]),
    )
    .unwrap();

    assert!(engine.run_cycle().await.is_err());
    assert_eq!(store.current().await, None);
    assert_eq!(store.clears(), 1);
}

#[tokio::test]
async fn later_target_failure_keeps_earlier_edit_and_retries_all() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_target(dir.path(), "first.conf", "host=1.2.3.4\n");
    let second = write_target(dir.path(), "second.conf", "no host line\n");

    let store = CountingStateStore::with_address("1.2.3.4");

    let (engine, _events) = ReconciliationLoop::new(
        Box::new(ScriptedResolver::fixed("5.6.7.8")),
        Box::new(store.clone()),
        Box::new(RecordingNotifier::new()),
        test_config(vec![host_target(&first), host_target(&second)]),
    )
    .unwrap();

    assert!(engine.run_cycle().await.is_err());
    assert_eq!(fs::read_to_string(&first).unwrap(), "host=5.6.7.8\n");
    assert_eq!(store.current().await, Some(addr("1.2.3.4")));

    fs::write(&second, "host=1.2.3.4\n").unwrap();
    engine.run_cycle().await.unwrap();

    assert_eq!(fs::read_to_string(&first).unwrap(), "host=5.6.7.8\n");
    assert_eq!(fs::read_to_string(&second).unwrap(), "host=5.6.7.8\n");
}

#[tokio::test]
async fn storage_failure_abandons_before_any_edit() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_target(dir.path(), "app.conf", "host=1.2.3.4");

    let store = CountingStateStore::with_address("1.2.3.4");
    store.fail_writes(true);
    let notifier = RecordingNotifier::new();

    let (engine, _events) = ReconciliationLoop::new(
        Box::new(ScriptedResolver::fixed("5.6.7.8")),
        Box::new(store.clone()),
        Box::new(notifier.clone()),
        test_config(vec![host_target(&target)]),
    )
    .unwrap();

    let err = engine.run_cycle().await.unwrap_err();

    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(fs::read_to_string(&target).unwrap(), "host=1.2.3.4");
    assert_eq!(notifier.attempts(), 0);
}

#[tokio::test]
async fn corrupted_state_file_abandons_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_target(dir.path(), "app.conf", "host=1.2.3.4");
    let state_path = dir.path().join("last_address");
    fs::write(&state_path, "garbage").unwrap();

    let (engine, _events) = ReconciliationLoop::new(
        Box::new(ScriptedResolver::fixed("5.6.7.8")),
        Box::new(FileStateStore::new(&state_path)),
        Box::new(RecordingNotifier::new()),
        test_config(vec![host_target(&target)]),
    )
    .unwrap();

    let err = engine.run_cycle().await.unwrap_err();

    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(fs::read_to_string(&target).unwrap(), "host=1.2.3.4");
}

#[tokio::test]
async fn file_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_target(dir.path(), "app.conf", "host=1.2.3.4");
    let state_path = dir.path().join("state").join("last_address");
    let notifier = RecordingNotifier::new();

    for _ in 0..2 {
        let (engine, _events) = ReconciliationLoop::new(
            Box::new(ScriptedResolver::fixed("5.6.7.8")),
            Box::new(FileStateStore::new(&state_path)),
            Box::new(notifier.clone()),
            test_config(vec![host_target(&target)]),
        )
        .unwrap();
        engine.run_cycle().await.unwrap();
    }

    assert_eq!(notifier.delivered().len(), 1, "restart must not re-announce");
    assert_eq!(fs::read_to_string(&state_path).unwrap(), "5.6.7.8");
    assert_eq!(
        FileStateStore::new(&state_path).read_last().await.unwrap(),
        Some(addr("5.6.7.8"))
    );
}

#[tokio::test]
async fn loop_keeps_running_after_abandoned_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_target(dir.path(), "app.conf", "no host line\n");

    let resolver = ScriptedResolver::fixed("5.6.7.8");
    let (sleeper, shutdown_rx) = RecordingSleeper::stopping_after(3);

    let (engine, mut events) = ReconciliationLoop::new(
        Box::new(resolver.clone()),
        Box::new(CountingStateStore::new()),
        Box::new(RecordingNotifier::new()),
        test_config(vec![host_target(&target)]),
    )
    .unwrap();
    let engine = engine.with_sleeper(Arc::new(sleeper));

    engine.run_with_shutdown(Some(shutdown_rx)).await.unwrap();

    assert_eq!(resolver.calls(), 3);
    let abandoned = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, LoopEvent::CycleAbandoned { .. }))
        .count();
    assert_eq!(abandoned, 3);
}
