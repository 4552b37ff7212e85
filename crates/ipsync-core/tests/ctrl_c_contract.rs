//! Contract Test: Ctrl-C Handling
//!
//! Constraints verified:
//! - `run()` latches a Ctrl-C that arrives while a cycle is notifying
//! - The loop then stops instead of entering its inter-cycle sleep
//!
//! Kept in its own test binary: it sends SIGINT to the test process.

#![cfg(unix)]

mod common;

use common::*;
use ipsync_core::ReconciliationLoop;
use std::fs;
use std::process::Command;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ctrl_c_during_notify_stops_loop() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_target(dir.path(), "app.conf", "host=1.2.3.4");
    let notifier = RecordingNotifier::slow(Duration::from_millis(800));

    let (engine, _events) = ReconciliationLoop::new(
        Box::new(ScriptedResolver::fixed("5.6.7.8")),
        Box::new(CountingStateStore::with_address("1.2.3.4")),
        Box::new(notifier.clone()),
        test_config(vec![host_target(&target)]),
    )
    .unwrap();

    let handle = tokio::spawn(async move { engine.run().await });

    while notifier.attempts() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = Command::new("kill")
        .args(["-INT", &std::process::id().to_string()])
        .status()
        .expect("run kill");
    assert!(status.success());

    timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stops instead of sleeping")
        .unwrap()
        .unwrap();

    assert_eq!(notifier.delivered().len(), 1);
    assert_eq!(fs::read_to_string(&target).unwrap(), "host=5.6.7.8");
}
