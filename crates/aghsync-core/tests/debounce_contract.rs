//! Contract Test: Poll Guard & Glitch Debounce
//!
//! Constraints verified:
//! - Only one read is outstanding at a time; overlapping polls are no-ops
//! - One failure directly after a fresh login is suppressed
//! - Failures without a fresh login are reported immediately
//! - A success closes the suppression window
//! - Shutdown cancels a stalled read and clears the in-flight flag

mod common;

use aghsync_core::{EngineEvent, MemoryTimerStore, ReconciliationEngine, TriState};
use common::*;
use std::time::Duration;

fn engine_with(
    client: &MockProtectionClient,
    glitch_tolerance: u32,
) -> (
    ReconciliationEngine,
    tokio::sync::mpsc::Receiver<EngineEvent>,
) {
    let mut config = minimal_config();
    config.engine.glitch_tolerance = glitch_tolerance;
    ReconciliationEngine::new(
        Box::new(MockProtectionClient::sharing_counters_with(client)),
        Box::new(MemoryTimerStore::new()),
        &config,
    )
    .expect("engine construction succeeds")
}

#[tokio::test]
async fn overlapping_polls_issue_one_read() {
    let client = MockProtectionClient::new(true);
    client.set_read_delay(Duration::from_millis(100));
    let (engine, _rx) = engine_with(&client, 1);

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.poll().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(engine.poll().await, None);
    // get() triggers a refresh that also finds the read in flight
    assert_eq!(engine.get(), TriState::Off);
    settle().await;

    assert_eq!(first.await.unwrap(), Some(TriState::On));
    assert_eq!(client.read_count(), 1);
}

#[tokio::test]
async fn single_failure_after_login_is_suppressed() {
    let client = MockProtectionClient::new(true);
    let (engine, mut rx) = engine_with(&client, 1);
    client.bump_epoch();
    assert_eq!(engine.poll().await, Some(TriState::On));

    // Session renewed, then the next read races an unrelated router login
    client.bump_epoch();
    client.set_fail_reads(true);

    assert_eq!(engine.poll().await, Some(TriState::On));
    assert_eq!(engine.poll().await, Some(TriState::Jammed));

    let events = drain_events(&mut rx);
    let suppressed = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::GlitchSuppressed { .. }))
        .count();
    assert_eq!(suppressed, 1);
}

#[tokio::test]
async fn failure_without_login_is_reported_immediately() {
    let client = MockProtectionClient::new(true);
    let (engine, _rx) = engine_with(&client, 1);
    assert_eq!(engine.poll().await, Some(TriState::On));

    client.set_fail_reads(true);
    assert_eq!(engine.poll().await, Some(TriState::Jammed));
}

#[tokio::test]
async fn success_closes_suppression_window() {
    let client = MockProtectionClient::new(true);
    let (engine, _rx) = engine_with(&client, 1);

    client.bump_epoch();
    assert_eq!(engine.poll().await, Some(TriState::On));

    client.set_fail_reads(true);
    assert_eq!(engine.poll().await, Some(TriState::Jammed));
}

#[tokio::test]
async fn zero_tolerance_disables_debounce() {
    let client = MockProtectionClient::new(true);
    let (engine, _rx) = engine_with(&client, 0);
    assert_eq!(engine.poll().await, Some(TriState::On));

    client.bump_epoch();
    client.set_fail_reads(true);
    assert_eq!(engine.poll().await, Some(TriState::Jammed));
}

#[tokio::test]
async fn wider_tolerance_suppresses_more_failures() {
    let client = MockProtectionClient::new(true);
    let (engine, _rx) = engine_with(&client, 2);
    assert_eq!(engine.poll().await, Some(TriState::On));

    client.bump_epoch();
    client.set_fail_reads(true);
    assert_eq!(engine.poll().await, Some(TriState::On));
    assert_eq!(engine.poll().await, Some(TriState::On));
    assert_eq!(engine.poll().await, Some(TriState::Jammed));
}

#[tokio::test]
async fn shutdown_interrupts_stalled_read() {
    let client = MockProtectionClient::new(true);
    client.set_read_delay(Duration::from_secs(30));
    let (engine, mut rx) = engine_with(&client, 1);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let runner = engine.clone();
    let handle = tokio::spawn(async move { runner.run_with_shutdown(Some(shutdown_rx)).await });
    settle().await;
    assert_eq!(client.read_count(), 1);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_millis(500), handle)
        .await
        .expect("engine stops promptly")
        .unwrap()
        .unwrap();

    let events = drain_events(&mut rx);
    assert!(matches!(events.first(), Some(EngineEvent::Started { .. })));
    assert!(matches!(events.last(), Some(EngineEvent::Stopped { .. })));

    // The cancelled read released the guard
    client.set_read_delay(Duration::ZERO);
    assert_eq!(engine.poll().await, Some(TriState::On));
}
