//! Contract Test: Shutdown Determinism
//!
//! Constraints verified:
//! - The tick loop terminates on the shutdown signal
//! - A dropped shutdown sender also stops the loop
//! - A tick in progress completes before the loop exits
//! - Started and Stopped are emitted exactly once
//!
//! If this test fails, someone has added detached tasks, tasks that ignore
//! the shutdown signal, or a shutdown path that can hang.

mod common;

use common::*;
use std::time::Duration;
use tokio_test::assert_ok;
use wemo_core::config::SchedulerConfig;
use wemo_core::{Action, EngineEvent};

#[tokio::test]
async fn shutdown_signal_terminates_engine() {
    let lamp = MockDevice::new("Lamp");
    let Harness {
        engine, mut events, ..
    } = Harness::new(
        vec![fixed_job("a", "Lamp", Action::On, "07:00")],
        MockDirectory::with_devices(&[&lamp]),
        FixedSolar::default(),
        monday_at(7, 0, 0),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let engine_handle =
        tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(shutdown_tx.send(()).is_ok(), "shutdown signal send succeeds");

    let result = tokio::time::timeout(Duration::from_secs(5), engine_handle).await;
    let joined = assert_ok!(result, "Engine should terminate within 5 seconds");
    assert_ok!(joined.unwrap());

    // The first tick runs immediately
    assert_eq!(lamp.on_calls(), 1);

    assert_eq!(events.recv().await, Some(EngineEvent::Started { jobs: 1 }));
    let mut rest = Vec::new();
    while let Some(event) = events.recv().await {
        rest.push(event);
    }
    assert!(matches!(rest.first(), Some(EngineEvent::JobFired { .. })));
    assert!(matches!(rest.last(), Some(EngineEvent::Stopped { .. })));
    assert_eq!(
        rest.iter()
            .filter(|e| matches!(e, EngineEvent::Stopped { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn dropped_sender_stops_engine() {
    let Harness { engine, .. } = Harness::new(
        vec![],
        MockDirectory::default(),
        FixedSolar::default(),
        monday_at(7, 0, 0),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let engine_handle =
        tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    drop(shutdown_tx);

    let result = tokio::time::timeout(Duration::from_secs(5), engine_handle).await;
    let joined = assert_ok!(result, "Engine should stop when the sender goes away");
    assert_ok!(joined.unwrap());
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_tick_in_progress() {
    let lamp = MockDevice::new("Lamp");
    lamp.set_hanging(true);
    let config = SchedulerConfig {
        action_timeout_secs: 3,
        ..SchedulerConfig::default()
    };
    let Harness {
        engine, mut events, ..
    } = Harness::with_config(
        vec![fixed_job("a", "Lamp", Action::On, "07:00")],
        MockDirectory::with_devices(&[&lamp]),
        FixedSolar::default(),
        monday_at(7, 0, 0),
        config,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let started = tokio::time::Instant::now();
    let engine_handle =
        tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    shutdown_tx.send(()).unwrap();

    engine_handle.await.unwrap().unwrap();
    assert!(started.elapsed() >= Duration::from_secs(3));

    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event);
    }
    assert!(matches!(seen[0], EngineEvent::Started { .. }));
    assert!(matches!(seen[1], EngineEvent::ActionFailed { .. }));
    assert!(matches!(seen[2], EngineEvent::Stopped { .. }));
}
