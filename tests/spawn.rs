//! Tests for running drivers on a `TaskTracker`.

mod common;

use std::time::Duration;

use common::{Call, Probe, next_call, start};
use rstest::rstest;
use serial_test::serial;
use tokio_util::task::TaskTracker;
use tracing_test::traced_test;
use wsengine::{CloseCode, ConnectionDriver, DriverConfig, active_connection_count, spawn_driver};
use wsengine_testing::{LoggerHandle, logger, upgraded_pair};

/// A handler that panics on its first message must not take the runtime
/// down. The panic is logged with the connection's peer address and the
/// join handle yields `None`.
#[rstest]
#[traced_test]
#[serial]
#[tokio::test]
async fn panicking_handler_is_contained(mut logger: LoggerHandle) {
    let (probe, _calls) = Probe::echo();
    let probe = probe.on_frame(|_, _, _| panic!("boom"));
    let (upgraded, mut client) = upgraded_pair().await.expect("socket pair");
    let transport = upgraded.takeover().expect("takeover succeeds");
    let tracker = TaskTracker::new();

    let join = spawn_driver(ConnectionDriver::new(transport, probe, DriverConfig::default()), &tracker);
    client.send_text("trigger").await.expect("send");

    let result = tokio::time::timeout(Duration::from_secs(2), join)
        .await
        .expect("task ends")
        .expect("join succeeds");
    assert!(result.is_none());
    assert!(client.drain().await.expect("socket released").is_empty());

    let panics = logger.messages_containing("connection task panicked");
    assert!(
        panics
            .iter()
            .any(|message| message.contains("boom") && message.contains("peer_addr")),
        "panic record missing details: {panics:?}"
    );
}

#[rstest]
#[serial]
#[tokio::test]
async fn spawned_driver_yields_outcome() {
    let (probe, _calls) = Probe::echo();
    let (upgraded, mut client) = upgraded_pair().await.expect("socket pair");
    let transport = upgraded.takeover().expect("takeover succeeds");
    let tracker = TaskTracker::new();
    let driver = ConnectionDriver::new(transport, probe, DriverConfig::default());
    let handle = driver.handle();

    let join = spawn_driver(driver, &tracker);
    handle.close(CloseCode::Normal, "done");
    assert_eq!(client.expect_close().await.expect("close").0, 1000);

    tracker.close();
    tracker.wait().await;
    let outcome = join.await.expect("join succeeds").expect("no panic");
    assert_eq!(outcome.code, CloseCode::Normal);
    assert_eq!(outcome.reason, "done");
}

#[rstest]
#[serial]
#[tokio::test]
async fn active_count_tracks_running_drivers() {
    let baseline = active_connection_count();
    let (probe, mut calls) = Probe::echo();
    let mut conn = start(probe).await;
    assert_eq!(next_call(&mut calls).await, Call::Begin);
    assert_eq!(active_connection_count(), baseline + 1);

    conn.client.send_close(1000, "").await.expect("send close");
    conn.client.expect_close().await.expect("close reply");
    conn.outcome().await;
    assert_eq!(active_connection_count(), baseline);
}
