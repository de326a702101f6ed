//! Tests for fanning messages out through a `BroadcastGroup`.

mod common;

use std::time::Duration;

use common::{Call, Probe, next_call, start_in_group};
use rstest::{fixture, rstest};
use wsengine::{BroadcastGroup, CloseCode, Opcode};
use wsengine_testing::{TEST_MASK, encode_client_frame};

#[fixture]
fn group() -> BroadcastGroup<String> { BroadcastGroup::new() }

#[rstest]
#[tokio::test]
async fn post_reaches_every_member(group: BroadcastGroup<String>) {
    let (probe_a, mut calls_a) = Probe::echo();
    let (probe_b, mut calls_b) = Probe::echo();
    let mut a = start_in_group(probe_a, &group).await;
    let mut b = start_in_group(probe_b, &group).await;
    assert_eq!(next_call(&mut calls_a).await, Call::Begin);
    assert_eq!(next_call(&mut calls_b).await, Call::Begin);

    assert_eq!(group.post("news".to_owned()), 2);

    for client in [&mut a.client, &mut b.client] {
        let (opcode, payload) = client.next_message().await.expect("broadcast");
        assert_eq!(opcode, Opcode::Text);
        assert_eq!(payload.as_ref(), b"news");
    }
    assert_eq!(next_call(&mut calls_a).await, Call::Broadcast("news".to_owned()));
    assert_eq!(next_call(&mut calls_b).await, Call::Broadcast("news".to_owned()));
}

#[rstest]
#[tokio::test]
async fn closed_member_leaves_group(group: BroadcastGroup<String>) {
    let (probe_a, mut calls_a) = Probe::echo();
    let (probe_b, mut calls_b) = Probe::echo();
    let a = start_in_group(probe_a, &group).await;
    let mut b = start_in_group(probe_b, &group).await;
    assert_eq!(next_call(&mut calls_a).await, Call::Begin);
    assert_eq!(next_call(&mut calls_b).await, Call::Begin);
    assert_eq!(group.len(), 2);

    let id = b.handle.id();
    b.client.send_close(1000, "").await.expect("send close");
    b.client.expect_close().await.expect("close reply");
    b.outcome().await;

    assert!(!group.contains(id));
    assert!(!group.wakeup(id));
    assert_eq!(group.len(), 1);
    assert!(group.contains(a.handle.id()));
    assert_eq!(group.post("after".to_owned()), 1);
}

#[rstest]
#[tokio::test]
async fn refused_broadcast_closes_connection(group: BroadcastGroup<String>) {
    let (probe, mut calls) = Probe::echo();
    let mut conn = start_in_group(probe.refuse_broadcasts(), &group).await;
    assert_eq!(next_call(&mut calls).await, Call::Begin);

    conn.handle.set_status(CloseCode::from(1013), "overloaded");
    group.post("drop me".to_owned());

    let (code, reason) = conn.client.expect_close().await.expect("close");
    assert_eq!(code, 1013);
    assert_eq!(reason, "overloaded");
}

#[rstest]
#[tokio::test]
async fn wakeup_without_messages_keeps_connection_open(group: BroadcastGroup<String>) {
    let (probe, mut calls) = Probe::echo();
    let mut conn = start_in_group(probe, &group).await;
    assert_eq!(next_call(&mut calls).await, Call::Begin);

    assert!(group.wakeup(conn.handle.id()));
    conn.client.send_text("still here").await.expect("send");
    let (_, payload) = conn.client.next_message().await.expect("echo");
    assert_eq!(payload.as_ref(), b"still here");
}

/// A peer that never stops sending must not hold broadcasts back.
#[rstest]
#[case::pongs(Opcode::Pong)]
#[case::text(Opcode::Text)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broadcast_arrives_while_peer_floods(group: BroadcastGroup<String>, #[case] opcode: Opcode) {
    let (probe, mut calls) = Probe::echo();
    let mut conn = start_in_group(probe.on_frame(|_, _, _| true), &group).await;
    assert_eq!(next_call(&mut calls).await, Call::Begin);

    let poster = group.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        poster.post("news".to_owned());
    });
    let frame = encode_client_frame(opcode.as_u8(), true, b"a", Some(TEST_MASK));
    let (kind, payload) = conn
        .client
        .flood_until_message(&frame)
        .await
        .expect("broadcast delivered during flood");

    assert_eq!(kind, Opcode::Text);
    assert_eq!(payload.as_ref(), b"news");
}
