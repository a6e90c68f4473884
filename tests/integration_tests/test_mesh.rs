// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use dchat_client_rs::models::pdu::ContentType;
use serial_test::serial;

use crate::integration_tests::common::{
    TestPeer, endpoint, identity, spawn_fake_relay, start_core,
};

const ALICE: &str = "aaaaaaaaaaaaaaaa.onion";
const BOB: &str = "bbbbbbbbbbbbbbbb.onion";
const CAROL: &str = "cccccccccccccccc.onion";

#[tokio::test]
#[serial]
async fn gossip_about_unknown_peers_triggers_dialing() {
    let mut relay = spawn_fake_relay(vec![]).await;
    let mut alice = start_core(ALICE, "alice", relay.addr).await;

    // bob connects and gossips about carol
    let mut bob = TestPeer::connect(alice.addr, identity(BOB, 7777, "bob")).await;
    let _hello = bob.recv_pdu().await;
    bob.send_discover(&[endpoint(CAROL, 7878)]).await;

    // alice dials the unknown peer through the relay
    let circuit = relay.next_circuit().await;
    assert_eq!(circuit.host, CAROL);
    assert_eq!(circuit.port, 7878);

    // the discover to carol names alice herself and bob, never carol
    let mut carol = TestPeer::from_stream(circuit.stream, identity(CAROL, 7878, "carol"));
    let hello = carol.recv_pdu().await;
    assert_eq!(hello.content_type, ContentType::ControlDiscover);
    let gossip = String::from_utf8(hello.content.to_vec()).expect("ascii");
    assert!(gossip.contains(&format!("{ALICE} ")), "got '{gossip}'");
    assert!(gossip.contains(&format!("{BOB} 7777")), "got '{gossip}'");
    assert!(!gossip.contains(CAROL), "got '{gossip}'");

    carol.send_discover(&[endpoint(BOB, 7777)]).await;
    carol.send_text("three of us now").await;
    assert_eq!(alice.expect_message().await.0, "carol");

    // both peers are listed
    alice.handles.lines.send("/list".to_owned()).await.expect("list");
    let listing = alice.expect_info().await;
    assert!(listing.contains(BOB), "got '{listing}'");
    assert!(listing.contains(CAROL), "got '{listing}'");
}

#[tokio::test]
#[serial]
async fn known_peers_in_gossip_are_not_redialed() {
    let mut relay = spawn_fake_relay(vec![]).await;
    let mut alice = start_core(ALICE, "alice", relay.addr).await;

    let mut bob = TestPeer::connect(alice.addr, identity(BOB, 7777, "bob")).await;
    let _hello = bob.recv_pdu().await;
    // bob's gossip names alice herself and bob: both already known
    let me = alice.identity.clone();
    bob.send_discover(&[endpoint(ALICE, me.listen_port)]).await;

    bob.send_text("no new peers").await;
    let _ = alice.expect_message().await;

    // no circuit was requested
    assert!(
        tokio::time::timeout(
            std::time::Duration::from_millis(300),
            relay.next_circuit()
        )
        .await
        .is_err(),
        "gossip about known peers must not dial"
    );
}

#[tokio::test]
#[serial]
async fn simultaneous_open_converges_deterministically() {
    let mut relay = spawn_fake_relay(vec![]).await;
    let mut alice = start_core(ALICE, "alice", relay.addr).await;

    // alice dials bob: the connecting session
    alice.handles.connects.send(endpoint(BOB, 7777)).expect("request");
    let circuit = relay.next_circuit().await;
    let mut bob_dialed = TestPeer::from_stream(circuit.stream, identity(BOB, 7777, "bob"));
    let _hello = bob_dialed.recv_pdu().await;
    bob_dialed.send_discover(&[]).await;
    bob_dialed.send_text("over the dialed session").await;
    let _ = alice.expect_message().await;

    // bob dials alice at the same time: the accepting session
    let mut bob_accepted = TestPeer::connect(alice.addr, identity(BOB, 7777, "bob")).await;
    let _hello = bob_accepted.recv_pdu().await;
    bob_accepted.send_discover(&[]).await;

    // alice's pair is the lesser one, so she keeps the accepting slot and
    // closes the session she dialed
    bob_dialed.expect_closed().await;

    bob_accepted.send_text("the surviving session").await;
    assert_eq!(
        alice.expect_message().await,
        ("bob".to_owned(), "the surviving session".to_owned())
    );

    // exactly one slot remains for bob
    alice.handles.lines.send("/list".to_owned()).await.expect("list");
    let listing = alice.expect_info().await;
    assert_eq!(listing.matches(BOB).count(), 1, "got '{listing}'");
}
