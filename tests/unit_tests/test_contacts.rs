// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use dchat_client_rs::{
    contacts::{
        contact::{Contact, ContactState, Endpoint, PeerWriter},
        list::{ContactList, Find, GROW_STEP, Resolution},
    },
    errors::DchatError,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::unit_tests::{identity, socket_pair};

async fn writer() -> PeerWriter {
    let (client, _server) = socket_pair().await;
    // the far end is dropped; these contacts only exercise table logic
    let (_, write_half) = client.into_split();
    Arc::new(Mutex::new(write_half))
}

async fn outbound(endpoint: &Endpoint) -> Contact {
    Contact::outbound(writer().await, endpoint.clone(), CancellationToken::new())
}

async fn inbound_identified(endpoint: &Endpoint) -> Contact {
    let mut contact = Contact::inbound(writer().await, CancellationToken::new());
    contact.endpoint = Some(endpoint.clone());
    contact.state = ContactState::Identified;
    contact
}

fn endpoint(onion: &str, port: u16) -> Endpoint {
    Endpoint { onion_id: onion.parse().expect("onion"), port }
}

#[tokio::test]
async fn add_prefers_the_lowest_empty_slot() {
    let mut list = ContactList::new();
    let ep = endpoint("cccccccccccccccc.onion", 1000);

    let (s0, _) = list.add(outbound(&ep).await);
    let (s1, _) = list.add(outbound(&ep).await);
    let (s2, _) = list.add(outbound(&ep).await);
    assert_eq!((s0, s1, s2), (0, 1, 2));

    list.delete(s1).expect("delete");
    let (reused, _) = list.add(outbound(&ep).await);
    assert_eq!(reused, 1);
    assert_eq!(list.used(), 3);
}

#[tokio::test]
async fn used_count_tracks_occupied_slots() {
    let mut list = ContactList::new();
    let ep = endpoint("cccccccccccccccc.onion", 1000);

    let mut slots = Vec::new();
    for _ in 0..20 {
        slots.push(list.add(outbound(&ep).await).0);
    }
    assert_eq!(list.used(), 20);
    assert_eq!(list.used(), list.iter_occupied().count());
    // three steps of capacity for twenty slots
    assert_eq!(list.capacity(), 24);

    for slot in &slots[10..] {
        list.delete(*slot).expect("delete");
    }
    assert_eq!(list.used(), 10);
    assert_eq!(list.used(), list.iter_occupied().count());
}

#[tokio::test]
async fn capacity_grows_and_shrinks_by_steps() {
    let mut list = ContactList::new();
    let ep = endpoint("cccccccccccccccc.onion", 1000);

    let mut slots = Vec::new();
    for _ in 0..(GROW_STEP + 1) {
        slots.push(list.add(outbound(&ep).await).0);
    }
    assert_eq!(list.capacity(), 2 * GROW_STEP);

    // freeing the tail slot leaves a full step of trailing headroom
    list.delete(slots[GROW_STEP]).expect("delete tail");
    assert_eq!(list.capacity(), GROW_STEP);
    assert_eq!(list.used(), GROW_STEP);

    // capacity bound holds across the sequence
    assert!(list.capacity() >= list.used());
    assert!(list.capacity() <= list.used() + GROW_STEP);

    // draining the table keeps at least nothing to shrink below one step
    for slot in &slots[..GROW_STEP] {
        list.delete(*slot).expect("delete");
    }
    assert_eq!(list.used(), 0);
}

#[tokio::test]
async fn delete_rejects_bad_indices() {
    let mut list = ContactList::new();
    let ep = endpoint("cccccccccccccccc.onion", 1000);
    let (slot, _) = list.add(outbound(&ep).await);

    assert!(matches!(list.delete(999), Err(DchatError::Programming(_))));
    list.delete(slot).expect("first delete");
    assert!(matches!(list.delete(slot), Err(DchatError::Programming(_))));
}

#[tokio::test]
async fn find_matches_identified_slots_and_the_local_identity() {
    let me = identity("aaaaaaaaaaaaaaaa.onion", 7777, "alice");
    let mut list = ContactList::new();

    let bob = endpoint("bbbbbbbbbbbbbbbb.onion", 7777);
    let (bob_slot, _) = list.add(outbound(&bob).await);

    // an opening contact does not participate in lookups
    let (opening_slot, _) = list.add(Contact::inbound(writer().await, CancellationToken::new()));

    assert_eq!(list.find(&bob, 0, &me), Some(Find::Slot(bob_slot)));
    assert_eq!(list.find(&bob, bob_slot + 1, &me), None);
    assert_eq!(
        list.find(&endpoint("aaaaaaaaaaaaaaaa.onion", 7777), 0, &me),
        Some(Find::Local)
    );
    assert_eq!(list.find(&endpoint("dddddddddddddddd.onion", 1), 0, &me), None);
    let _ = opening_slot;
}

#[tokio::test]
async fn duplicate_resolution_is_complementary() {
    // A (lesser pair) and B (greater pair) each hold a connecting and an
    // accepting slot for the other after a simultaneous open.
    let alice = identity("aaaaaaaaaaaaaaaa.onion", 7777, "alice");
    let bob = identity("bbbbbbbbbbbbbbbb.onion", 7777, "bob");
    let ep_bob = endpoint("bbbbbbbbbbbbbbbb.onion", 7777);
    let ep_alice = endpoint("aaaaaaaaaaaaaaaa.onion", 7777);

    let mut a_list = ContactList::new();
    let (a_connecting, _) = a_list.add(outbound(&ep_bob).await);
    let (a_accepting, _) = a_list.add(inbound_identified(&ep_bob).await);

    let mut b_list = ContactList::new();
    let (b_connecting, _) = b_list.add(outbound(&ep_alice).await);
    let (b_accepting, _) = b_list.add(inbound_identified(&ep_alice).await);

    // alice < bob: the lesser endpoint keeps its accepting slot
    let a_res = a_list.duplicate_of(a_accepting, &alice).expect("resolution");
    assert_eq!(a_res, Resolution::Evict(a_connecting));

    // bob > alice: the greater endpoint keeps its connecting slot
    let b_res = b_list.duplicate_of(b_accepting, &bob).expect("resolution");
    assert_eq!(b_res, Resolution::Evict(b_accepting));
    let _ = b_connecting;
}

#[tokio::test]
async fn duplicate_resolution_starts_from_either_slot() {
    let alice = identity("aaaaaaaaaaaaaaaa.onion", 7777, "alice");
    let ep_bob = endpoint("bbbbbbbbbbbbbbbb.onion", 7777);

    let mut list = ContactList::new();
    let (connecting, _) = list.add(outbound(&ep_bob).await);
    let (accepting, _) = list.add(inbound_identified(&ep_bob).await);

    // the verdict is about the pair, not about which slot asked
    assert_eq!(
        list.duplicate_of(connecting, &alice).expect("res"),
        Resolution::Evict(connecting)
    );
    assert_eq!(
        list.duplicate_of(accepting, &alice).expect("res"),
        Resolution::Evict(connecting)
    );
}

#[tokio::test]
async fn a_unique_contact_resolves_to_unique() {
    let alice = identity("aaaaaaaaaaaaaaaa.onion", 7777, "alice");
    let mut list = ContactList::new();
    let (slot, _) = list.add(outbound(&endpoint("bbbbbbbbbbbbbbbb.onion", 7777)).await);
    assert_eq!(list.duplicate_of(slot, &alice).expect("res"), Resolution::Unique);
}

#[tokio::test]
async fn a_contact_matching_the_local_identity_is_evicted() {
    let alice = identity("aaaaaaaaaaaaaaaa.onion", 7777, "alice");
    let mut list = ContactList::new();
    let (slot, _) = list.add(inbound_identified(&endpoint("aaaaaaaaaaaaaaaa.onion", 7777)).await);
    assert_eq!(
        list.duplicate_of(slot, &alice).expect("res"),
        Resolution::Evict(slot)
    );
}

#[tokio::test]
async fn generations_distinguish_slot_occupants() {
    let mut list = ContactList::new();
    let ep = endpoint("cccccccccccccccc.onion", 1000);

    let (slot, first_gen) = list.add(outbound(&ep).await);
    list.delete(slot).expect("delete");
    let (reused, second_gen) = list.add(outbound(&ep).await);

    assert_eq!(slot, reused);
    assert_ne!(first_gen, second_gen);
    assert!(!list.check_generation(slot, first_gen));
    assert!(list.check_generation(slot, second_gen));
}
