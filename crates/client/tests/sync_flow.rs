// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

mod common;
use common::*;

use mx_client::{Client, ClientEvent, SyncState, TransportError};
use mx_core::{Direction, EventKey, Notification};
use serde_json::json;
use std::cmp::Ordering;

#[tokio::test]
async fn cold_start_transitions_exactly() {
    let transport = ScriptedTransport::new();
    let client = Client::new(config(), transport.clone()).unwrap();
    let mut rx = client.subscribe();
    let sync = client.start();

    transport.feed_json(batch("s1", vec![message("$1", "@a:example.org", "one")]));
    assert_eq!(next_state(&mut rx).await, (None, SyncState::Prepared));
    transport.feed_json(batch("s2", vec![message("$2", "@a:example.org", "two")]));
    assert_eq!(next_state(&mut rx).await, (Some(SyncState::Prepared), SyncState::Syncing));
    transport.feed_json(batch("s3", vec![]));
    assert_eq!(next_state(&mut rx).await, (Some(SyncState::Syncing), SyncState::Syncing));

    let room = client.room(ROOM).await.unwrap();
    assert_eq!(room.live_timeline().keys(), vec![EventKey::id("$1"), EventKey::id("$2")]);

    sync.stop();
    assert_eq!(next_state(&mut rx).await, (Some(SyncState::Syncing), SyncState::Stopped));
    within(sync.join()).await;
}

#[tokio::test]
async fn timeline_events_arrive_in_order_with_their_room() {
    let transport = ScriptedTransport::new();
    let client = Client::new(config(), transport.clone()).unwrap();
    let mut rx = client.subscribe();
    let _sync = client.start();

    transport.feed_json(batch("s1", vec![message("$1", "@a:example.org", "one"), message("$2", "@a:example.org", "two")]));

    let mut seen = Vec::new();
    loop {
        match within(rx.recv()).await.unwrap() {
            ClientEvent::Room(Notification::TimelineEvent { room_id, event_key, to_start, .. }) => {
                assert_eq!(room_id, ROOM);
                assert!(!to_start);
                seen.push(event_key);
            }
            // Room notifications are published before the state change
            ClientEvent::SyncStateChanged { .. } => break,
            _ => {}
        }
    }
    assert_eq!(seen, vec![EventKey::id("$1"), EventKey::id("$2")]);
}

#[tokio::test]
async fn gap_resets_the_live_timeline() {
    let transport = ScriptedTransport::new();
    let client = Client::new(config(), transport.clone()).unwrap();
    let mut rx = client.subscribe();
    let _sync = client.start();

    transport.feed_json(batch("s1", vec![message("$1", "@a:example.org", "one")]));
    next_state(&mut rx).await;
    transport.feed_json(json!({
        "next_batch": "s2",
        "rooms": {"join": {ROOM: {"timeline": {
            "events": [message("$9", "@a:example.org", "nine")],
            "limited": true,
            "prev_batch": "gap-token"
        }}}}
    }));

    let mut reset = false;
    loop {
        match within(rx.recv()).await.unwrap() {
            ClientEvent::Room(Notification::TimelineReset { room_id, .. }) => {
                assert_eq!(room_id, ROOM);
                reset = true;
            }
            ClientEvent::SyncStateChanged { .. } => break,
            _ => {}
        }
    }
    assert!(reset);

    let room = client.room(ROOM).await.unwrap();
    assert_eq!(room.live_timeline().keys(), vec![EventKey::id("$9")]);
    assert_eq!(room.live_timeline().pagination_token(Direction::Backwards), Some("gap-token"));
    // Without timeline support the old timeline is gone
    assert!(room.find_event(&EventKey::id("$1")).is_none());
}

#[tokio::test]
async fn timeline_support_keeps_old_timelines_reachable() {
    let transport = ScriptedTransport::new();
    let mut config = config();
    config.timeline_support = true;
    let client = Client::new(config, transport.clone()).unwrap();
    let mut rx = client.subscribe();
    let _sync = client.start();

    transport.feed_json(batch("s1", vec![message("$1", "@a:example.org", "one")]));
    next_state(&mut rx).await;
    transport.feed_json(json!({
        "next_batch": "s2",
        "rooms": {"join": {ROOM: {"timeline": {"events": [message("$9", "@a:example.org", "nine")], "limited": true}}}}
    }));
    next_state(&mut rx).await;

    let room = client.room(ROOM).await.unwrap();
    assert!(room.find_event(&EventKey::id("$1")).is_some());
    // The old live timeline is linked as the new one's backward neighbour
    assert_eq!(room.compare_event_ordering("$1", "$9"), Some(Ordering::Less));
}

#[tokio::test]
async fn errors_are_attached_to_transitions() {
    let transport = ScriptedTransport::new();
    let client = Client::new(config(), transport.clone()).unwrap();
    let mut rx = client.subscribe();
    let sync = client.start();

    transport.feed_json(batch("s1", vec![]));
    next_state(&mut rx).await;
    transport.feed(Err(TransportError::http(502, "M_UNKNOWN", "bad gateway")));

    let error = within(async {
        loop {
            if let ClientEvent::SyncStateChanged { new: SyncState::Reconnecting, error, .. } = rx.recv().await.unwrap() {
                return error;
            }
        }
    })
    .await;
    assert_eq!(error.and_then(|e| e.status), Some(502));

    // Skip the keep-alive wait, then recover
    transport.feed_json(batch("s2", vec![]));
    while !sync.retry_immediately() {
        tokio::task::yield_now().await;
    }
    assert_eq!(next_state(&mut rx).await, (Some(SyncState::Reconnecting), SyncState::Syncing));
}

#[tokio::test]
async fn invited_room_is_named_after_inviter() {
    let transport = ScriptedTransport::new();
    let client = Client::new(config(), transport.clone()).unwrap();
    let mut rx = client.subscribe();
    let _sync = client.start();

    let mut invite = member(ME, "invite", None);
    invite["sender"] = json!("@alice:example.org");
    transport.feed_json(json!({
        "next_batch": "s1",
        "rooms": {"invite": {"!inv:example.org": {"invite_state": {"events": [
            member("@alice:example.org", "join", Some("Alice Smith")),
            invite,
        ]}}}}
    }));
    next_state(&mut rx).await;

    let room = client.room("!inv:example.org").await.unwrap();
    assert_eq!(room.name(), "Alice Smith");
}
