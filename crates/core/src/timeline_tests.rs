// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;

fn msg(id: &str) -> Arc<Event> {
    Arc::new(Event::new(types::ROOM_MESSAGE, "@a:x", json!({"body": id})).with_id(id))
}

fn member(id: &str, user: &str, membership: &str, name: &str) -> Arc<Event> {
    Arc::new(
        Event::new(types::ROOM_MEMBER, user, json!({"membership": membership, "displayname": name}))
            .with_state_key(user)
            .with_id(id),
    )
}

#[test]
fn positions_increase_from_start_to_end() {
    let mut tl = Timeline::new(TimelineId(1), "!r:x");
    tl.add_event(msg("$b"), false, None).unwrap();
    tl.add_event(msg("$c"), false, None).unwrap();
    tl.add_event(msg("$a"), true, None).unwrap();

    let keys: Vec<_> = tl.keys();
    assert_eq!(keys, vec![EventKey::id("$a"), EventKey::id("$b"), EventKey::id("$c")]);
    let pa = tl.position_of(&EventKey::id("$a")).unwrap();
    let pb = tl.position_of(&EventKey::id("$b")).unwrap();
    let pc = tl.position_of(&EventKey::id("$c")).unwrap();
    assert!(pa < pb && pb < pc);
}

#[test]
fn forward_looking_follows_growth_direction() {
    let mut tl = Timeline::new(TimelineId(1), "!r:x");
    tl.add_event(msg("$live"), false, None).unwrap();
    tl.add_event(msg("$old"), true, None).unwrap();
    assert!(tl.entry(&EventKey::id("$live")).unwrap().meta.forward_looking);
    assert!(!tl.entry(&EventKey::id("$old")).unwrap().meta.forward_looking);
}

#[test]
fn forward_state_events_update_end_state_only() {
    let mut tl = Timeline::new(TimelineId(1), "!r:x");
    let added = tl.add_event(member("$m", "@a:x", "join", "Alice"), false, None).unwrap();
    assert_eq!(added.state_changes.len(), 2);
    assert!(tl.state(Direction::Forwards).member("@a:x").is_some());
    assert!(tl.state(Direction::Backwards).member("@a:x").is_none());
}

#[test]
fn backward_state_events_update_start_state_only() {
    let mut tl = Timeline::new(TimelineId(1), "!r:x");
    tl.add_event(member("$m", "@a:x", "join", "Alice"), true, None).unwrap();
    assert!(tl.state(Direction::Backwards).member("@a:x").is_some());
    assert!(tl.state(Direction::Forwards).member("@a:x").is_none());
}

#[test]
fn sender_is_resolved_against_boundary_state() {
    let mut tl = Timeline::new(TimelineId(1), "!r:x");
    tl.add_event(member("$m", "@a:x", "join", "Alice"), false, None).unwrap();
    tl.add_event(msg("$1"), false, None).unwrap();
    let entry = tl.entry(&EventKey::id("$1")).unwrap();
    assert_eq!(entry.meta.sender.as_ref().unwrap().name, "Alice");
}

#[test]
fn forward_member_event_resolves_its_own_target() {
    let mut tl = Timeline::new(TimelineId(1), "!r:x");
    tl.add_event(member("$m", "@a:x", "join", "Alice"), false, None).unwrap();
    let entry = tl.entry(&EventKey::id("$m")).unwrap();
    assert_eq!(entry.meta.target.as_ref().unwrap().name, "Alice");
}

#[test]
fn unknown_sender_falls_back_to_bare_id() {
    let mut tl = Timeline::new(TimelineId(1), "!r:x");
    tl.add_event(msg("$1"), false, None).unwrap();
    let entry = tl.entry(&EventKey::id("$1")).unwrap();
    assert_eq!(entry.meta.sender.as_ref().unwrap().name, "@a:x");
}

#[test]
fn live_only_timeline_rejects_start_after_end_growth() {
    let mut tl = Timeline::new(TimelineId(3), "!r:x");
    tl.set_live_only(true);
    tl.add_event(msg("$old"), true, None).unwrap();
    tl.add_event(msg("$new"), false, None).unwrap();
    let err = tl.add_event(msg("$older"), true, None).unwrap_err();
    assert!(matches!(err, Error::LiveOnlyTimeline(3)));
    assert_eq!(tl.len(), 2);
}

#[test]
fn duplicate_key_is_rejected() {
    let mut tl = Timeline::new(TimelineId(1), "!r:x");
    tl.add_event(msg("$1"), false, None).unwrap();
    assert!(tl.add_event(msg("$1"), false, None).is_err());
}

#[test]
fn event_without_identity_is_rejected() {
    let mut tl = Timeline::new(TimelineId(1), "!r:x");
    let anon = Arc::new(Event::new(types::ROOM_MESSAGE, "@a:x", json!({})));
    assert!(matches!(tl.add_event(anon, false, None), Err(Error::MissingIdentity)));
}

#[test]
fn replace_event_keeps_position_and_rekeys() {
    let mut tl = Timeline::new(TimelineId(1), "!r:x");
    let local = Arc::new(Event::new(types::ROOM_MESSAGE, "@a:x", json!({"body": "hi"})).with_transaction_id("t1"));
    tl.add_event(local, false, Some(EventStatus::Sending)).unwrap();
    tl.add_event(msg("$after"), false, None).unwrap();

    let remote = Arc::new(
        Event::new(types::ROOM_MESSAGE, "@a:x", json!({"body": "hi!"})).with_id("$remote").with_transaction_id("t1"),
    );
    let before = tl.position_of(&EventKey::Txn("t1".into())).unwrap();
    let new_key = tl.replace_event(&EventKey::Txn("t1".into()), remote).unwrap();
    assert_eq!(new_key, EventKey::id("$remote"));
    assert_eq!(tl.position_of(&new_key), Some(before));
    assert!(!tl.contains(&EventKey::Txn("t1".into())));
    assert_eq!(tl.keys(), vec![EventKey::id("$remote"), EventKey::id("$after")]);
}

#[test]
fn remove_event_leaves_other_positions_untouched() {
    let mut tl = Timeline::new(TimelineId(1), "!r:x");
    for id in ["$1", "$2", "$3"] {
        tl.add_event(msg(id), false, None).unwrap();
    }
    let p3 = tl.position_of(&EventKey::id("$3")).unwrap();
    assert!(tl.remove_event(&EventKey::id("$2")).is_some());
    assert_eq!(tl.position_of(&EventKey::id("$3")), Some(p3));
    assert!(tl.entry(&EventKey::id("$3")).is_some());
    assert!(tl.remove_event(&EventKey::id("$2")).is_none());
}

#[test]
fn neighbours_cannot_be_silently_replaced() {
    let mut tl = Timeline::new(TimelineId(1), "!r:x");
    tl.set_neighbour(TimelineId(2), Direction::Forwards).unwrap();
    tl.set_neighbour(TimelineId(2), Direction::Forwards).unwrap();
    assert!(tl.set_neighbour(TimelineId(3), Direction::Forwards).is_err());
    assert!(tl.set_neighbour(TimelineId(1), Direction::Backwards).is_err());
    assert_eq!(tl.neighbour(Direction::Forwards), Some(TimelineId(2)));
    assert_eq!(tl.neighbour(Direction::Backwards), None);
}

#[test]
fn initialise_state_requires_empty_timeline() {
    let mut tl = Timeline::new(TimelineId(1), "!r:x");
    tl.initialise_state(&[member("$m", "@a:x", "join", "Alice")]).unwrap();
    assert!(tl.state(Direction::Backwards).member("@a:x").is_some());
    assert!(tl.state(Direction::Forwards).member("@a:x").is_some());

    tl.add_event(msg("$1"), false, None).unwrap();
    assert!(tl.initialise_state(&[]).is_err());
}

#[test]
fn pagination_tokens_are_per_direction() {
    let mut tl = Timeline::new(TimelineId(1), "!r:x");
    tl.set_pagination_token(Some("back".into()), Direction::Backwards);
    assert_eq!(tl.pagination_token(Direction::Backwards), Some("back"));
    assert_eq!(tl.pagination_token(Direction::Forwards), None);
}
