// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

#[test]
fn event_key_prefers_event_id() {
    let ev = Event::new("m.room.message", "@a:x", json!({})).with_transaction_id("t1").with_id("$1");
    assert_eq!(ev.key(), Some(EventKey::id("$1")));
}

#[test]
fn event_key_falls_back_to_transaction_id() {
    let ev = Event::new("m.room.message", "@a:x", json!({})).with_transaction_id("t1");
    assert_eq!(ev.key(), Some(EventKey::Txn("t1".into())));
}

#[test]
fn event_without_identity_has_no_key() {
    let ev = Event::new("m.room.message", "@a:x", json!({}));
    assert_eq!(ev.key(), None);
}

#[test]
fn parses_wire_event_with_unsigned() {
    let raw = json!({
        "type": "m.room.member",
        "event_id": "$m1",
        "sender": "@alice:example.org",
        "state_key": "@bob:example.org",
        "origin_server_ts": 1000,
        "content": { "membership": "invite" },
        "unsigned": {
            "age": 12,
            "transaction_id": "abc",
            "invite_room_state": [
                { "type": "m.room.name", "state_key": "", "sender": "@alice:example.org", "content": { "name": "Tea" } }
            ],
            "custom": true
        }
    });
    let ev: Event = serde_json::from_value(raw).unwrap();
    assert_eq!(ev.state_slot(), Some(("m.room.member".into(), "@bob:example.org".into())));
    assert_eq!(ev.transaction_id(), Some("abc"));
    assert_eq!(ev.unsigned.invite_room_state.len(), 1);
    assert_eq!(ev.unsigned.invite_room_state[0].content_str("name"), Some("Tea"));
    assert_eq!(ev.unsigned.extra.get("custom"), Some(&json!(true)));
}

#[test]
fn directional_content_uses_prev_content_backwards() {
    let ev = Event::new("m.room.member", "@a:x", json!({"membership": "join"}))
        .with_state_key("@a:x")
        .with_prev_content(json!({"membership": "invite"}));
    assert_eq!(ev.directional_content(true).get("membership"), Some(&json!("join")));
    assert_eq!(ev.directional_content(false).get("membership"), Some(&json!("invite")));
}

#[test]
fn thread_root_requires_thread_relation() {
    let threaded = Event::new(
        "m.room.message",
        "@a:x",
        json!({"body": "hi", "m.relates_to": {"rel_type": "m.thread", "event_id": "$root"}}),
    );
    let reply = Event::new(
        "m.room.message",
        "@a:x",
        json!({"body": "hi", "m.relates_to": {"m.in_reply_to": {"event_id": "$root"}}}),
    );
    assert_eq!(threaded.thread_root(), Some("$root"));
    assert_eq!(reply.thread_root(), None);
    assert!(reply.has_association());
}

#[test]
fn redaction_strips_content_but_keeps_membership() {
    let member = Event::new("m.room.member", "@a:x", json!({"membership": "join", "displayname": "A"}))
        .with_state_key("@a:x")
        .with_id("$m");
    let because = Event::new("m.room.redaction", "@mod:x", json!({})).with_id("$r");
    let redacted = member.redacted(&because);
    assert_eq!(redacted.content_str("membership"), Some("join"));
    assert_eq!(redacted.content_str("displayname"), None);
    assert!(redacted.is_redacted());
    assert_eq!(redacted.event_id.as_deref(), Some("$m"));
}

#[parameterized(
    sending = { EventStatus::Sending, EventStatus::Sent, true },
    sending_failed = { EventStatus::Sending, EventStatus::NotSent, true },
    not_sent_requeue = { EventStatus::NotSent, EventStatus::Queued, true },
    queued_dispatch = { EventStatus::Queued, EventStatus::Sending, true },
    queued_cancel = { EventStatus::Queued, EventStatus::Cancelled, true },
    sending_cancel = { EventStatus::Sending, EventStatus::Cancelled, false },
    sent_terminal = { EventStatus::Sent, EventStatus::Queued, false },
    cancelled_terminal = { EventStatus::Cancelled, EventStatus::Sending, false },
)]
fn status_transitions(from: EventStatus, to: EventStatus, allowed: bool) {
    assert_eq!(from.can_transition_to(to), allowed);
}

#[test]
fn status_round_trips_through_str() {
    for status in [
        EventStatus::Sending,
        EventStatus::Sent,
        EventStatus::NotSent,
        EventStatus::Queued,
        EventStatus::Cancelled,
    ] {
        assert_eq!(status.as_str().parse::<EventStatus>().unwrap(), status);
    }
    assert!("bogus".parse::<EventStatus>().is_err());
}
