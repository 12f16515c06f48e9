// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use crate::event::types;
use serde_json::json;
use yare::parameterized;

fn msg(id: &str) -> Arc<Event> {
    Arc::new(Event::new(types::ROOM_MESSAGE, "@a:x", json!({"body": id})).with_id(id))
}

fn name_event(id: &str, name: &str) -> Arc<Event> {
    Arc::new(Event::new(types::ROOM_NAME, "@a:x", json!({"name": name})).with_state_key("").with_id(id))
}

fn set(timeline_support: bool) -> TimelineSet {
    TimelineSet::new("!r:x", TimelineSetOptions { timeline_support, live_only: false })
}

#[parameterized(
    ignore = { "ignore", DuplicateStrategy::Ignore },
    replace = { "replace", DuplicateStrategy::Replace },
)]
fn duplicate_strategy_parses(input: &str, expected: DuplicateStrategy) {
    assert_eq!(input.parse::<DuplicateStrategy>().unwrap(), expected);
    assert_eq!(expected.to_string(), input);
}

#[parameterized(
    empty = { "" },
    upper = { "IGNORE" },
    other = { "merge" },
)]
fn duplicate_strategy_rejects_unknown(input: &str) {
    let err = input.parse::<DuplicateStrategy>().unwrap_err();
    assert!(matches!(err, Error::InvalidDuplicateStrategy(s) if s == input));
}

#[test]
fn duplicate_strategy_fails_fast_on_deserialize() {
    let err = serde_json::from_str::<DuplicateStrategy>("\"sometimes\"").unwrap_err();
    assert!(err.to_string().contains("sometimes"));
}

#[test]
fn live_duplicates_are_ignored_by_default() {
    let mut ts = set(false);
    ts.add_live_event(msg("$1"), DuplicateStrategy::Ignore, None).unwrap();
    let again = Arc::new(Event::new(types::ROOM_MESSAGE, "@a:x", json!({"body": "changed"})).with_id("$1"));
    let outcome = ts.add_live_event(again, DuplicateStrategy::Ignore, None).unwrap();
    assert!(matches!(outcome, LiveInsert::Ignored { .. }));
    let entry = ts.find_event(&EventKey::id("$1")).unwrap();
    assert_eq!(entry.event.content_str("body"), Some("$1"));
    assert_eq!(ts.live_timeline().len(), 1);
}

#[test]
fn replace_swaps_payload_in_place() {
    let mut ts = set(false);
    ts.add_live_event(msg("$1"), DuplicateStrategy::Ignore, None).unwrap();
    ts.add_live_event(msg("$2"), DuplicateStrategy::Ignore, None).unwrap();
    let again = Arc::new(Event::new(types::ROOM_MESSAGE, "@a:x", json!({"body": "changed"})).with_id("$1"));
    let outcome = ts.add_live_event(again, DuplicateStrategy::Replace, None).unwrap();
    assert!(matches!(outcome, LiveInsert::Replaced { .. }));
    assert_eq!(ts.live_timeline().keys(), vec![EventKey::id("$1"), EventKey::id("$2")]);
    assert_eq!(ts.find_event(&EventKey::id("$1")).unwrap().event.content_str("body"), Some("changed"));
}

#[test]
fn replacing_current_state_event_updates_end_state() {
    let mut ts = set(false);
    ts.add_live_event(name_event("$n", "Old"), DuplicateStrategy::Ignore, None).unwrap();
    ts.add_live_event(name_event("$n", "New"), DuplicateStrategy::Replace, None).unwrap();
    let current = ts.live_timeline().state(Direction::Forwards).get(types::ROOM_NAME, "").unwrap();
    assert_eq!(current.content_str("name"), Some("New"));
}

#[test]
fn dedup_spans_retained_timelines() {
    let mut ts = set(true);
    ts.add_live_event(msg("$1"), DuplicateStrategy::Ignore, None).unwrap();
    ts.reset_live_timeline(Some("back".into()), None).unwrap();
    let outcome = ts.add_live_event(msg("$1"), DuplicateStrategy::Ignore, None).unwrap();
    assert!(matches!(outcome, LiveInsert::Ignored { .. }));
    assert!(ts.live_timeline().is_empty());
}

#[test]
fn append_live_rejects_non_live_timeline() {
    let mut ts = set(true);
    let old = ts.live_timeline_id();
    ts.reset_live_timeline(None, None).unwrap();
    let err = ts.append_live(old, msg("$1"), None).unwrap_err();
    assert!(matches!(err, Error::NotLiveTimeline(id) if id == old.0));
}

#[test]
fn reset_without_support_discards_old_timelines() {
    let mut ts = set(false);
    ts.add_live_event(msg("$1"), DuplicateStrategy::Ignore, None).unwrap();
    let note = ts.reset_live_timeline(Some("back".into()), Some("fwd".into())).unwrap();
    assert!(matches!(note, Notification::TimelineReset { reset_all: true, .. }));
    assert_eq!(ts.timelines().count(), 1);
    assert!(!ts.contains_event(&EventKey::id("$1")));
    assert_eq!(ts.live_timeline().pagination_token(Direction::Backwards), Some("back"));
}

#[test]
fn reset_with_support_links_old_and_new() {
    let mut ts = set(true);
    ts.add_live_event(msg("$old"), DuplicateStrategy::Ignore, None).unwrap();
    let old = ts.live_timeline_id();

    let note = ts.reset_live_timeline(Some("back".into()), Some("fwd".into())).unwrap();
    let new = ts.live_timeline_id();
    assert_ne!(old, new);
    assert!(matches!(note, Notification::TimelineReset { reset_all: false, timeline, .. } if timeline == new));

    assert_eq!(ts.timeline(old).unwrap().neighbour(Direction::Forwards), Some(new));
    assert_eq!(ts.timeline(new).unwrap().neighbour(Direction::Backwards), Some(old));
    assert_eq!(ts.timeline(old).unwrap().pagination_token(Direction::Forwards), Some("fwd"));
    assert_eq!(ts.live_timeline().pagination_token(Direction::Backwards), Some("back"));

    ts.add_live_event(msg("$new"), DuplicateStrategy::Ignore, None).unwrap();
    assert_eq!(ts.compare_event_ordering("$old", "$new"), Some(Ordering::Less));
    assert_eq!(ts.compare_event_ordering("$new", "$old"), Some(Ordering::Greater));
}

#[test]
fn live_timeline_is_always_held_and_listed_last() {
    let mut ts = set(true);
    for _ in 0..3 {
        ts.reset_live_timeline(None, None).unwrap();
    }
    let ids: Vec<TimelineId> = ts.timelines().map(Timeline::id).collect();
    assert_eq!(ids, vec![TimelineId(0), TimelineId(1), TimelineId(2), TimelineId(3)]);
    assert_eq!(ts.live_timeline().id(), TimelineId(3));
    assert_eq!(ts.timeline(TimelineId(3)).unwrap().id(), ts.live_timeline_id());

    ts.live_timeline_mut().set_pagination_token(Some("t".into()), Direction::Backwards);
    assert_eq!(ts.timeline(TimelineId(3)).unwrap().pagination_token(Direction::Backwards), Some("t"));
}

#[test]
fn reset_continues_end_state() {
    let mut ts = set(true);
    ts.add_live_event(name_event("$n", "Room"), DuplicateStrategy::Ignore, None).unwrap();
    ts.reset_live_timeline(None, None).unwrap();
    let live = ts.live_timeline();
    for direction in [Direction::Backwards, Direction::Forwards] {
        let name = live.state(direction).get(types::ROOM_NAME, "").unwrap();
        assert_eq!(name.content_str("name"), Some("Room"));
    }
}

#[test]
fn twice_reset_timelines_are_not_adjacent() {
    let mut ts = set(true);
    ts.add_live_event(msg("$1"), DuplicateStrategy::Ignore, None).unwrap();
    ts.reset_live_timeline(None, None).unwrap();
    ts.add_live_event(msg("$2"), DuplicateStrategy::Ignore, None).unwrap();
    ts.reset_live_timeline(None, None).unwrap();
    ts.add_live_event(msg("$3"), DuplicateStrategy::Ignore, None).unwrap();

    assert_eq!(ts.compare_event_ordering("$1", "$2"), Some(Ordering::Less));
    assert_eq!(ts.compare_event_ordering("$2", "$3"), Some(Ordering::Less));
    assert_eq!(ts.compare_event_ordering("$1", "$3"), None);
}

#[test]
fn back_pagination_into_known_events_links_timelines() {
    let mut ts = set(true);
    ts.add_live_event(msg("$1"), DuplicateStrategy::Ignore, None).unwrap();
    let first = ts.live_timeline_id();
    ts.reset_live_timeline(None, None).unwrap();
    let second = ts.live_timeline_id();

    ts.add_live_event(msg("$3"), DuplicateStrategy::Ignore, None).unwrap();
    let added = ts
        .add_events_to_timeline(vec![msg("$2"), msg("$1"), msg("$0")], true, second, Some("tok".into()))
        .unwrap();

    assert_eq!(added.len(), 1);
    assert_eq!(ts.live_timeline().keys(), vec![EventKey::id("$2"), EventKey::id("$3")]);
    assert!(!ts.contains_event(&EventKey::id("$0")));
    assert_eq!(ts.live_timeline().pagination_token(Direction::Backwards), None);
    assert_eq!(ts.timeline(second).unwrap().neighbour(Direction::Backwards), Some(first));
    assert_eq!(ts.compare_event_ordering("$1", "$2"), Some(Ordering::Less));
}

#[test]
fn back_pagination_stores_token_when_no_overlap() {
    let mut ts = set(true);
    ts.add_live_event(msg("$5"), DuplicateStrategy::Ignore, None).unwrap();
    let live = ts.live_timeline_id();
    let added = ts.add_events_to_timeline(vec![msg("$4"), msg("$3")], true, live, Some("older".into())).unwrap();
    assert_eq!(added.len(), 2);
    assert_eq!(ts.live_timeline().keys(), vec![EventKey::id("$3"), EventKey::id("$4"), EventKey::id("$5")]);
    assert_eq!(ts.live_timeline().pagination_token(Direction::Backwards), Some("older"));
    assert_eq!(ts.compare_event_ordering("$3", "$5"), Some(Ordering::Less));
}

#[test]
fn link_rejects_self_and_unknown_timelines() {
    let mut ts = set(false);
    ts.add_live_event(msg("$1"), DuplicateStrategy::Ignore, None).unwrap();
    let first = ts.live_timeline_id();
    ts.link_timelines(first, first).unwrap_err();
    assert!(ts.link_timelines(first, TimelineId(99)).is_err());
}

#[test]
fn replace_event_rekeys_index() {
    let mut ts = set(false);
    let local = Arc::new(Event::new(types::ROOM_MESSAGE, "@a:x", json!({"body": "hi"})).with_transaction_id("t1"));
    ts.add_live_event(local, DuplicateStrategy::Ignore, Some(EventStatus::Sending)).unwrap();
    let remote = Arc::new(
        Event::new(types::ROOM_MESSAGE, "@a:x", json!({"body": "hi"})).with_id("$e").with_transaction_id("t1"),
    );
    let key = ts.replace_event(&EventKey::Txn("t1".into()), remote).unwrap();
    assert_eq!(key, EventKey::id("$e"));
    assert!(ts.contains_event(&key));
    assert!(!ts.contains_event(&EventKey::Txn("t1".into())));
}

#[test]
fn remove_event_forgets_index() {
    let mut ts = set(false);
    ts.add_live_event(msg("$1"), DuplicateStrategy::Ignore, None).unwrap();
    assert!(ts.remove_event(&EventKey::id("$1")).is_some());
    assert!(ts.find_event(&EventKey::id("$1")).is_none());
    assert!(ts.remove_event(&EventKey::id("$1")).is_none());
}

#[test]
fn unknown_events_have_no_order() {
    let mut ts = set(false);
    ts.add_live_event(msg("$1"), DuplicateStrategy::Ignore, None).unwrap();
    assert_eq!(ts.compare_event_ordering("$1", "$nope"), None);
    assert_eq!(ts.compare_event_ordering("$1", "$1"), Some(Ordering::Equal));
}
