// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    room_not_found = { Error::RoomNotFound("!abc:example.org".into()), "!abc:example.org" },
    bad_strategy = { Error::InvalidDuplicateStrategy("merge".into()), "merge" },
    not_live = { Error::NotLiveTimeline(7), "not the live timeline" },
    not_cancellable = { Error::NotCancellable("sending".into()), "sending" },
)]
fn error_display_contains(err: Error, expected: &str) {
    assert!(err.to_string().contains(expected));
}

#[test]
fn error_invalid_transition_display() {
    let err = Error::InvalidTransition {
        from: "sent".into(),
        to: "queued".into(),
        valid_targets: "(none)".into(),
    };
    let msg = err.to_string();
    assert!(msg.contains("sent"));
    assert!(msg.contains("queued"));
    assert!(msg.contains("hint"));
}

#[test]
fn error_from_json() {
    let json_err = serde_json::from_str::<()>("invalid").unwrap_err();
    let err: Error = json_err.into();
    assert!(matches!(err, Error::Json(_)));
}
