// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Plain-text rendering of rooms after a replay.

use std::fmt::Write;

use mx_core::{Room, TimelineEntry};

/// One header line per room followed by its live timeline, oldest first.
pub fn render_room(room: &Room) -> String {
    let mut out = String::new();
    let membership = room.my_membership().map_or("unknown", |m| m.as_str());
    let _ = writeln!(out, "{} \"{}\" ({})", room.room_id(), room.name(), membership);

    let unread = room.unread_notifications();
    if unread.notification_count > 0 || unread.highlight_count > 0 {
        let _ = writeln!(out, "  unread: {} ({} highlights)", unread.notification_count, unread.highlight_count);
    }
    let tags = room.tags();
    if !tags.is_empty() {
        let _ = writeln!(out, "  tags: {}", tags.join(", "));
    }

    for entry in room.live_timeline().entries() {
        let _ = writeln!(out, "  {}", render_entry(entry));
    }
    let detached: Vec<_> = room
        .pending_events()
        .filter(|pending| room.find_event(&mx_core::EventKey::Txn(pending.txn_id.clone())).is_none())
        .collect();
    for pending in detached {
        let _ = writeln!(out, "  (pending) txn:{} [{}]", pending.txn_id, pending.status);
    }
    out
}

fn render_entry(entry: &TimelineEntry) -> String {
    let key = entry.key().map(|k| k.to_string()).unwrap_or_else(|| "?".to_string());
    let sender = entry.meta.sender.as_ref().map_or(entry.event.sender.as_str(), |m| m.name.as_str());
    let mut line = format!("{key} {sender} {}", entry.event.event_type);
    if let Some(body) = entry.event.content_str("body") {
        let _ = write!(line, ": {body}");
    } else if let Some(membership) = entry.event.content_str("membership") {
        let _ = write!(line, ": {membership}");
    }
    if let Some(status) = entry.meta.status {
        let _ = write!(line, " [{status}]");
    }
    line
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
