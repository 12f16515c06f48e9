// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Room display names.

use crate::event::types;
use crate::protocol::RoomSummary;
use crate::state::{Membership, RoomState};

const MAX_HEROES: usize = 5;

/// Computes the name shown for a room from its current state.
///
/// Priority: explicit name, canonical alias, names of the other joined or
/// invited members (summary heroes when the server sent them), the inviter
/// when we are only invited, and finally "Empty room", mentioning former
/// members if there were any.
pub fn calculate_room_name(state: &RoomState, summary: &RoomSummary, my_user_id: &str) -> String {
    if let Some(name) = non_empty(state, types::ROOM_NAME, "name") {
        return name;
    }
    if let Some(alias) = non_empty(state, types::ROOM_CANONICAL_ALIAS, "alias") {
        return alias;
    }

    let my_membership = state.member(my_user_id).and_then(|m| m.membership);
    let joined = summary.joined_member_count.map_or_else(|| state.joined_member_count(), |n| n as usize);
    let invited = summary.invited_member_count.map_or_else(|| state.invited_member_count(), |n| n as usize);
    let me_counted = usize::from(my_membership.is_some_and(Membership::is_present));
    let others = (joined + invited).saturating_sub(me_counted);

    let names: Vec<String> = if summary.heroes.is_empty() {
        state
            .members()
            .into_iter()
            .filter(|m| m.user_id != my_user_id && m.membership.is_some_and(Membership::is_present))
            .take(MAX_HEROES)
            .map(|m| m.name)
            .collect()
    } else {
        summary
            .heroes
            .iter()
            .filter(|hero| hero.as_str() != my_user_id)
            .take(MAX_HEROES)
            .map(|hero| state.sentinel_member(hero).name)
            .collect()
    };
    if !names.is_empty() {
        return member_names_to_room_name(&names, others.max(names.len()));
    }

    if my_membership == Some(Membership::Invite) {
        if let Some(inviter) = state.membership_sender(my_user_id) {
            return state.sentinel_member(inviter).name;
        }
    }

    let former: Vec<String> = state
        .members()
        .into_iter()
        .filter(|m| m.user_id != my_user_id && matches!(m.membership, Some(Membership::Leave | Membership::Ban)))
        .take(MAX_HEROES)
        .map(|m| m.name)
        .collect();
    if former.is_empty() {
        "Empty room".to_string()
    } else {
        format!("Empty room (was {})", member_names_to_room_name(&former, former.len()))
    }
}

/// Joins member names into a room name, given the total number of other
/// members (which may exceed `names.len()`).
pub fn member_names_to_room_name(names: &[String], count: usize) -> String {
    match names {
        [] => "Empty room".to_string(),
        [only] if count <= 1 => only.clone(),
        [first, second] if count <= 2 => format!("{first} and {second}"),
        [first, ..] => match count.saturating_sub(1) {
            0 | 1 => format!("{first} and 1 other"),
            n => format!("{first} and {n} others"),
        },
    }
}

fn non_empty(state: &RoomState, event_type: &str, field: &str) -> Option<String> {
    state
        .get(event_type, "")
        .and_then(|event| event.content_str(field))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
#[path = "naming_tests.rs"]
mod tests;
