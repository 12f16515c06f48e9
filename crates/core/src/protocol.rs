// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shape of a sync response.
//!
//! Rooms are keyed by id and split by the local user's membership. Every
//! section is optional on the wire and defaults to empty.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// One batch returned by the long-poll sync endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Token to pass as `since` on the next request.
    pub next_batch: String,
    #[serde(default)]
    pub rooms: Rooms,
    /// Global account data.
    #[serde(default)]
    pub account_data: EventList,
    #[serde(default)]
    pub to_device: EventList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rooms {
    #[serde(default)]
    pub join: BTreeMap<String, JoinedRoom>,
    #[serde(default)]
    pub invite: BTreeMap<String, InvitedRoom>,
    #[serde(default)]
    pub leave: BTreeMap<String, LeftRoom>,
}

impl Rooms {
    pub fn is_empty(&self) -> bool {
        self.join.is_empty() && self.invite.is_empty() && self.leave.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventList {
    #[serde(default)]
    pub events: Vec<Event>,
}

impl From<Vec<Event>> for EventList {
    fn from(events: Vec<Event>) -> Self {
        EventList { events }
    }
}

/// Timeline section of a room. `limited` marks a gap before `events`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineSection {
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub limited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_batch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    #[serde(rename = "m.heroes", default, skip_serializing_if = "Vec::is_empty")]
    pub heroes: Vec<String>,
    #[serde(rename = "m.joined_member_count", default, skip_serializing_if = "Option::is_none")]
    pub joined_member_count: Option<u64>,
    #[serde(rename = "m.invited_member_count", default, skip_serializing_if = "Option::is_none")]
    pub invited_member_count: Option<u64>,
}

impl RoomSummary {
    /// Merges a partial summary; absent fields keep their previous value.
    pub fn merge(&mut self, update: &RoomSummary) {
        if !update.heroes.is_empty() {
            self.heroes = update.heroes.clone();
        }
        if update.joined_member_count.is_some() {
            self.joined_member_count = update.joined_member_count;
        }
        if update.invited_member_count.is_some() {
            self.invited_member_count = update.invited_member_count;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadNotifications {
    #[serde(default)]
    pub highlight_count: u64,
    #[serde(default)]
    pub notification_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinedRoom {
    #[serde(default)]
    pub summary: RoomSummary,
    #[serde(default)]
    pub state: EventList,
    #[serde(default)]
    pub timeline: TimelineSection,
    #[serde(default)]
    pub ephemeral: EventList,
    #[serde(default)]
    pub account_data: EventList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_notifications: Option<UnreadNotifications>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvitedRoom {
    #[serde(default)]
    pub invite_state: EventList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeftRoom {
    #[serde(default)]
    pub state: EventList,
    #[serde(default)]
    pub timeline: TimelineSection,
    #[serde(default)]
    pub account_data: EventList,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
