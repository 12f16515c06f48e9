// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Room state snapshots.
//!
//! A [`RoomState`] maps `(event type, state key)` to the single event that
//! currently defines that slot. Every timeline owns two of them: the state
//! before its first event and the state after its last one.
//!
//! The slot map is copy-on-write (`Arc` + `Arc::make_mut`), so handing a
//! snapshot to a new timeline on reset shares the underlying map until one
//! side mutates it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::event::{types, Event};
use crate::notify::Notification;

/// Membership of a user in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    Join,
    Invite,
    Leave,
    Ban,
    Knock,
}

impl Membership {
    pub fn as_str(self) -> &'static str {
        match self {
            Membership::Join => "join",
            Membership::Invite => "invite",
            Membership::Leave => "leave",
            Membership::Ban => "ban",
            Membership::Knock => "knock",
        }
    }

    /// Joined or invited members count towards the room's population.
    pub fn is_present(self) -> bool {
        matches!(self, Membership::Join | Membership::Invite)
    }
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Membership {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "join" => Ok(Membership::Join),
            "invite" => Ok(Membership::Invite),
            "leave" => Ok(Membership::Leave),
            "ban" => Ok(Membership::Ban),
            "knock" => Ok(Membership::Knock),
            other => Err(Error::InvalidInput(format!("invalid membership: '{other}'"))),
        }
    }
}

/// Best-known representation of a room member, used for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: String,
    /// Display name, disambiguated with the user id when needed.
    pub name: String,
    pub raw_display_name: Option<String>,
    pub membership: Option<Membership>,
}

impl Member {
    /// A member known only by id.
    pub fn bare(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Member { name: user_id.clone(), user_id, raw_display_name: None, membership: None }
    }
}

#[derive(Debug, Clone)]
struct StateEntry {
    event: Arc<Event>,
    forward_looking: bool,
    /// Set for stripped invite state; real state always replaces it.
    stripped: bool,
}

impl StateEntry {
    fn membership(&self) -> Option<Membership> {
        self.event
            .directional_content(self.forward_looking)
            .get("membership")
            .and_then(Value::as_str)
            .and_then(|m| m.parse().ok())
    }

    fn display_name(&self) -> Option<&str> {
        self.event
            .directional_content(self.forward_looking)
            .get("displayname")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// State of a room at one point in time.
#[derive(Debug, Clone)]
pub struct RoomState {
    room_id: String,
    slots: Arc<BTreeMap<(String, String), StateEntry>>,
    /// Display name -> user ids of present members using it.
    display_names: Arc<HashMap<String, BTreeSet<String>>>,
    typing: Vec<String>,
}

impl RoomState {
    pub fn new(room_id: impl Into<String>) -> Self {
        RoomState {
            room_id: room_id.into(),
            slots: Arc::default(),
            display_names: Arc::default(),
            typing: Vec::new(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Event defining the given slot.
    pub fn get(&self, event_type: &str, state_key: &str) -> Option<&Arc<Event>> {
        self.slots.get(&(event_type.to_string(), state_key.to_string())).map(|e| &e.event)
    }

    /// True when the slot is only backed by stripped invite state.
    pub fn is_stripped(&self, event_type: &str, state_key: &str) -> bool {
        self.slots
            .get(&(event_type.to_string(), state_key.to_string()))
            .is_some_and(|e| e.stripped)
    }

    /// All state events, ordered by slot.
    pub fn events(&self) -> impl Iterator<Item = &Arc<Event>> {
        self.slots.values().map(|e| &e.event)
    }

    pub fn events_of_type<'a>(&'a self, event_type: &'a str) -> impl Iterator<Item = &'a Arc<Event>> {
        self.slots.iter().filter(move |((t, _), _)| t == event_type).map(|(_, e)| &e.event)
    }

    /// Applies state events to this snapshot.
    ///
    /// `forward_looking` is false when the events come from backwards
    /// growth, in which case their `prev_content` is what this snapshot
    /// should reflect.
    pub fn set_state_events(
        &mut self,
        events: &[Arc<Event>],
        forward_looking: bool,
    ) -> Vec<Notification> {
        let mut notifications = Vec::new();
        for event in events {
            let Some(slot) = event.state_slot() else {
                continue;
            };
            let entry = StateEntry { event: Arc::clone(event), forward_looking, stripped: false };
            self.insert_slot(slot, entry, &mut notifications);
        }
        notifications
    }

    /// Applies stripped invite state.
    ///
    /// Stripped events only fill empty slots or replace other stripped
    /// events; they never override real state.
    pub fn set_stripped_state(&mut self, events: &[Arc<Event>]) -> Vec<Notification> {
        let mut notifications = Vec::new();
        for event in events {
            let Some(slot) = event.state_slot() else {
                continue;
            };
            if self.slots.get(&slot).is_some_and(|existing| !existing.stripped) {
                debug!(room_id = %self.room_id, event_type = %slot.0, "ignoring stripped state over real state");
                continue;
            }
            let entry = StateEntry { event: Arc::clone(event), forward_looking: true, stripped: true };
            self.insert_slot(slot, entry, &mut notifications);
        }
        notifications
    }

    fn insert_slot(
        &mut self,
        slot: (String, String),
        entry: StateEntry,
        notifications: &mut Vec<Notification>,
    ) {
        let is_member = slot.0 == types::ROOM_MEMBER;
        if is_member {
            let user_id = slot.1.clone();
            let previous = self.slots.get(&slot).cloned();
            self.reindex_display_name(&user_id, previous.as_ref(), &entry);
        }

        notifications.push(Notification::StateEvent {
            room_id: self.room_id.clone(),
            event_type: slot.0.clone(),
            state_key: slot.1.clone(),
            event_id: entry.event.event_id.clone(),
        });
        if is_member {
            notifications.push(Notification::MemberUpdated {
                room_id: self.room_id.clone(),
                user_id: slot.1.clone(),
                membership: entry.membership(),
            });
        }

        Arc::make_mut(&mut self.slots).insert(slot, entry);
    }

    fn reindex_display_name(&mut self, user_id: &str, old: Option<&StateEntry>, new: &StateEntry) {
        let names = Arc::make_mut(&mut self.display_names);
        if let Some(old_name) = old.and_then(StateEntry::display_name) {
            if let Some(ids) = names.get_mut(old_name) {
                ids.remove(user_id);
                if ids.is_empty() {
                    names.remove(old_name);
                }
            }
        }
        let present = new.membership().is_some_and(Membership::is_present);
        if let (true, Some(name)) = (present, new.display_name()) {
            names.entry(name.to_string()).or_default().insert(user_id.to_string());
        }
    }

    /// Handles an ephemeral event (typing notifications).
    pub fn handle_ephemeral(&mut self, event: &Event) -> Vec<Notification> {
        if event.event_type != types::TYPING {
            debug!(room_id = %self.room_id, event_type = %event.event_type, "ignoring ephemeral event");
            return Vec::new();
        }
        self.typing = event
            .content
            .get("user_ids")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        vec![Notification::Typing { room_id: self.room_id.clone(), user_ids: self.typing.clone() }]
    }

    pub fn typing_users(&self) -> &[String] {
        &self.typing
    }

    /// Member for a user, if a membership event is known.
    pub fn member(&self, user_id: &str) -> Option<Member> {
        let entry = self.slots.get(&(types::ROOM_MEMBER.to_string(), user_id.to_string()))?;
        let raw = entry.display_name();
        Some(Member {
            user_id: user_id.to_string(),
            name: self.disambiguated_name(user_id, raw),
            raw_display_name: raw.map(str::to_string),
            membership: entry.membership(),
        })
    }

    /// Member for a user, falling back to the bare user id.
    pub fn sentinel_member(&self, user_id: &str) -> Member {
        self.member(user_id).unwrap_or_else(|| Member::bare(user_id))
    }

    /// Sender of the membership event for a user (e.g. the inviter).
    pub fn membership_sender(&self, user_id: &str) -> Option<&str> {
        self.get(types::ROOM_MEMBER, user_id).map(|ev| ev.sender.as_str()).filter(|s| !s.is_empty())
    }

    /// All known members, ordered by user id.
    pub fn members(&self) -> Vec<Member> {
        self.slots
            .keys()
            .filter(|(t, _)| t == types::ROOM_MEMBER)
            .filter_map(|(_, user_id)| self.member(user_id))
            .collect()
    }

    pub fn joined_member_count(&self) -> usize {
        self.count_membership(Membership::Join)
    }

    pub fn invited_member_count(&self) -> usize {
        self.count_membership(Membership::Invite)
    }

    fn count_membership(&self, membership: Membership) -> usize {
        self.slots
            .iter()
            .filter(|((t, _), entry)| t == types::ROOM_MEMBER && entry.membership() == Some(membership))
            .count()
    }

    fn disambiguated_name(&self, user_id: &str, raw: Option<&str>) -> String {
        let Some(raw) = raw else {
            return user_id.to_string();
        };
        let shared = self
            .display_names
            .get(raw)
            .is_some_and(|ids| ids.iter().any(|id| id != user_id));
        if shared || looks_like_user_id(raw) {
            format!("{raw} ({user_id})")
        } else {
            raw.to_string()
        }
    }
}

fn looks_like_user_id(name: &str) -> bool {
    name.starts_with('@') && name.contains(':')
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
