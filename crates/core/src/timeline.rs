// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! A single timeline: an ordered run of events bounded by two state
//! snapshots.
//!
//! Events can be added at either end. Each event receives an integer
//! position at insertion time (increasing at the end, decreasing at the
//! start), which is what intra-timeline ordering compares. Positions are never
//! reused, so removing an event leaves a hole rather than shifting others.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::event::{types, Event, EventKey, EventMeta, EventStatus};
use crate::notify::Notification;
use crate::state::RoomState;

/// Identifier of a timeline within its timeline set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimelineId(pub u64);

impl fmt::Display for TimelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which end of a timeline an operation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards older events; the start of the timeline.
    Backwards,
    /// Towards newer events; the end of the timeline.
    Forwards,
}

impl Direction {
    pub fn reverse(self) -> Direction {
        match self {
            Direction::Backwards => Direction::Forwards,
            Direction::Forwards => Direction::Backwards,
        }
    }
}

/// An event joined with its client-side annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub event: Arc<Event>,
    pub meta: EventMeta,
}

impl TimelineEntry {
    pub fn key(&self) -> Option<EventKey> {
        self.event.key()
    }
}

/// Result of adding one event to a timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AddedEvent {
    pub key: EventKey,
    pub position: i64,
    /// State changes caused by the event at the boundary it passed through.
    pub state_changes: Vec<Notification>,
}

#[derive(Debug, Clone)]
pub struct Timeline {
    id: TimelineId,
    room_id: String,
    entries: VecDeque<TimelineEntry>,
    positions: HashMap<EventKey, i64>,
    start_state: RoomState,
    end_state: RoomState,
    back_token: Option<String>,
    forward_token: Option<String>,
    prev: Option<TimelineId>,
    next: Option<TimelineId>,
    next_end_position: i64,
    next_start_position: i64,
    grown_forwards: bool,
    live_only: bool,
}

impl Timeline {
    pub fn new(id: TimelineId, room_id: impl Into<String>) -> Self {
        let room_id = room_id.into();
        Timeline {
            id,
            entries: VecDeque::new(),
            positions: HashMap::new(),
            start_state: RoomState::new(room_id.clone()),
            end_state: RoomState::new(room_id.clone()),
            room_id,
            back_token: None,
            forward_token: None,
            prev: None,
            next: None,
            next_end_position: 0,
            next_start_position: -1,
            grown_forwards: false,
            live_only: false,
        }
    }

    /// Creates a timeline whose start (and end) state continue from `state`.
    pub fn with_state(id: TimelineId, state: RoomState) -> Self {
        let mut timeline = Timeline::new(id, state.room_id().to_string());
        timeline.start_state = state.clone();
        timeline.end_state = state;
        timeline
    }

    pub fn id(&self) -> TimelineId {
        self.id
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Events from oldest to newest.
    pub fn entries(&self) -> impl Iterator<Item = &TimelineEntry> {
        self.entries.iter()
    }

    /// Event keys from oldest to newest.
    pub fn keys(&self) -> Vec<EventKey> {
        self.entries.iter().filter_map(TimelineEntry::key).collect()
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn position_of(&self, key: &EventKey) -> Option<i64> {
        self.positions.get(key).copied()
    }

    pub fn entry(&self, key: &EventKey) -> Option<&TimelineEntry> {
        let idx = self.index_of(key)?;
        self.entries.get(idx)
    }

    fn index_of(&self, key: &EventKey) -> Option<usize> {
        let position = self.position_of(key)?;
        self.entries.binary_search_by_key(&position, |e| e.meta.position).ok()
    }

    /// Marks this timeline as only growing forwards: once an event has been
    /// added at the end, adding at the start is rejected.
    pub fn set_live_only(&mut self, live_only: bool) {
        self.live_only = live_only;
    }

    pub fn is_live_only(&self) -> bool {
        self.live_only
    }

    /// Boundary state: before the first event (`Backwards`) or after the
    /// last one (`Forwards`).
    pub fn state(&self, direction: Direction) -> &RoomState {
        match direction {
            Direction::Backwards => &self.start_state,
            Direction::Forwards => &self.end_state,
        }
    }

    pub fn state_mut(&mut self, direction: Direction) -> &mut RoomState {
        match direction {
            Direction::Backwards => &mut self.start_state,
            Direction::Forwards => &mut self.end_state,
        }
    }

    /// Seeds both boundary states of an empty timeline.
    pub fn initialise_state(&mut self, events: &[Arc<Event>]) -> Result<Vec<Notification>> {
        if !self.is_empty() {
            return Err(Error::InvalidInput(format!(
                "cannot initialise state of non-empty timeline {}",
                self.id
            )));
        }
        self.start_state.set_state_events(events, true);
        Ok(self.end_state.set_state_events(events, true))
    }

    pub fn pagination_token(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Backwards => self.back_token.as_deref(),
            Direction::Forwards => self.forward_token.as_deref(),
        }
    }

    pub fn set_pagination_token(&mut self, token: Option<String>, direction: Direction) {
        match direction {
            Direction::Backwards => self.back_token = token,
            Direction::Forwards => self.forward_token = token,
        }
    }

    pub fn neighbour(&self, direction: Direction) -> Option<TimelineId> {
        match direction {
            Direction::Backwards => self.prev,
            Direction::Forwards => self.next,
        }
    }

    /// Declares `other` as this timeline's neighbour in `direction`.
    ///
    /// Only this side is updated; ordering in both directions needs the
    /// matching link on `other` too.
    pub fn set_neighbour(&mut self, other: TimelineId, direction: Direction) -> Result<()> {
        if other == self.id {
            return Err(Error::InvalidInput(format!("timeline {} cannot neighbour itself", self.id)));
        }
        let slot = match direction {
            Direction::Backwards => &mut self.prev,
            Direction::Forwards => &mut self.next,
        };
        match slot {
            Some(existing) if *existing != other => Err(Error::InvalidInput(format!(
                "timeline {} already has neighbour {} {:?}",
                self.id, existing, direction
            ))),
            _ => {
                *slot = Some(other);
                Ok(())
            }
        }
    }

    /// Adds one event at either end.
    ///
    /// Forward growth updates only the end state and backward growth only the
    /// start state. The event's sender and target are resolved against the
    /// state it is added against.
    pub fn add_event(
        &mut self,
        event: Arc<Event>,
        to_start: bool,
        status: Option<EventStatus>,
    ) -> Result<AddedEvent> {
        if to_start && self.live_only && self.grown_forwards {
            return Err(Error::LiveOnlyTimeline(self.id.0));
        }
        let key = event.key().ok_or(Error::MissingIdentity)?;
        if self.positions.contains_key(&key) {
            return Err(Error::InvalidInput(format!("event {key} already in timeline {}", self.id)));
        }

        let forward_looking = !to_start;
        let position = if to_start { self.next_start_position } else { self.next_end_position };
        let mut meta = EventMeta::new(position, forward_looking);
        meta.status = status;

        let state = if to_start { &mut self.start_state } else { &mut self.end_state };
        resolve_members(&mut meta, &event, state);

        let mut state_changes = Vec::new();
        if event.is_state() {
            state_changes = state.set_state_events(std::slice::from_ref(&event), forward_looking);
            // A forward membership event describes its own sender/target;
            // backwards it must keep the member as it was before the change.
            if event.event_type == types::ROOM_MEMBER && forward_looking {
                resolve_members(&mut meta, &event, state);
            }
        }

        let entry = TimelineEntry { event, meta };
        if to_start {
            self.entries.push_front(entry);
            self.next_start_position -= 1;
        } else {
            self.entries.push_back(entry);
            self.next_end_position += 1;
            self.grown_forwards = true;
        }
        self.positions.insert(key.clone(), position);

        Ok(AddedEvent { key, position, state_changes })
    }

    /// Swaps an event's payload in place, keeping its position.
    ///
    /// The key changes when the new payload carries a different identity
    /// (a local echo replaced by its remote echo).
    pub fn replace_event(&mut self, key: &EventKey, event: Arc<Event>) -> Result<EventKey> {
        let new_key = event.key().ok_or(Error::MissingIdentity)?;
        let idx = self.index_of(key).ok_or_else(|| Error::EventNotFound(key.to_string()))?;
        if &new_key != key && self.positions.contains_key(&new_key) {
            return Err(Error::InvalidInput(format!("event {new_key} already in timeline {}", self.id)));
        }
        let position = self.entries[idx].meta.position;
        self.entries[idx].event = event;
        if &new_key != key {
            self.positions.remove(key);
            self.positions.insert(new_key.clone(), position);
        }
        Ok(new_key)
    }

    pub fn set_status(&mut self, key: &EventKey, status: Option<EventStatus>) -> Result<()> {
        let idx = self.index_of(key).ok_or_else(|| Error::EventNotFound(key.to_string()))?;
        self.entries[idx].meta.status = status;
        Ok(())
    }

    pub fn remove_event(&mut self, key: &EventKey) -> Option<TimelineEntry> {
        let idx = self.index_of(key)?;
        self.positions.remove(key);
        self.entries.remove(idx)
    }
}

fn resolve_members(meta: &mut EventMeta, event: &Event, state: &RoomState) {
    meta.sender = Some(state.sentinel_member(&event.sender));
    if event.event_type == types::ROOM_MEMBER {
        meta.target = event.state_key.as_deref().map(|target| state.sentinel_member(target));
    }
}

#[cfg(test)]
#[path = "timeline_tests.rs"]
mod tests;
