// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The set of timelines held for one room.
//!
//! Timelines live in an arena keyed by [`TimelineId`] and refer to each other
//! by id. With timeline support enabled, resets keep the old live timeline
//! linked behind the new one; without it, everything but the live timeline is
//! discarded on reset.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::event::{Event, EventKey, EventStatus};
use crate::notify::Notification;
use crate::ordering::{compare_events, TimelineGraph};
use crate::timeline::{AddedEvent, Direction, Timeline, TimelineEntry, TimelineId};

/// What to do with an incoming live event whose id is already known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DuplicateStrategy {
    /// Keep the first copy and drop the new one.
    #[default]
    Ignore,
    /// Swap the payload in place; the position is unchanged.
    Replace,
}

impl DuplicateStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            DuplicateStrategy::Ignore => "ignore",
            DuplicateStrategy::Replace => "replace",
        }
    }
}

impl fmt::Display for DuplicateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicateStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ignore" => Ok(DuplicateStrategy::Ignore),
            "replace" => Ok(DuplicateStrategy::Replace),
            other => Err(Error::InvalidDuplicateStrategy(other.to_string())),
        }
    }
}

impl TryFrom<String> for DuplicateStrategy {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DuplicateStrategy> for String {
    fn from(value: DuplicateStrategy) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelineSetOptions {
    /// Keep old timelines reachable after a reset.
    pub timeline_support: bool,
    /// Timelines in this set only grow forwards once they have live events.
    pub live_only: bool,
}

/// Outcome of offering a live event to the set.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveInsert {
    Added(AddedEvent),
    Replaced { key: EventKey },
    Ignored { key: EventKey },
}

#[derive(Debug, Clone)]
pub struct TimelineSet {
    room_id: String,
    options: TimelineSetOptions,
    live: Timeline,
    /// Earlier live timelines kept after resets, by id.
    history: BTreeMap<TimelineId, Timeline>,
    next_id: u64,
    /// Which timeline holds each known event.
    index: HashMap<EventKey, TimelineId>,
}

impl TimelineSet {
    pub fn new(room_id: impl Into<String>, options: TimelineSetOptions) -> Self {
        let room_id = room_id.into();
        let mut live = Timeline::new(TimelineId(0), room_id.clone());
        live.set_live_only(options.live_only);
        TimelineSet { room_id, options, live, history: BTreeMap::new(), next_id: 1, index: HashMap::new() }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn options(&self) -> TimelineSetOptions {
        self.options
    }

    pub fn live_timeline_id(&self) -> TimelineId {
        self.live.id()
    }

    pub fn live_timeline(&self) -> &Timeline {
        &self.live
    }

    pub fn live_timeline_mut(&mut self) -> &mut Timeline {
        &mut self.live
    }

    pub fn timeline(&self, id: TimelineId) -> Option<&Timeline> {
        if id == self.live.id() {
            Some(&self.live)
        } else {
            self.history.get(&id)
        }
    }

    fn find_timeline_mut(&mut self, id: TimelineId) -> Option<&mut Timeline> {
        if id == self.live.id() {
            Some(&mut self.live)
        } else {
            self.history.get_mut(&id)
        }
    }

    fn timeline_mut(&mut self, id: TimelineId) -> Result<&mut Timeline> {
        self.find_timeline_mut(id).ok_or(Error::TimelineNotFound(id.0))
    }

    /// All retained timelines, in creation order.
    pub fn timelines(&self) -> impl Iterator<Item = &Timeline> {
        self.history.values().chain(std::iter::once(&self.live))
    }

    pub fn timeline_for_event(&self, key: &EventKey) -> Option<TimelineId> {
        self.index.get(key).copied()
    }

    pub fn find_event(&self, key: &EventKey) -> Option<&TimelineEntry> {
        let timeline = self.timeline_for_event(key)?;
        self.timeline(timeline)?.entry(key)
    }

    pub fn contains_event(&self, key: &EventKey) -> bool {
        self.index.contains_key(key)
    }

    /// Offers an event for the live end, de-duplicating against every
    /// timeline in the set.
    pub fn add_live_event(
        &mut self,
        event: Arc<Event>,
        strategy: DuplicateStrategy,
        status: Option<EventStatus>,
    ) -> Result<LiveInsert> {
        let key = event.key().ok_or(Error::MissingIdentity)?;
        if let Some(&timeline_id) = self.index.get(&key) {
            return match strategy {
                DuplicateStrategy::Ignore => {
                    debug!(room_id = %self.room_id, %key, "ignoring duplicate event");
                    Ok(LiveInsert::Ignored { key })
                }
                DuplicateStrategy::Replace => {
                    let timeline = self.timeline_mut(timeline_id)?;
                    let is_current_state = event
                        .state_slot()
                        .and_then(|(t, k)| timeline.state(Direction::Forwards).get(&t, &k).cloned())
                        .is_some_and(|current| current.key().as_ref() == Some(&key));
                    timeline.replace_event(&key, Arc::clone(&event))?;
                    if is_current_state {
                        timeline.state_mut(Direction::Forwards).set_state_events(&[event], true);
                    }
                    Ok(LiveInsert::Replaced { key })
                }
            };
        }
        let live = self.live.id();
        self.append_live(live, event, status).map(LiveInsert::Added)
    }

    /// Appends an event at the end of the live timeline. Fails when
    /// `timeline_id` is not the live timeline.
    pub fn append_live(
        &mut self,
        timeline_id: TimelineId,
        event: Arc<Event>,
        status: Option<EventStatus>,
    ) -> Result<AddedEvent> {
        if timeline_id != self.live.id() {
            return Err(Error::NotLiveTimeline(timeline_id.0));
        }
        self.add_event_at(timeline_id, event, false, status)
    }

    /// Adds one event at either end of any timeline in the set.
    pub fn add_event_at(
        &mut self,
        timeline_id: TimelineId,
        event: Arc<Event>,
        to_start: bool,
        status: Option<EventStatus>,
    ) -> Result<AddedEvent> {
        let added = self.timeline_mut(timeline_id)?.add_event(event, to_start, status)?;
        self.index.insert(added.key.clone(), timeline_id);
        Ok(added)
    }

    /// Adds a batch of historical (or forward-paginated) events to a
    /// timeline.
    ///
    /// When an event is already held by another timeline, the two are
    /// linked as neighbours in the direction of travel and insertion stops:
    /// the rest of the batch is already known. Otherwise `pagination_token`
    /// becomes the timeline's token for that direction.
    pub fn add_events_to_timeline(
        &mut self,
        events: Vec<Arc<Event>>,
        to_start: bool,
        timeline_id: TimelineId,
        pagination_token: Option<String>,
    ) -> Result<Vec<AddedEvent>> {
        let direction = if to_start { Direction::Backwards } else { Direction::Forwards };
        let mut added = Vec::new();
        let mut joined = None;

        for event in events {
            let key = event.key().ok_or(Error::MissingIdentity)?;
            match self.index.get(&key).copied() {
                Some(existing) if existing == timeline_id => continue,
                Some(existing) => {
                    joined = Some(existing);
                    break;
                }
                None => added.push(self.add_event_at(timeline_id, event, to_start, None)?),
            }
        }

        match joined {
            Some(existing) => {
                let (earlier, later) = match direction {
                    Direction::Backwards => (existing, timeline_id),
                    Direction::Forwards => (timeline_id, existing),
                };
                if let Err(e) = self.link_timelines(earlier, later) {
                    warn!(room_id = %self.room_id, error = %e, "could not join overlapping timelines");
                }
                self.timeline_mut(timeline_id)?.set_pagination_token(None, direction);
            }
            None => self.timeline_mut(timeline_id)?.set_pagination_token(pagination_token, direction),
        }

        Ok(added)
    }

    /// Links two timelines on both sides: `earlier` is followed by `later`.
    pub fn link_timelines(&mut self, earlier: TimelineId, later: TimelineId) -> Result<()> {
        let earlier_next = self.timeline(earlier).ok_or(Error::TimelineNotFound(earlier.0))?.neighbour(Direction::Forwards);
        let later_prev = self.timeline(later).ok_or(Error::TimelineNotFound(later.0))?.neighbour(Direction::Backwards);
        if earlier_next.is_some_and(|n| n != later) || later_prev.is_some_and(|p| p != earlier) {
            return Err(Error::InvalidInput(format!(
                "timelines {earlier} and {later} are already linked elsewhere"
            )));
        }
        self.timeline_mut(earlier)?.set_neighbour(later, Direction::Forwards)?;
        self.timeline_mut(later)?.set_neighbour(earlier, Direction::Backwards)
    }

    /// Replaces the live timeline with a fresh, empty one.
    ///
    /// The new timeline starts from the old live timeline's end state. With
    /// timeline support the old timeline stays in the set, linked as the new
    /// one's backward neighbour and optionally given `forward_token`;
    /// otherwise every old timeline is dropped. The back-pagination token is
    /// applied before the returned reset notification is produced.
    pub fn reset_live_timeline(
        &mut self,
        back_token: Option<String>,
        forward_token: Option<String>,
    ) -> Result<Notification> {
        let old_id = self.live.id();
        let continued_state = self.live.state(Direction::Forwards).clone();

        let new_id = TimelineId(self.next_id);
        self.next_id += 1;
        let mut timeline = Timeline::with_state(new_id, continued_state);
        timeline.set_live_only(self.options.live_only);
        timeline.set_pagination_token(back_token, Direction::Backwards);
        let mut old = std::mem::replace(&mut self.live, timeline);

        let reset_all = !self.options.timeline_support;
        if reset_all {
            self.history.clear();
            self.index.clear();
        } else {
            if let Some(token) = forward_token {
                old.set_pagination_token(Some(token), Direction::Forwards);
            }
            let linked = old
                .set_neighbour(new_id, Direction::Forwards)
                .and_then(|()| self.live.set_neighbour(old_id, Direction::Backwards));
            if let Err(e) = linked {
                warn!(room_id = %self.room_id, error = %e, "old live timeline not linked");
            }
            self.history.insert(old_id, old);
        }

        debug!(room_id = %self.room_id, timeline = %new_id, reset_all, "live timeline reset");

        Ok(Notification::TimelineReset { room_id: self.room_id.clone(), timeline: new_id, reset_all })
    }

    /// Compares two events by id; `None` when the order is unknown.
    pub fn compare_event_ordering(&self, a: &str, b: &str) -> Option<Ordering> {
        compare_events(self, &EventKey::id(a), &EventKey::id(b))
    }

    pub fn compare_keys(&self, a: &EventKey, b: &EventKey) -> Option<Ordering> {
        compare_events(self, a, b)
    }

    /// Swaps an event's payload in place wherever it lives.
    pub fn replace_event(&mut self, key: &EventKey, event: Arc<Event>) -> Result<EventKey> {
        let timeline_id = self.timeline_for_event(key).ok_or_else(|| Error::EventNotFound(key.to_string()))?;
        let new_key = self.timeline_mut(timeline_id)?.replace_event(key, event)?;
        if &new_key != key {
            self.index.remove(key);
            self.index.insert(new_key.clone(), timeline_id);
        }
        Ok(new_key)
    }

    pub fn set_status(&mut self, key: &EventKey, status: Option<EventStatus>) -> Result<()> {
        let timeline_id = self.timeline_for_event(key).ok_or_else(|| Error::EventNotFound(key.to_string()))?;
        self.timeline_mut(timeline_id)?.set_status(key, status)
    }

    pub fn remove_event(&mut self, key: &EventKey) -> Option<TimelineEntry> {
        let timeline_id = self.index.remove(key)?;
        self.find_timeline_mut(timeline_id)?.remove_event(key)
    }
}

impl TimelineGraph for TimelineSet {
    fn locate(&self, key: &EventKey) -> Option<(TimelineId, i64)> {
        let timeline = self.timeline_for_event(key)?;
        let position = self.timeline(timeline)?.position_of(key)?;
        Some((timeline, position))
    }

    fn neighbour(&self, timeline: TimelineId, direction: Direction) -> Option<TimelineId> {
        self.timeline(timeline)?.neighbour(direction)
    }
}

#[cfg(test)]
#[path = "timeline_set_tests.rs"]
mod tests;
