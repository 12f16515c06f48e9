// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Applies the rooms section of a sync response onto the client's rooms.
//!
//! Order per joined room:
//! 1. membership, summary and unread counts
//! 2. a limited timeline resets the live timeline (gap)
//! 3. state deltas onto the current state
//! 4. timeline events, live, with de-duplication and echo reconciliation
//! 5. ephemeral events (receipts, typing)
//! 6. room account data (tags)
//!
//! Invited rooms only carry stripped state, which never overrides real state.
//! Each room is applied as one step; a failure inside one room is logged and
//! does not stop the others.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::event::{types, Event};
use crate::protocol::{InvitedRoom, JoinedRoom, LeftRoom, Rooms, TimelineSection};
use crate::room::{Room, RoomOptions};
use crate::state::Membership;

#[derive(Debug, Clone)]
pub struct RoomSyncProjector {
    my_user_id: String,
    options: RoomOptions,
}

impl RoomSyncProjector {
    pub fn new(my_user_id: impl Into<String>, options: RoomOptions) -> Self {
        RoomSyncProjector { my_user_id: my_user_id.into(), options }
    }

    pub fn options(&self) -> RoomOptions {
        self.options
    }

    /// Applies every room section, creating rooms on first sight. Returns
    /// the ids of the rooms touched, in the order they were applied.
    ///
    /// Each room's payload applies as a unit: when it fails, the room is
    /// restored to how it was before, notifications included.
    ///
    /// `since` is the token the batch was requested with; it becomes the old
    /// live timeline's forward token when the batch has a gap.
    pub fn apply(&self, rooms: &mut BTreeMap<String, Room>, sections: Rooms, since: Option<&str>) -> Vec<String> {
        let mut touched = Vec::new();

        for (room_id, payload) in sections.join {
            let room = self.room_entry(rooms, &room_id);
            let before = room.clone();
            if let Err(e) = self.apply_joined(room, payload, since) {
                warn!(%room_id, error = %e, "failed to apply joined room, rolled back");
                *room = before;
            }
            touched.push(room_id);
        }
        for (room_id, payload) in sections.invite {
            let room = self.room_entry(rooms, &room_id);
            self.apply_invited(room, payload);
            touched.push(room_id);
        }
        for (room_id, payload) in sections.leave {
            let room = self.room_entry(rooms, &room_id);
            let before = room.clone();
            if let Err(e) = self.apply_left(room, payload, since) {
                warn!(%room_id, error = %e, "failed to apply left room, rolled back");
                *room = before;
            }
            touched.push(room_id);
        }

        touched
    }

    fn room_entry<'a>(&self, rooms: &'a mut BTreeMap<String, Room>, room_id: &str) -> &'a mut Room {
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id, self.my_user_id.clone(), self.options))
    }

    pub fn apply_joined(&self, room: &mut Room, payload: JoinedRoom, since: Option<&str>) -> Result<()> {
        room.set_my_membership(Membership::Join);
        room.set_summary(&payload.summary);
        if let Some(unread) = payload.unread_notifications {
            room.set_unread_notifications(unread);
        }

        let room_id = room.room_id().to_string();
        self.apply_timeline_gap(room, &payload.timeline, since)?;
        room.apply_state_events(&shared(&room_id, payload.state.events))?;
        room.add_live_events(shared(&room_id, payload.timeline.events))?;

        for event in &payload.ephemeral.events {
            room.handle_ephemeral(event);
        }
        for event in shared(&room_id, payload.account_data.events) {
            room.add_account_data(event);
        }
        room.recalculate_name();
        Ok(())
    }

    pub fn apply_invited(&self, room: &mut Room, payload: InvitedRoom) {
        room.set_my_membership(Membership::Invite);
        let room_id = room.room_id().to_string();
        room.apply_stripped_state(&shared(&room_id, payload.invite_state.events));
        self.apply_invite_state(room);
        room.recalculate_name();
    }

    pub fn apply_left(&self, room: &mut Room, payload: LeftRoom, since: Option<&str>) -> Result<()> {
        room.set_my_membership(Membership::Leave);
        let room_id = room.room_id().to_string();
        self.apply_timeline_gap(room, &payload.timeline, since)?;
        room.apply_state_events(&shared(&room_id, payload.state.events))?;
        room.add_live_events(shared(&room_id, payload.timeline.events))?;
        for event in shared(&room_id, payload.account_data.events) {
            room.add_account_data(event);
        }
        room.recalculate_name();
        Ok(())
    }

    fn apply_timeline_gap(&self, room: &mut Room, timeline: &TimelineSection, since: Option<&str>) -> Result<()> {
        if timeline.limited {
            debug!(room_id = %room.room_id(), prev_batch = ?timeline.prev_batch, "gap in timeline, resetting");
            room.reset_live_timeline(timeline.prev_batch.clone(), since.map(str::to_string))
        } else {
            room.initialise_back_token(timeline.prev_batch.clone());
            Ok(())
        }
    }

    /// While we are invited, the stripped state carried in our own invite
    /// event's unsigned data stands in for real state too.
    fn apply_invite_state(&self, room: &mut Room) {
        if room.my_membership() != Some(Membership::Invite) {
            return;
        }
        let stripped: Vec<Arc<Event>> = room
            .current_state()
            .get(types::ROOM_MEMBER, &self.my_user_id)
            .map(|invite| invite.unsigned.invite_room_state.iter().cloned().map(Arc::new).collect())
            .unwrap_or_default();
        if !stripped.is_empty() {
            room.apply_stripped_state(&stripped);
        }
    }
}

/// Stamps the room id on events that lack one and shares them.
fn shared(room_id: &str, events: Vec<Event>) -> Vec<Arc<Event>> {
    events
        .into_iter()
        .map(|mut event| {
            if event.room_id.is_none() {
                event.room_id = Some(room_id.to_string());
            }
            Arc::new(event)
        })
        .collect()
}

#[cfg(test)]
#[path = "projector_tests.rs"]
mod tests;
