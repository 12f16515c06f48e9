// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The client's rooms, shared between the sync loop and senders.
//!
//! Every mutation takes the lock, applies one complete step, drains the
//! touched rooms' notifications and releases the lock before anything is
//! awaited. Observers therefore only ever see whole batches.

use std::collections::BTreeMap;

use mx_core::protocol::Rooms;
use mx_core::{Error, Room, RoomSyncProjector};
use tokio::sync::Mutex;

use crate::emitter::Emitter;
use crate::error::ClientResult;
use crate::persistence::RoomSnapshot;

#[derive(Debug)]
pub struct RoomMap {
    rooms: Mutex<BTreeMap<String, Room>>,
    emitter: Emitter,
}

impl RoomMap {
    pub fn new(emitter: Emitter) -> Self {
        RoomMap { rooms: Mutex::new(BTreeMap::new()), emitter }
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Applies one sync batch's rooms section and returns snapshots of the
    /// rooms it touched.
    pub async fn apply_sync(
        &self,
        projector: &RoomSyncProjector,
        sections: Rooms,
        since: Option<&str>,
    ) -> Vec<RoomSnapshot> {
        let (notifications, snapshots) = {
            let mut rooms = self.rooms.lock().await;
            let touched = projector.apply(&mut rooms, sections, since);
            let mut notifications = Vec::new();
            let mut snapshots = Vec::with_capacity(touched.len());
            for room_id in touched {
                if let Some(room) = rooms.get_mut(&room_id) {
                    notifications.extend(room.take_notifications());
                    snapshots.push(RoomSnapshot::from(&*room));
                }
            }
            (notifications, snapshots)
        };
        self.emitter.emit_room(notifications);
        snapshots
    }

    /// Runs `f` against one room and publishes what it changed. The room's
    /// notifications are published even when `f` fails part way.
    pub async fn update<R>(&self, room_id: &str, f: impl FnOnce(&mut Room) -> mx_core::Result<R>) -> ClientResult<R> {
        let (result, notifications) = {
            let mut rooms = self.rooms.lock().await;
            let room = rooms.get_mut(room_id).ok_or_else(|| Error::RoomNotFound(room_id.to_string()))?;
            let result = f(room);
            (result, room.take_notifications())
        };
        self.emitter.emit_room(notifications);
        Ok(result?)
    }

    /// Runs `f` against one room without mutating it.
    pub async fn read<R>(&self, room_id: &str, f: impl FnOnce(&Room) -> R) -> Option<R> {
        let rooms = self.rooms.lock().await;
        rooms.get(room_id).map(f)
    }

    /// A copy of the room as it is now.
    pub async fn get(&self, room_id: &str) -> Option<Room> {
        self.read(room_id, Room::clone).await
    }

    pub async fn room_ids(&self) -> Vec<String> {
        self.rooms.lock().await.keys().cloned().collect()
    }

    /// Adds a room that has not come down sync yet.
    pub async fn insert(&self, room: Room) {
        self.rooms.lock().await.insert(room.room_id().to_string(), room);
    }
}

#[cfg(test)]
#[path = "rooms_tests.rs"]
mod tests;
