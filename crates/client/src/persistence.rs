// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence interface and an in-memory backend.
//!
//! Backends may fail with [`StoreError::Unavailable`], which callers treat as
//! a connectivity problem to retry later, or with a logical error.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use mx_core::protocol::UnreadNotifications;
use mx_core::{EventKey, Membership, Room, RoomSummary};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::to_device::ToDeviceBatch;

/// The persisted view of a room after a sync batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub membership: Option<Membership>,
    #[serde(default)]
    pub summary: RoomSummary,
    #[serde(default)]
    pub unread: UnreadNotifications,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event: Option<EventKey>,
}

impl From<&Room> for RoomSnapshot {
    fn from(room: &Room) -> Self {
        RoomSnapshot {
            room_id: room.room_id().to_string(),
            name: room.name().to_string(),
            membership: room.my_membership(),
            summary: room.summary().clone(),
            unread: room.unread_notifications(),
            tags: room.tags(),
            last_event: room.live_timeline().keys().pop(),
        }
    }
}

/// Async key-value storage the client persists through.
pub trait Persistence: Send + Sync + 'static {
    /// The `next_batch` token of the last fully applied sync.
    fn get_saved_sync_token(&self) -> BoxFuture<'_, StoreResult<Option<String>>>;

    fn set_sync_token(&self, token: String) -> BoxFuture<'_, StoreResult<()>>;

    fn store_room(&self, room: RoomSnapshot) -> BoxFuture<'_, StoreResult<()>>;

    fn get_room(&self, room_id: String) -> BoxFuture<'_, StoreResult<Option<RoomSnapshot>>>;

    /// The server-side id stored for a named filter.
    fn get_filter_id(&self, name: String) -> BoxFuture<'_, StoreResult<Option<String>>>;

    fn store_filter(&self, name: String, filter_id: String) -> BoxFuture<'_, StoreResult<()>>;

    /// Appends to-device batches, assigning each a fresh id. Returns the ids.
    fn save_to_device_batches(&self, batches: Vec<ToDeviceBatch>) -> BoxFuture<'_, StoreResult<Vec<u64>>>;

    fn get_oldest_to_device_batch(&self) -> BoxFuture<'_, StoreResult<Option<ToDeviceBatch>>>;

    fn remove_to_device_batch(&self, id: u64) -> BoxFuture<'_, StoreResult<()>>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    sync_token: Option<String>,
    rooms: BTreeMap<String, RoomSnapshot>,
    filters: BTreeMap<String, String>,
    to_device: Vec<ToDeviceBatch>,
    next_batch_id: u64,
}

/// Non-durable backend, used by default and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with [`StoreError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(())
    }

    /// Number of to-device batches waiting to be sent.
    pub async fn to_device_len(&self) -> usize {
        self.inner.lock().await.to_device.len()
    }
}

impl Persistence for MemoryStore {
    fn get_saved_sync_token(&self) -> BoxFuture<'_, StoreResult<Option<String>>> {
        async move {
            self.check()?;
            Ok(self.inner.lock().await.sync_token.clone())
        }
        .boxed()
    }

    fn set_sync_token(&self, token: String) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            self.check()?;
            self.inner.lock().await.sync_token = Some(token);
            Ok(())
        }
        .boxed()
    }

    fn store_room(&self, room: RoomSnapshot) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            self.check()?;
            self.inner.lock().await.rooms.insert(room.room_id.clone(), room);
            Ok(())
        }
        .boxed()
    }

    fn get_room(&self, room_id: String) -> BoxFuture<'_, StoreResult<Option<RoomSnapshot>>> {
        async move {
            self.check()?;
            Ok(self.inner.lock().await.rooms.get(&room_id).cloned())
        }
        .boxed()
    }

    fn get_filter_id(&self, name: String) -> BoxFuture<'_, StoreResult<Option<String>>> {
        async move {
            self.check()?;
            Ok(self.inner.lock().await.filters.get(&name).cloned())
        }
        .boxed()
    }

    fn store_filter(&self, name: String, filter_id: String) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            self.check()?;
            self.inner.lock().await.filters.insert(name, filter_id);
            Ok(())
        }
        .boxed()
    }

    fn save_to_device_batches(&self, batches: Vec<ToDeviceBatch>) -> BoxFuture<'_, StoreResult<Vec<u64>>> {
        async move {
            self.check()?;
            let mut inner = self.inner.lock().await;
            let mut ids = Vec::with_capacity(batches.len());
            for mut batch in batches {
                inner.next_batch_id += 1;
                batch.id = inner.next_batch_id;
                ids.push(batch.id);
                inner.to_device.push(batch);
            }
            Ok(ids)
        }
        .boxed()
    }

    fn get_oldest_to_device_batch(&self) -> BoxFuture<'_, StoreResult<Option<ToDeviceBatch>>> {
        async move {
            self.check()?;
            Ok(self.inner.lock().await.to_device.first().cloned())
        }
        .boxed()
    }

    fn remove_to_device_batch(&self, id: u64) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            self.check()?;
            self.inner.lock().await.to_device.retain(|batch| batch.id != id);
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
#[path = "persistence_tests.rs"]
mod tests;
