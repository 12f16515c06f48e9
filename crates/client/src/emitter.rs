// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Notification fan-out.
//!
//! Observers subscribe to a broadcast channel. Sending never blocks and
//! never fails for lack of listeners; a slow listener lags and is told how
//! many events it missed.

use std::fmt;

use mx_core::{Event, Notification};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::TransportError;

/// Connection state of the sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    /// The first sync succeeded; rooms are loaded.
    Prepared,
    /// A sync after the first succeeded.
    Syncing,
    /// A sync failed; retrying once connectivity is confirmed.
    Reconnecting,
    /// Repeated failures, or a bootstrap call failed.
    Error,
    /// First success after an outage.
    Catchup,
    /// The loop was stopped.
    Stopped,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Prepared => "PREPARED",
            SyncState::Syncing => "SYNCING",
            SyncState::Reconnecting => "RECONNECTING",
            SyncState::Error => "ERROR",
            SyncState::Catchup => "CATCHUP",
            SyncState::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the client reports to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    SyncStateChanged {
        new: SyncState,
        old: Option<SyncState>,
        error: Option<TransportError>,
    },
    Room(Notification),
    ToDevice(Event),
}

#[derive(Debug, Clone)]
pub struct Emitter {
    tx: broadcast::Sender<ClientEvent>,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Emitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Emitter { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event);
    }

    pub fn emit_room(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            self.emit(ClientEvent::Room(notification));
        }
    }
}
