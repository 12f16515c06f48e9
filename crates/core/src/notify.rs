// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Change notifications produced by room mutations.
//!
//! Rooms collect notifications in an outbox while a batch is applied; the
//! caller drains them once the apply step has finished, so observers never
//! see a half-applied batch.

use serde::{Deserialize, Serialize};

use crate::event::{EventKey, EventStatus};
use crate::state::Membership;
use crate::timeline::TimelineId;

/// One observable change to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// An event was inserted into a timeline.
    TimelineEvent {
        room_id: String,
        event_key: EventKey,
        timeline: TimelineId,
        to_start: bool,
    },

    /// The live timeline was replaced. The new timeline's back-pagination
    /// token is already set when this is emitted.
    TimelineReset {
        room_id: String,
        timeline: TimelineId,
        reset_all: bool,
    },

    /// A local echo changed status or was replaced by its remote echo.
    LocalEchoUpdated {
        room_id: String,
        event_key: EventKey,
        old_event_id: EventKey,
        old_status: Option<EventStatus>,
    },

    /// A state slot on the room's current state changed.
    StateEvent {
        room_id: String,
        event_type: String,
        state_key: String,
        event_id: Option<String>,
    },

    /// A member's membership or profile changed.
    MemberUpdated {
        room_id: String,
        user_id: String,
        membership: Option<Membership>,
    },

    Typing {
        room_id: String,
        user_ids: Vec<String>,
    },

    Receipt {
        room_id: String,
        event_id: String,
        receipt_type: String,
        user_id: String,
        synthetic: bool,
    },

    Tags {
        room_id: String,
        tags: Vec<String>,
    },

    AccountData {
        room_id: String,
        event_type: String,
    },

    NameChanged {
        room_id: String,
        name: String,
    },

    ThreadUpdated {
        room_id: String,
        root_id: String,
        event_key: EventKey,
    },
}

impl Notification {
    /// Room the notification belongs to.
    pub fn room_id(&self) -> &str {
        match self {
            Notification::TimelineEvent { room_id, .. }
            | Notification::TimelineReset { room_id, .. }
            | Notification::LocalEchoUpdated { room_id, .. }
            | Notification::StateEvent { room_id, .. }
            | Notification::MemberUpdated { room_id, .. }
            | Notification::Typing { room_id, .. }
            | Notification::Receipt { room_id, .. }
            | Notification::Tags { room_id, .. }
            | Notification::AccountData { room_id, .. }
            | Notification::NameChanged { room_id, .. }
            | Notification::ThreadUpdated { room_id, .. } => room_id,
        }
    }
}
