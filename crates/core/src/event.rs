// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Room events: the immutable wire payload and the client-only annotations
//! layered on top of it.
//!
//! An [`Event`] is exactly what the server (or the local user) produced and is
//! never mutated once it enters a timeline; it is shared as `Arc<Event>`.
//! Everything the client learns later (ordering position, send status, the
//! resolved sender/target members, which direction it was added from) lives in
//! a separate [`EventMeta`] record stored next to it. The two are joined at read
//! time through [`crate::timeline::TimelineEntry`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::state::Member;

/// Well-known event types.
pub mod types {
    pub const ROOM_MEMBER: &str = "m.room.member";
    pub const ROOM_NAME: &str = "m.room.name";
    pub const ROOM_CANONICAL_ALIAS: &str = "m.room.canonical_alias";
    pub const ROOM_MESSAGE: &str = "m.room.message";
    pub const ROOM_REDACTION: &str = "m.room.redaction";
    pub const RECEIPT: &str = "m.receipt";
    pub const TYPING: &str = "m.typing";
    pub const TAG: &str = "m.tag";
}

/// Relation type used to attach an event to a thread root.
pub const THREAD_REL_TYPE: &str = "m.thread";

/// Unsigned (server- or client-added, not signed) event metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Unsigned {
    /// Client-chosen transaction id, present on echoes of our own sends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Content of the state slot before this event replaced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_content: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    /// Stripped state shipped with an invite for the local user.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invite_room_state: Vec<Event>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Unsigned {
    pub fn is_empty(&self) -> bool {
        self.transaction_id.is_none()
            && self.prev_content.is_none()
            && self.age.is_none()
            && self.invite_room_state.is_empty()
            && self.extra.is_empty()
    }
}

/// An immutable event payload as found on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default)]
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default)]
    pub content: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<String>,
    #[serde(default)]
    pub origin_server_ts: u64,
    #[serde(default, skip_serializing_if = "Unsigned::is_empty")]
    pub unsigned: Unsigned,
}

impl Event {
    /// Creates a bare event with the given type, sender and content.
    pub fn new(event_type: impl Into<String>, sender: impl Into<String>, content: Value) -> Self {
        let content = match content {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Event {
            event_type: event_type.into(),
            event_id: None,
            sender: sender.into(),
            room_id: None,
            content,
            state_key: None,
            redacts: None,
            origin_server_ts: 0,
            unsigned: Unsigned::default(),
        }
    }

    /// Sets the server-assigned event id.
    pub fn with_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Turns this event into a state event for the given state key.
    pub fn with_state_key(mut self, state_key: impl Into<String>) -> Self {
        self.state_key = Some(state_key.into());
        self
    }

    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn with_ts(mut self, origin_server_ts: u64) -> Self {
        self.origin_server_ts = origin_server_ts;
        self
    }

    pub fn with_transaction_id(mut self, txn_id: impl Into<String>) -> Self {
        self.unsigned.transaction_id = Some(txn_id.into());
        self
    }

    pub fn with_prev_content(mut self, prev_content: Value) -> Self {
        if let Value::Object(map) = prev_content {
            self.unsigned.prev_content = Some(map);
        }
        self
    }

    /// Returns the identity of this event: the event id once known,
    /// otherwise the client-chosen transaction id.
    pub fn key(&self) -> Option<EventKey> {
        if let Some(id) = &self.event_id {
            return Some(EventKey::Id(id.clone()));
        }
        self.unsigned.transaction_id.as_ref().map(|txn| EventKey::Txn(txn.clone()))
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.unsigned.transaction_id.as_deref()
    }

    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    /// The `(type, state_key)` slot this event occupies, for state events.
    pub fn state_slot(&self) -> Option<(String, String)> {
        self.state_key.as_ref().map(|key| (self.event_type.clone(), key.clone()))
    }

    pub fn content_str(&self, field: &str) -> Option<&str> {
        self.content.get(field).and_then(Value::as_str)
    }

    /// Content as seen from the direction the event was added.
    ///
    /// Events added while paginating backwards describe the state *before*
    /// them, so their `prev_content` is the relevant one.
    pub fn directional_content(&self, forward_looking: bool) -> &Map<String, Value> {
        match (&self.unsigned.prev_content, forward_looking) {
            (Some(prev), false) => prev,
            _ => &self.content,
        }
    }

    /// Root event id when this event is part of a thread.
    pub fn thread_root(&self) -> Option<&str> {
        let relates = self.content.get("m.relates_to")?.as_object()?;
        if relates.get("rel_type").and_then(Value::as_str) != Some(THREAD_REL_TYPE) {
            return None;
        }
        relates.get("event_id").and_then(Value::as_str)
    }

    /// True for events that relate to another event (edits, reactions,
    /// threads, redactions).
    pub fn has_association(&self) -> bool {
        self.redacts.is_some() || self.content.contains_key("m.relates_to")
    }

    /// Returns a redacted copy of this event.
    ///
    /// Only the keys needed to keep room state meaningful survive.
    pub fn redacted(&self, because: &Event) -> Event {
        let preserved: &[&str] = match self.event_type.as_str() {
            types::ROOM_MEMBER => &["membership"],
            _ => &[],
        };
        let content = self
            .content
            .iter()
            .filter(|(k, _)| preserved.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut unsigned = Unsigned {
            transaction_id: self.unsigned.transaction_id.clone(),
            ..Unsigned::default()
        };
        if let Ok(because) = serde_json::to_value(because) {
            unsigned.extra.insert("redacted_because".to_string(), because);
        }

        Event { content, unsigned, ..self.clone() }
    }

    pub fn is_redacted(&self) -> bool {
        self.unsigned.extra.contains_key("redacted_because")
    }
}

/// Identity of an event inside the client.
///
/// Local echoes are keyed by transaction id until the server assigns an
/// event id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EventKey {
    Id(String),
    Txn(String),
}

impl EventKey {
    pub fn id(event_id: impl Into<String>) -> Self {
        EventKey::Id(event_id.into())
    }

    pub fn as_event_id(&self) -> Option<&str> {
        match self {
            EventKey::Id(id) => Some(id),
            EventKey::Txn(_) => None,
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKey::Id(id) => write!(f, "{id}"),
            EventKey::Txn(txn) => write!(f, "txn:{txn}"),
        }
    }
}

/// Send status of a locally created event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Sending,
    Sent,
    NotSent,
    Queued,
    Cancelled,
}

impl EventStatus {
    /// Statuses reachable from this one.
    pub fn valid_targets(self) -> &'static [EventStatus] {
        use EventStatus::*;
        match self {
            Sending => &[Sent, NotSent],
            NotSent => &[Queued, Cancelled],
            Queued => &[Sending, Cancelled],
            Sent | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: EventStatus) -> bool {
        self.valid_targets().contains(&next)
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, EventStatus::Queued | EventStatus::NotSent)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Sending => "sending",
            EventStatus::Sent => "sent",
            EventStatus::NotSent => "not_sent",
            EventStatus::Queued => "queued",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sending" => Ok(EventStatus::Sending),
            "sent" => Ok(EventStatus::Sent),
            "not_sent" => Ok(EventStatus::NotSent),
            "queued" => Ok(EventStatus::Queued),
            "cancelled" => Ok(EventStatus::Cancelled),
            other => Err(Error::InvalidInput(format!("invalid event status: '{other}'"))),
        }
    }
}

/// Mutable client-only annotations for an event in a timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMeta {
    /// Sequence position inside the owning timeline. Strictly increasing
    /// from start to end; never reused.
    pub position: i64,
    /// True when the event was added at the live end, false for history.
    pub forward_looking: bool,
    /// Send status; `None` for events that came from the server.
    pub status: Option<EventStatus>,
    /// Sender as known by the state the event was added against.
    pub sender: Option<Member>,
    /// Target of membership events.
    pub target: Option<Member>,
}

impl EventMeta {
    pub fn new(position: i64, forward_looking: bool) -> Self {
        EventMeta { position, forward_looking, status: None, sender: None, target: None }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
