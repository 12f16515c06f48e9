// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction for homeserver calls.
//!
//! The client never talks HTTP itself. Anything that can answer a long-poll
//! sync and accept sends satisfies [`Transport`]: a real HTTP client, a
//! widget bridge, a recorded-fixture replayer, or a mock in tests.

use futures_util::future::BoxFuture;
use mx_core::SyncResponse;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TransportResult;
use crate::to_device::ToDeviceBatch;

/// One room event to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    pub room_id: String,
    pub txn_id: String,
    pub event_type: String,
    pub content: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
}

/// What the server returned for an accepted send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    /// The event was stored and assigned an id.
    EventId(String),
    /// The event was scheduled for later delivery.
    DelayId(String),
}

/// Parameters of one long-poll request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRequest {
    pub since: Option<String>,
    pub filter_id: Option<String>,
    /// How long the server may hold the request open; 0 returns immediately.
    pub timeout_ms: u64,
}

/// Transport trait for homeserver communication.
///
/// Methods take `&self` so one transport can serve the sync loop and the
/// send scheduler at once.
pub trait Transport: Send + Sync + 'static {
    /// Performs one long-poll sync request.
    fn sync_once(&self, request: SyncRequest) -> BoxFuture<'_, TransportResult<SyncResponse>>;

    /// Sends one room event.
    fn send_event(&self, request: SendRequest) -> BoxFuture<'_, TransportResult<SendOutcome>>;

    /// Cheap probe used to confirm connectivity after a failure.
    fn keep_alive(&self) -> BoxFuture<'_, TransportResult<()>>;

    fn capabilities(&self) -> BoxFuture<'_, TransportResult<Value>>;

    fn push_rules(&self) -> BoxFuture<'_, TransportResult<Value>>;

    /// Uploads a sync filter and returns its server-assigned id.
    fn create_filter(&self, user_id: String, filter: Value) -> BoxFuture<'_, TransportResult<String>>;

    fn send_to_device(&self, batch: ToDeviceBatch) -> BoxFuture<'_, TransportResult<()>>;
}

/// Filter uploaded when no stored filter id exists.
pub fn default_filter() -> Value {
    serde_json::json!({
        "room": {
            "timeline": { "limit": 20 },
            "state": { "lazy_load_members": true }
        }
    })
}
