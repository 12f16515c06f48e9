// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

// Allow unused items: test helpers are shared across multiple test binaries,
// and not every test file uses every helper.
#![allow(dead_code)]
#![allow(unused_imports)]
#![allow(clippy::unwrap_used)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use mx_client::{
    ClientConfig, ClientEvent, SendOutcome, SendRequest, SyncRequest, SyncState, ToDeviceBatch, Transport,
    TransportResult,
};
use mx_core::SyncResponse;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, watch};

pub const ME: &str = "@me:example.org";
pub const ROOM: &str = "!room:example.org";

/// Transport fed by the test: each sync request takes the next response
/// passed to [`ScriptedTransport::feed`], waiting until one arrives.
#[derive(Clone)]
pub struct ScriptedTransport {
    inner: Arc<Inner>,
}

struct Inner {
    feed: mpsc::UnboundedSender<TransportResult<SyncResponse>>,
    syncs: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportResult<SyncResponse>>>,
    requests: Mutex<Vec<SyncRequest>>,
    sent: Mutex<Vec<SendRequest>>,
    send_gate: watch::Sender<bool>,
    to_device: Mutex<Vec<ToDeviceBatch>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let (feed, syncs) = mpsc::unbounded_channel();
        ScriptedTransport {
            inner: Arc::new(Inner {
                feed,
                syncs: tokio::sync::Mutex::new(syncs),
                requests: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
                send_gate: watch::Sender::new(true),
                to_device: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn feed(&self, response: TransportResult<SyncResponse>) {
        self.inner.feed.send(response).unwrap();
    }

    pub fn feed_json(&self, response: Value) {
        self.feed(Ok(serde_json::from_value(response).unwrap()));
    }

    pub fn hold_sends(&self) {
        self.inner.send_gate.send_replace(false);
    }

    pub fn release_sends(&self) {
        self.inner.send_gate.send_replace(true);
    }

    pub fn requests(&self) -> Vec<SyncRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<SendRequest> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub fn to_device(&self) -> Vec<ToDeviceBatch> {
        self.inner.to_device.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn sync_once(&self, request: SyncRequest) -> BoxFuture<'_, TransportResult<SyncResponse>> {
        self.inner.requests.lock().unwrap().push(request);
        async move {
            match self.inner.syncs.lock().await.recv().await {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
        .boxed()
    }

    fn send_event(&self, request: SendRequest) -> BoxFuture<'_, TransportResult<SendOutcome>> {
        let mut gate = self.inner.send_gate.subscribe();
        async move {
            let _ = gate.wait_for(|open| *open).await;
            let event_id = format!("${}", request.txn_id);
            self.inner.sent.lock().unwrap().push(request);
            Ok(SendOutcome::EventId(event_id))
        }
        .boxed()
    }

    fn keep_alive(&self) -> BoxFuture<'_, TransportResult<()>> {
        async { Ok(()) }.boxed()
    }

    fn capabilities(&self) -> BoxFuture<'_, TransportResult<Value>> {
        async { Ok(json!({})) }.boxed()
    }

    fn push_rules(&self) -> BoxFuture<'_, TransportResult<Value>> {
        async { Ok(json!({})) }.boxed()
    }

    fn create_filter(&self, _user_id: String, _filter: Value) -> BoxFuture<'_, TransportResult<String>> {
        async { Ok("f1".to_string()) }.boxed()
    }

    fn send_to_device(&self, batch: ToDeviceBatch) -> BoxFuture<'_, TransportResult<()>> {
        self.inner.to_device.lock().unwrap().push(batch);
        async { Ok(()) }.boxed()
    }
}

pub fn config() -> ClientConfig {
    ClientConfig::new(ME)
}

/// Fails the test instead of hanging when something never happens.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future).await.unwrap()
}

/// Waits for the next sync state transition.
pub async fn next_state(rx: &mut broadcast::Receiver<ClientEvent>) -> (Option<SyncState>, SyncState) {
    within(async {
        loop {
            if let ClientEvent::SyncStateChanged { new, old, .. } = rx.recv().await.unwrap() {
                return (old, new);
            }
        }
    })
    .await
}

pub fn member(user_id: &str, membership: &str, displayname: Option<&str>) -> Value {
    let mut content = json!({"membership": membership});
    if let Some(name) = displayname {
        content["displayname"] = json!(name);
    }
    json!({
        "type": "m.room.member", "event_id": format!("$m-{user_id}-{membership}"),
        "sender": user_id, "state_key": user_id, "content": content
    })
}

pub fn message(event_id: &str, sender: &str, body: &str) -> Value {
    json!({"type": "m.room.message", "event_id": event_id, "sender": sender, "content": {"body": body}})
}

pub fn batch(next_batch: &str, timeline: Vec<Value>) -> Value {
    json!({
        "next_batch": next_batch,
        "rooms": {"join": {ROOM: {"timeline": {"events": timeline, "prev_batch": format!("p-{next_batch}")}}}}
    })
}
