// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for client module tests.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use mx_core::SyncResponse;
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};

use crate::emitter::{ClientEvent, SyncState};
use crate::error::{TransportError, TransportResult};
use crate::to_device::ToDeviceBatch;
use crate::transport::{SendOutcome, SendRequest, SyncRequest, Transport};

/// Scripted transport.
///
/// Each call takes the next scripted result for its endpoint. With nothing
/// scripted, sync parks forever, sends answer `$<txn_id>`, and everything
/// else succeeds.
pub struct MockTransport {
    syncs: Mutex<VecDeque<TransportResult<SyncResponse>>>,
    sync_requests: Mutex<Vec<SyncRequest>>,
    keep_alives: Mutex<VecDeque<TransportResult<()>>>,
    keep_alive_calls: AtomicUsize,
    keep_alive_gate: watch::Sender<bool>,
    capabilities: Mutex<VecDeque<TransportResult<Value>>>,
    sends: Mutex<VecDeque<TransportResult<SendOutcome>>>,
    sent: Mutex<Vec<SendRequest>>,
    send_gate: watch::Sender<bool>,
    to_device: Mutex<VecDeque<TransportResult<()>>>,
    to_device_sent: Mutex<Vec<ToDeviceBatch>>,
    filters_created: AtomicUsize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            syncs: Mutex::new(VecDeque::new()),
            sync_requests: Mutex::new(Vec::new()),
            keep_alives: Mutex::new(VecDeque::new()),
            keep_alive_calls: AtomicUsize::new(0),
            keep_alive_gate: watch::Sender::new(true),
            capabilities: Mutex::new(VecDeque::new()),
            sends: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            send_gate: watch::Sender::new(true),
            to_device: Mutex::new(VecDeque::new()),
            to_device_sent: Mutex::new(Vec::new()),
            filters_created: AtomicUsize::new(0),
        }
    }

    pub fn push_sync(&self, result: TransportResult<SyncResponse>) {
        self.syncs.lock().unwrap().push_back(result);
    }

    pub fn push_keep_alive(&self, result: TransportResult<()>) {
        self.keep_alives.lock().unwrap().push_back(result);
    }

    pub fn push_capabilities(&self, result: TransportResult<Value>) {
        self.capabilities.lock().unwrap().push_back(result);
    }

    pub fn push_send(&self, result: TransportResult<SendOutcome>) {
        self.sends.lock().unwrap().push_back(result);
    }

    pub fn push_to_device(&self, result: TransportResult<()>) {
        self.to_device.lock().unwrap().push_back(result);
    }

    /// Holds every send until [`MockTransport::release_sends`].
    pub fn hold_sends(&self) {
        self.send_gate.send_replace(false);
    }

    pub fn release_sends(&self) {
        self.send_gate.send_replace(true);
    }

    /// Holds every keep-alive probe until [`MockTransport::release_keep_alives`].
    pub fn hold_keep_alives(&self) {
        self.keep_alive_gate.send_replace(false);
    }

    pub fn release_keep_alives(&self) {
        self.keep_alive_gate.send_replace(true);
    }

    pub fn sync_requests(&self) -> Vec<SyncRequest> {
        self.sync_requests.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<SendRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn to_device_sent(&self) -> Vec<ToDeviceBatch> {
        self.to_device_sent.lock().unwrap().clone()
    }

    pub fn keep_alive_calls(&self) -> usize {
        self.keep_alive_calls.load(Ordering::SeqCst)
    }

    pub fn filters_created(&self) -> usize {
        self.filters_created.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn sync_once(&self, request: SyncRequest) -> BoxFuture<'_, TransportResult<SyncResponse>> {
        self.sync_requests.lock().unwrap().push(request);
        let next = self.syncs.lock().unwrap().pop_front();
        async move {
            match next {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
        .boxed()
    }

    fn send_event(&self, request: SendRequest) -> BoxFuture<'_, TransportResult<SendOutcome>> {
        let mut gate = self.send_gate.subscribe();
        async move {
            let _ = gate.wait_for(|open| *open).await;
            self.sent.lock().unwrap().push(request.clone());
            let scripted = self.sends.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| Ok(SendOutcome::EventId(format!("${}", request.txn_id))))
        }
        .boxed()
    }

    fn keep_alive(&self) -> BoxFuture<'_, TransportResult<()>> {
        self.keep_alive_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.keep_alives.lock().unwrap().pop_front();
        let mut gate = self.keep_alive_gate.subscribe();
        async move {
            let _ = gate.wait_for(|open| *open).await;
            next.unwrap_or(Ok(()))
        }
        .boxed()
    }

    fn capabilities(&self) -> BoxFuture<'_, TransportResult<Value>> {
        let next = self.capabilities.lock().unwrap().pop_front();
        async move { next.unwrap_or_else(|| Ok(json!({"m.change_password": {"enabled": true}}))) }.boxed()
    }

    fn push_rules(&self) -> BoxFuture<'_, TransportResult<Value>> {
        async move { Ok(json!({"global": {}})) }.boxed()
    }

    fn create_filter(&self, _user_id: String, _filter: Value) -> BoxFuture<'_, TransportResult<String>> {
        let n = self.filters_created.fetch_add(1, Ordering::SeqCst) + 1;
        async move { Ok(format!("filter{n}")) }.boxed()
    }

    fn send_to_device(&self, batch: ToDeviceBatch) -> BoxFuture<'_, TransportResult<()>> {
        let next = self.to_device.lock().unwrap().pop_front();
        async move {
            let result = next.unwrap_or(Ok(()));
            if result.is_ok() {
                self.to_device_sent.lock().unwrap().push(batch);
            }
            result
        }
        .boxed()
    }
}

/// A sync response for one joined room.
pub fn joined_response(next_batch: &str, room_id: &str, events: Vec<Value>) -> SyncResponse {
    serde_json::from_value(json!({
        "next_batch": next_batch,
        "rooms": {"join": {room_id: {"timeline": {"events": events, "prev_batch": "p0"}}}}
    }))
    .unwrap()
}

pub fn empty_response(next_batch: &str) -> SyncResponse {
    SyncResponse { next_batch: next_batch.to_string(), ..SyncResponse::default() }
}

pub fn message(event_id: &str, sender: &str, body: &str) -> Value {
    json!({"type": "m.room.message", "event_id": event_id, "sender": sender, "content": {"body": body}})
}

/// The remote echo of one of our sends.
pub fn echo(event_id: &str, sender: &str, txn_id: &str, body: &str) -> Value {
    json!({
        "type": "m.room.message", "event_id": event_id, "sender": sender,
        "content": {"body": body}, "unsigned": {"transaction_id": txn_id}
    })
}

pub fn server_error() -> TransportError {
    TransportError::http(502, "M_UNKNOWN", "bad gateway")
}

/// Waits for the next sync state change, skipping other events.
pub async fn next_state(rx: &mut broadcast::Receiver<ClientEvent>) -> (Option<SyncState>, SyncState) {
    loop {
        if let ClientEvent::SyncStateChanged { new, old, .. } = rx.recv().await.unwrap() {
            return (old, new);
        }
    }
}
