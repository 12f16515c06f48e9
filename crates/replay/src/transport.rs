// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport that serves recorded sync responses instead of talking to a
//! server.
//!
//! Each sync request takes the next recorded batch. Once the recording is
//! used up, sync requests park forever and [`ReplayTransport::exhausted`]
//! resolves, which also means every batch has been applied. Sends succeed
//! with synthetic event ids.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use mx_client::{SendOutcome, SendRequest, SyncRequest, ToDeviceBatch, Transport, TransportError, TransportResult};
use mx_core::SyncResponse;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub struct ReplayTransport {
    batches: Mutex<VecDeque<SyncResponse>>,
    exhausted: watch::Sender<bool>,
    served: AtomicUsize,
    sent: AtomicUsize,
}

impl ReplayTransport {
    pub fn new(batches: Vec<SyncResponse>) -> Self {
        ReplayTransport {
            batches: Mutex::new(batches.into()),
            exhausted: watch::Sender::new(false),
            served: AtomicUsize::new(0),
            sent: AtomicUsize::new(0),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::Fixture { path: path.to_path_buf(), source })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Reads one sync response per line. Blank lines are skipped.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut batches = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let batch = serde_json::from_str(&line).map_err(|source| Error::BadBatch { line: index + 1, source })?;
            batches.push(batch);
        }
        Ok(Self::new(batches))
    }

    pub fn remaining(&self) -> usize {
        self.batches.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    /// Resolves once the recording has been fully consumed.
    pub async fn exhausted(&self) {
        let mut rx = self.exhausted.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    fn next_batch(&self) -> Option<SyncResponse> {
        self.batches.lock().ok().and_then(|mut batches| batches.pop_front())
    }
}

impl Transport for ReplayTransport {
    fn sync_once(&self, request: SyncRequest) -> BoxFuture<'_, TransportResult<SyncResponse>> {
        let next = self.next_batch();
        async move {
            match next {
                Some(batch) => {
                    let n = self.served.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(n, since = ?request.since, next_batch = %batch.next_batch, "serving recorded batch");
                    Ok(batch)
                }
                None => {
                    if !self.exhausted.send_replace(true) {
                        info!(batches = self.served(), "recording exhausted");
                    }
                    std::future::pending().await
                }
            }
        }
        .boxed()
    }

    fn send_event(&self, request: SendRequest) -> BoxFuture<'_, TransportResult<SendOutcome>> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst);
        async move {
            debug!(room_id = %request.room_id, txn_id = %request.txn_id, "accepting send");
            Ok(SendOutcome::EventId(format!("$replay{n}")))
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
        async { Ok(json!({"global": {}})) }.boxed()
    }

    fn create_filter(&self, user_id: String, _filter: Value) -> BoxFuture<'_, TransportResult<String>> {
        async move {
            if user_id.is_empty() {
                return Err(TransportError::http(400, "M_INVALID_PARAM", "missing user id"));
            }
            Ok("replay".to_string())
        }
        .boxed()
    }

    fn send_to_device(&self, batch: ToDeviceBatch) -> BoxFuture<'_, TransportResult<()>> {
        async move {
            debug!(event_type = %batch.event_type, messages = batch.messages.len(), "accepting to-device batch");
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
