// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound to-device message queue.
//!
//! Messages are split into batches of at most `max_batch_size`, persisted,
//! and sent oldest-first by a single worker. A failed send is retried with
//! the rate-limit-aware backoff. When the backoff gives up, a 4xx batch is
//! dropped, since the server will never accept it; any other failure pauses
//! the queue until the sync loop next enters SYNCING.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ToDeviceConfig;
use crate::emitter::{ClientEvent, Emitter, SyncState};
use crate::error::ClientResult;
use crate::persistence::Persistence;
use crate::scheduler::{Retry, RetryPolicy};
use crate::transport::Transport;

/// One message addressed to one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToDeviceMessage {
    pub user_id: String,
    pub device_id: String,
    pub payload: Value,
}

impl ToDeviceMessage {
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>, payload: Value) -> Self {
        ToDeviceMessage { user_id: user_id.into(), device_id: device_id.into(), payload }
    }
}

/// Messages of one event type sent in a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToDeviceBatch {
    /// Assigned by the store; 0 until persisted.
    #[serde(default)]
    pub id: u64,
    pub event_type: String,
    pub txn_id: String,
    pub messages: Vec<ToDeviceMessage>,
}

impl ToDeviceBatch {
    pub fn new(event_type: impl Into<String>, txn_id: impl Into<String>, messages: Vec<ToDeviceMessage>) -> Self {
        ToDeviceBatch { id: 0, event_type: event_type.into(), txn_id: txn_id.into(), messages }
    }
}

/// Splits messages into batches of at most `max_batch_size`, naming each
/// with a transaction id from `next_txn_id`.
pub fn split_batches(
    event_type: &str,
    messages: Vec<ToDeviceMessage>,
    max_batch_size: usize,
    mut next_txn_id: impl FnMut() -> String,
) -> Vec<ToDeviceBatch> {
    messages
        .chunks(max_batch_size.max(1))
        .map(|chunk| ToDeviceBatch::new(event_type, next_txn_id(), chunk.to_vec()))
        .collect()
}

enum Progress {
    Sent,
    Idle,
    Paused,
    Stopped,
}

/// Persistent to-device send queue. Cheap to clone.
pub struct ToDeviceMessageQueue<T: Transport, P: Persistence> {
    inner: Arc<Inner<T, P>>,
}

impl<T: Transport, P: Persistence> Clone for ToDeviceMessageQueue<T, P> {
    fn clone(&self) -> Self {
        ToDeviceMessageQueue { inner: Arc::clone(&self.inner) }
    }
}

struct Inner<T, P> {
    transport: Arc<T>,
    store: Arc<P>,
    config: ToDeviceConfig,
    policy: RetryPolicy,
    wake: Notify,
    cancel: CancellationToken,
}

impl<T: Transport, P: Persistence> ToDeviceMessageQueue<T, P> {
    pub fn new(transport: Arc<T>, store: Arc<P>, config: ToDeviceConfig, policy: RetryPolicy) -> Self {
        ToDeviceMessageQueue {
            inner: Arc::new(Inner {
                transport,
                store,
                config,
                policy,
                wake: Notify::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Starts the send worker. It resumes a paused queue whenever the sync
    /// state reported by `emitter` enters SYNCING.
    pub fn start(&self, emitter: &Emitter) -> tokio::task::JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let events = emitter.subscribe();
        tokio::spawn(async move { inner.run(events).await })
    }

    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    /// Persists the messages as one or more batches and wakes the worker.
    pub async fn queue_batch(
        &self,
        event_type: &str,
        messages: Vec<ToDeviceMessage>,
        next_txn_id: impl FnMut() -> String,
    ) -> ClientResult<Vec<u64>> {
        let batches = split_batches(event_type, messages, self.inner.config.max_batch_size, next_txn_id);
        if batches.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self.inner.store.save_to_device_batches(batches).await?;
        debug!(event_type, batches = ids.len(), "queued to-device batches");
        self.inner.wake.notify_one();
        Ok(ids)
    }
}

impl<T: Transport, P: Persistence> Inner<T, P> {
    async fn run(&self, mut events: broadcast::Receiver<ClientEvent>) {
        let mut paused = false;
        loop {
            if !paused {
                match self.send_next().await {
                    Progress::Sent => continue,
                    Progress::Idle => {}
                    Progress::Paused => paused = true,
                    Progress::Stopped => return,
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = self.wake.notified(), if !paused => {}
                event = events.recv() => match event {
                    Ok(ClientEvent::SyncStateChanged { new: SyncState::Syncing, old, .. })
                        if old != Some(SyncState::Syncing) =>
                    {
                        if paused {
                            info!("sync resumed, resuming to-device queue");
                        }
                        paused = false;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => debug!(missed, "to-device queue lagged behind events"),
                    Err(RecvError::Closed) => return,
                },
            }
        }
    }

    async fn send_next(&self) -> Progress {
        let batch = match self.store.get_oldest_to_device_batch().await {
            Ok(Some(batch)) => batch,
            Ok(None) => return Progress::Idle,
            Err(e) => {
                warn!(error = %e, "failed to load to-device batch, pausing");
                return Progress::Paused;
            }
        };

        let mut attempts = 0u32;
        loop {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Progress::Stopped,
                result = self.transport.send_to_device(batch.clone()) => result,
            };
            let err = match result {
                Ok(()) => {
                    debug!(id = batch.id, txn_id = %batch.txn_id, "sent to-device batch");
                    return self.remove(batch.id).await;
                }
                Err(err) => err,
            };

            attempts += 1;
            match self.policy.backoff(attempts, &err) {
                Retry::After(delay) => {
                    debug!(id = batch.id, attempts, error = %err, "retrying to-device batch");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Progress::Stopped,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Retry::GiveUp if err.is_client_error() => {
                    warn!(id = batch.id, error = %err, "dropping to-device batch rejected by server");
                    return self.remove(batch.id).await;
                }
                Retry::GiveUp => {
                    warn!(id = batch.id, error = %err, "to-device send failing, pausing until sync resumes");
                    return Progress::Paused;
                }
            }
        }
    }

    async fn remove(&self, id: u64) -> Progress {
        match self.store.remove_to_device_batch(id).await {
            Ok(()) => Progress::Sent,
            Err(e) => {
                warn!(id, error = %e, "failed to remove to-device batch, pausing");
                Progress::Paused
            }
        }
    }
}

#[cfg(test)]
#[path = "to_device_tests.rs"]
mod tests;
