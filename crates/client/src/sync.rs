// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The long-poll sync loop and its connection state machine.
//!
//! Startup fetches server capabilities and push rules and gets or creates the
//! sync filter. Then the loop requests one batch at a time, applying each to
//! the rooms before asking for the next.
//!
//! State transitions, as `old -> new`:
//!
//! | event | transition |
//! |-------|------------|
//! | first successful sync | `None -> PREPARED` |
//! | later successful sync | `PREPARED/SYNCING/RECONNECTING -> SYNCING` |
//! | first successful sync after ERROR | `ERROR -> CATCHUP` |
//! | failed sync, below threshold | `* -> RECONNECTING` |
//! | failed sync at threshold, or bootstrap call failed | `* -> ERROR` |
//! | keep-alive probe fails while in ERROR | `ERROR -> ERROR` |
//! | `stop()` | `* -> STOPPED` |
//!
//! After every failure the loop waits for a keep-alive probe to succeed
//! before retrying. [`SyncHandle::retry_immediately`] cuts that wait short,
//! including a probe already in flight.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use mx_core::{RoomSyncProjector, SyncResponse};
use serde_json::Value;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, SyncConfig};
use crate::emitter::{ClientEvent, Emitter, SyncState};
use crate::error::{TransportError, TransportResult};
use crate::persistence::Persistence;
use crate::rooms::RoomMap;
use crate::transport::{default_filter, SyncRequest, Transport};

/// Results of the startup calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Bootstrap {
    pub capabilities: Value,
    pub push_rules: Value,
    pub filter_id: String,
}

/// Everything needed to run the sync loop.
pub struct SyncApi<T: Transport, P: Persistence> {
    user_id: String,
    config: SyncConfig,
    transport: Arc<T>,
    store: Arc<P>,
    rooms: Arc<RoomMap>,
    projector: RoomSyncProjector,
}

impl<T: Transport, P: Persistence> SyncApi<T, P> {
    pub fn new(config: &ClientConfig, transport: Arc<T>, store: Arc<P>, rooms: Arc<RoomMap>) -> Self {
        SyncApi {
            user_id: config.user_id.clone(),
            config: config.sync.clone(),
            transport,
            store,
            rooms,
            projector: RoomSyncProjector::new(config.user_id.clone(), config.room_options()),
        }
    }

    /// Spawns the loop and returns a handle to observe and control it.
    pub fn start(self) -> SyncHandle {
        let shared = Arc::new(Shared {
            state: watch::Sender::new(None),
            retry: Notify::new(),
            waiting: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            bootstrap: OnceLock::new(),
            emitter: self.rooms.emitter().clone(),
        });
        let runner = Runner {
            api: self,
            shared: Arc::clone(&shared),
            failed: 0,
            has_synced: false,
            filter_id: None,
        };
        let task = tokio::spawn(runner.run());
        SyncHandle { shared, task }
    }
}

struct Shared {
    state: watch::Sender<Option<SyncState>>,
    /// Woken with `notify_waiters`, so a call that races the end of a wait
    /// leaves no permit behind for the next one.
    retry: Notify,
    /// True while a failed request waits to be retried.
    waiting: AtomicBool,
    cancel: CancellationToken,
    bootstrap: OnceLock<Bootstrap>,
    emitter: Emitter,
}

/// Handle to a running sync loop.
pub struct SyncHandle {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Current state; `None` until the first transition.
    pub fn state(&self) -> Option<SyncState> {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<Option<SyncState>> {
        self.shared.state.subscribe()
    }

    pub fn bootstrap(&self) -> Option<&Bootstrap> {
        self.shared.bootstrap.get()
    }

    /// Retries the failed request now, abandoning the keep-alive wait or
    /// probe. Returns false when nothing is waiting to be retried.
    pub fn retry_immediately(&self) -> bool {
        if !self.shared.waiting.load(Ordering::SeqCst) {
            return false;
        }
        self.shared.retry.notify_waiters();
        true
    }

    /// Stops the loop. Pending waits and requests are abandoned.
    pub fn stop(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Waits for the loop to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "sync task panicked");
        }
    }
}

struct Runner<T: Transport, P: Persistence> {
    api: SyncApi<T, P>,
    shared: Arc<Shared>,
    /// Consecutive failures since the last successful sync.
    failed: u32,
    has_synced: bool,
    filter_id: Option<String>,
}

impl<T: Transport, P: Persistence> Runner<T, P> {
    async fn run(mut self) {
        if let Some(bootstrap) = self.bootstrap().await {
            self.filter_id = Some(bootstrap.filter_id.clone());
            let _ = self.shared.bootstrap.set(bootstrap);
            self.sync_loop().await;
        }
        self.set_state(SyncState::Stopped, None);
    }

    async fn bootstrap(&mut self) -> Option<Bootstrap> {
        let transport = Arc::clone(&self.api.transport);
        let store = Arc::clone(&self.api.store);
        let user_id = self.api.user_id.clone();
        let filter_name = self.api.config.filter_name.clone();

        let capabilities = self.bootstrap_step("capabilities", || transport.capabilities()).await?;
        let push_rules = self.bootstrap_step("push rules", || transport.push_rules()).await?;
        let filter_id = self
            .bootstrap_step("filter", || get_or_create_filter(&*transport, &*store, &user_id, &filter_name))
            .await?;
        debug!(%filter_id, "bootstrap complete");
        Some(Bootstrap { capabilities, push_rules, filter_id })
    }

    /// Retries a startup call until it succeeds. Each failure moves to ERROR
    /// and waits for connectivity. Returns `None` when stopped.
    async fn bootstrap_step<R, F, Fut>(&mut self, step: &str, mut call: F) -> Option<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TransportResult<R>>,
    {
        loop {
            let result = tokio::select! {
                _ = self.shared.cancel.cancelled() => return None,
                result = call() => result,
            };
            match result {
                Ok(value) => return Some(value),
                Err(err) => {
                    warn!(step, error = %err, "startup request failed");
                    self.failed += 1;
                    self.set_state(SyncState::Error, Some(err));
                    if !self.wait_for_keep_alive(self.api.config.keep_alive_delay()).await {
                        return None;
                    }
                }
            }
        }
    }

    async fn sync_loop(&mut self) {
        let mut since = match self.api.store.get_saved_sync_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "failed to load saved sync token, starting from scratch");
                None
            }
        };
        let mut filter_recreated = false;

        loop {
            let request = SyncRequest {
                since: since.clone(),
                filter_id: self.filter_id.clone(),
                timeout_ms: self.poll_timeout_ms(),
            };
            let result = tokio::select! {
                _ = self.shared.cancel.cancelled() => return,
                result = self.api.transport.sync_once(request) => result,
            };

            match result {
                Ok(response) => {
                    since = Some(self.process(response, since.as_deref()).await);
                    filter_recreated = false;
                    self.on_sync_success();
                }
                Err(err) if err.is_not_found() && !filter_recreated => {
                    filter_recreated = true;
                    info!(filter_id = ?self.filter_id, "server rejected stored filter, recreating");
                    match create_filter(&*self.api.transport, &*self.api.store, &self.api.user_id, &self.api.config.filter_name)
                        .await
                    {
                        Ok(filter_id) => self.filter_id = Some(filter_id),
                        Err(err) => {
                            if !self.on_sync_failure(err).await {
                                return;
                            }
                        }
                    }
                }
                Err(err) => {
                    if !self.on_sync_failure(err).await {
                        return;
                    }
                }
            }
        }
    }

    /// Applies one batch and persists it. Returns the next `since` token.
    async fn process(&self, response: SyncResponse, since: Option<&str>) -> String {
        let SyncResponse { next_batch, rooms, to_device, .. } = response;
        let snapshots = self.api.rooms.apply_sync(&self.api.projector, rooms, since).await;
        for event in to_device.events {
            self.shared.emitter.emit(ClientEvent::ToDevice(event));
        }

        if let Err(e) = self.api.store.set_sync_token(next_batch.clone()).await {
            warn!(error = %e, "failed to store sync token");
        }
        for snapshot in snapshots {
            let room_id = snapshot.room_id.clone();
            if let Err(e) = self.api.store.store_room(snapshot).await {
                warn!(%room_id, error = %e, "failed to store room");
            }
        }
        next_batch
    }

    fn on_sync_success(&mut self) {
        let new = if !self.has_synced {
            SyncState::Prepared
        } else if self.state() == Some(SyncState::Error) {
            SyncState::Catchup
        } else {
            SyncState::Syncing
        };
        self.has_synced = true;
        self.failed = 0;
        self.set_state(new, None);
    }

    /// Records a failed sync and waits until it is worth retrying. Returns
    /// false when stopped.
    async fn on_sync_failure(&mut self, err: TransportError) -> bool {
        self.failed += 1;
        let new = if self.failed >= self.api.config.failed_sync_error_threshold {
            SyncState::Error
        } else {
            SyncState::Reconnecting
        };
        warn!(failed = self.failed, error = %err, "sync failed");
        self.set_state(new, Some(err));
        self.wait_for_keep_alive(self.api.config.keep_alive_delay()).await
    }

    /// Waits until the failed request is worth retrying: a keep-alive probe
    /// answered or [`SyncHandle::retry_immediately`] was called. Returns false
    /// when stopped.
    async fn wait_for_keep_alive(&mut self, first_delay: Duration) -> bool {
        let shared = Arc::clone(&self.shared);
        let retry = shared.retry.notified();
        tokio::pin!(retry);
        retry.as_mut().enable();
        shared.waiting.store(true, Ordering::SeqCst);

        let proceed = tokio::select! {
            _ = shared.cancel.cancelled() => false,
            _ = &mut retry => {
                debug!("retrying immediately");
                true
            }
            _ = self.probe_until_reachable(first_delay) => true,
        };
        shared.waiting.store(false, Ordering::SeqCst);
        proceed
    }

    /// Probes the server until it answers. A 4xx answer still proves the
    /// server is reachable.
    async fn probe_until_reachable(&mut self, first_delay: Duration) {
        let mut delay = first_delay;
        loop {
            tokio::time::sleep(delay).await;
            match self.api.transport.keep_alive().await {
                Ok(()) => return,
                Err(err) if err.is_client_error() => {
                    debug!(error = %err, "keep-alive answered with client error, server is reachable");
                    tokio::time::sleep(self.api.config.keep_alive_client_error_delay()).await;
                    return;
                }
                Err(err) => {
                    debug!(error = %err, "keep-alive failed");
                    self.failed += 1;
                    if self.state() == Some(SyncState::Error) || self.failed >= self.api.config.failed_sync_error_threshold {
                        self.set_state(SyncState::Error, Some(err));
                    }
                    delay = self.api.config.keep_alive_retry();
                }
            }
        }
    }

    /// While recovering, sync without waiting for new events.
    fn poll_timeout_ms(&self) -> u64 {
        match self.state() {
            Some(SyncState::Error | SyncState::Reconnecting) => 0,
            _ => self.api.config.timeout_ms,
        }
    }

    fn state(&self) -> Option<SyncState> {
        *self.shared.state.borrow()
    }

    fn set_state(&self, new: SyncState, error: Option<TransportError>) {
        let old = self.shared.state.send_replace(Some(new));
        if old == Some(new) {
            debug!(state = %new, "sync state unchanged");
        } else {
            info!(old = ?old, new = %new, "sync state changed");
        }
        self.shared.emitter.emit(ClientEvent::SyncStateChanged { new, old, error });
    }
}

async fn get_or_create_filter<T: Transport, P: Persistence>(
    transport: &T,
    store: &P,
    user_id: &str,
    name: &str,
) -> TransportResult<String> {
    match store.get_filter_id(name.to_string()).await {
        Ok(Some(filter_id)) => return Ok(filter_id),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "failed to load stored filter id"),
    }
    create_filter(transport, store, user_id, name).await
}

async fn create_filter<T: Transport, P: Persistence>(
    transport: &T,
    store: &P,
    user_id: &str,
    name: &str,
) -> TransportResult<String> {
    let filter_id = transport.create_filter(user_id.to_string(), default_filter()).await?;
    if let Err(e) = store.store_filter(name.to_string(), filter_id.clone()).await {
        warn!(error = %e, "failed to store filter id");
    }
    debug!(%filter_id, "created sync filter");
    Ok(filter_id)
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
