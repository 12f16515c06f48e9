// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! High-level client tying the pieces together.
//!
//! Provides:
//! - the sync loop, applying batches to shared rooms
//! - sending room events with local echoes, through the send scheduler
//! - resending and cancelling local echoes
//! - the persistent to-device queue
//! - a single notification stream for all of the above

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use mx_core::{ClockSource, Error, Event, EventKey, EventStatus, Room, SystemClock, TxnIdGenerator};
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::emitter::{ClientEvent, Emitter};
use crate::error::{ClientError, ClientResult};
use crate::persistence::{MemoryStore, Persistence};
use crate::rooms::RoomMap;
use crate::scheduler::{queue_messages, ProcessFn, RetryPolicy, SendHandle, SendScheduler};
use crate::sync::{SyncApi, SyncHandle};
use crate::to_device::{ToDeviceMessage, ToDeviceMessageQueue};
use crate::transport::{SendOutcome, SendRequest, Transport};

/// A local echo that has been handed to the sender.
#[derive(Debug)]
pub struct PendingSend {
    pub txn_id: String,
    pub handle: SendHandle,
}

pub struct Client<T: Transport, P: Persistence = MemoryStore> {
    config: ClientConfig,
    transport: Arc<T>,
    store: Arc<P>,
    rooms: Arc<RoomMap>,
    scheduler: SendScheduler,
    txn_ids: Arc<TxnIdGenerator<Arc<dyn ClockSource>>>,
    to_device: ToDeviceMessageQueue<T, P>,
    to_device_started: AtomicBool,
}

impl<T: Transport> Client<T, MemoryStore> {
    /// Creates a client that keeps everything in memory.
    pub fn new(config: ClientConfig, transport: T) -> ClientResult<Self> {
        Self::with_store(config, transport, MemoryStore::new())
    }
}

impl<T: Transport, P: Persistence> Client<T, P> {
    pub fn with_store(config: ClientConfig, transport: T, store: P) -> ClientResult<Self> {
        Self::with_clock(config, Arc::new(transport), Arc::new(store), Arc::new(SystemClock))
    }

    /// Creates a client with an explicit clock for transaction ids and timestamps.
    pub fn with_clock(
        config: ClientConfig,
        transport: Arc<T>,
        store: Arc<P>,
        clock: Arc<dyn ClockSource>,
    ) -> ClientResult<Self> {
        config.validate()?;
        let rooms = Arc::new(RoomMap::new(Emitter::default()));
        let policy = RetryPolicy::from(config.scheduler);
        let scheduler = SendScheduler::with_policies(
            dispatcher(Arc::clone(&transport), Arc::clone(&rooms)),
            Arc::new(queue_messages),
            Arc::new(move |_: &Event, attempts: u32, err: &ClientError| policy.retry(attempts, err)),
        );
        let to_device = ToDeviceMessageQueue::new(Arc::clone(&transport), Arc::clone(&store), config.to_device, policy);

        Ok(Client {
            config,
            transport,
            store,
            rooms,
            scheduler,
            txn_ids: Arc::new(TxnIdGenerator::with_clock(clock)),
            to_device,
            to_device_started: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn user_id(&self) -> &str {
        &self.config.user_id
    }

    pub fn store(&self) -> &Arc<P> {
        &self.store
    }

    pub fn rooms(&self) -> &Arc<RoomMap> {
        &self.rooms
    }

    pub fn scheduler(&self) -> &SendScheduler {
        &self.scheduler
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.rooms.emitter().subscribe()
    }

    /// A copy of a room as it is now.
    pub async fn room(&self, room_id: &str) -> Option<Room> {
        self.rooms.get(room_id).await
    }

    /// Adds an empty room, for rooms the client knows about before sync does.
    pub async fn add_room(&self, room_id: &str) {
        let room = Room::new(room_id, self.config.user_id.clone(), self.config.room_options());
        self.rooms.insert(room).await;
    }

    /// Starts the sync loop and, on first call, the to-device worker.
    pub fn start(&self) -> SyncHandle {
        if !self.to_device_started.swap(true, Ordering::SeqCst) {
            self.to_device.start(self.rooms.emitter());
        }
        SyncApi::new(&self.config, Arc::clone(&self.transport), Arc::clone(&self.store), Arc::clone(&self.rooms))
            .start()
    }

    /// Stops background work owned by the client. The sync loop is stopped
    /// through its own handle.
    pub fn stop(&self) {
        self.to_device.stop();
    }

    /// Creates a local echo for a new room event and sends it.
    ///
    /// Events the scheduler queues start as `queued`; everything else starts
    /// as `sending`. The handle resolves once the server has answered or the
    /// scheduler has given up.
    pub async fn send_event(&self, room_id: &str, event_type: &str, content: Value) -> ClientResult<PendingSend> {
        let txn_id = self.txn_ids.next_id();
        let event = Arc::new(
            Event::new(event_type, self.config.user_id.clone(), content)
                .with_room(room_id)
                .with_transaction_id(txn_id.clone())
                .with_ts(self.txn_ids.now_ms()),
        );
        let status = match self.scheduler.queue_name(&event) {
            Some(_) => EventStatus::Queued,
            None => EventStatus::Sending,
        };
        self.rooms.update(room_id, |room| room.add_pending_event(Arc::clone(&event), status)).await?;
        debug!(room_id, %txn_id, status = status.as_str(), "created local echo");

        let handle = self.dispatch(event).await;
        Ok(PendingSend { txn_id, handle })
    }

    /// Sends a local echo that previously failed again.
    pub async fn resend(&self, room_id: &str, txn_id: &str) -> ClientResult<SendHandle> {
        let event = self
            .rooms
            .update(room_id, |room| {
                let event = room
                    .pending_event(txn_id)
                    .map(|pending| Arc::clone(&pending.event))
                    .ok_or_else(|| Error::UnknownTransaction(txn_id.to_string()))?;
                room.update_pending_status(txn_id, EventStatus::Queued)?;
                Ok(event)
            })
            .await?;
        Ok(self.dispatch(event).await)
    }

    /// Cancels a local echo that is queued or failed. Cancelling an event
    /// that is being sent is an error and changes nothing.
    pub async fn cancel_pending_event(&self, room_id: &str, txn_id: &str) -> ClientResult<()> {
        self.rooms.update(room_id, |room| room.cancel_pending_event(txn_id)).await?;
        if self.scheduler.remove(&EventKey::Txn(txn_id.to_string())).await {
            debug!(room_id, txn_id, "removed cancelled event from send queue");
        }
        Ok(())
    }

    /// Queues to-device messages for delivery.
    pub async fn send_to_device(&self, event_type: &str, messages: Vec<ToDeviceMessage>) -> ClientResult<Vec<u64>> {
        let txn_ids = Arc::clone(&self.txn_ids);
        self.to_device.queue_batch(event_type, messages, move || txn_ids.next_id()).await
    }

    /// Hands an event to the scheduler, or sends it directly when no queue
    /// takes it, and applies the result to its room.
    async fn dispatch(&self, event: Arc<Event>) -> SendHandle {
        let scheduled = self.scheduler.queue(Arc::clone(&event)).await;
        let transport = Arc::clone(&self.transport);
        let rooms = Arc::clone(&self.rooms);
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = match scheduled {
                Some(handle) => handle.outcome().await,
                None => dispatch_event(&*transport, &rooms, &event).await,
            };
            apply_send_result(&rooms, &event, &result).await;
            let _ = tx.send(result);
        });
        SendHandle::new(rx)
    }
}

/// Process function for the scheduler.
fn dispatcher<T: Transport>(transport: Arc<T>, rooms: Arc<RoomMap>) -> ProcessFn {
    Arc::new(move |event: Arc<Event>| {
        let transport = Arc::clone(&transport);
        let rooms = Arc::clone(&rooms);
        async move { dispatch_event(&*transport, &rooms, &event).await }.boxed()
    })
}

/// One send attempt. A queued echo becomes `sending`; an echo that is no
/// longer pending was cancelled and is not sent.
async fn dispatch_event<T: Transport>(transport: &T, rooms: &RoomMap, event: &Event) -> ClientResult<SendOutcome> {
    let request = send_request(event)?;
    let status = rooms
        .update(&request.room_id, |room| {
            let status = room.pending_event(&request.txn_id).map(|pending| pending.status);
            if status == Some(EventStatus::Queued) {
                room.update_pending_status(&request.txn_id, EventStatus::Sending)?;
            }
            Ok(status)
        })
        .await?;
    if status.is_none() {
        return Err(ClientError::Cancelled);
    }
    Ok(transport.send_event(request).await?)
}

async fn apply_send_result(rooms: &RoomMap, event: &Event, result: &ClientResult<SendOutcome>) {
    let (Some(room_id), Some(txn_id)) = (event.room_id.as_deref(), event.transaction_id()) else {
        return;
    };
    let applied = match result {
        Ok(SendOutcome::EventId(event_id)) => {
            debug!(room_id, txn_id, event_id, "send confirmed");
            rooms.update(room_id, |room| room.on_send_response(txn_id, event_id)).await
        }
        Ok(SendOutcome::DelayId(delay_id)) => {
            debug!(room_id, txn_id, delay_id, "send scheduled by server");
            rooms.update(room_id, |room| room.update_pending_status(txn_id, EventStatus::Sent)).await
        }
        Err(ClientError::Cancelled) => Ok(()),
        Err(err) => {
            warn!(room_id, txn_id, error = %err, "send failed");
            rooms.update(room_id, |room| room.on_send_failure(txn_id)).await
        }
    };
    if let Err(e) = applied {
        warn!(room_id, txn_id, error = %e, "failed to apply send result");
    }
}

fn send_request(event: &Event) -> ClientResult<SendRequest> {
    let room_id = event.room_id.clone().ok_or_else(|| Error::InvalidInput("event has no room id".to_string()))?;
    let txn_id = event.transaction_id().ok_or(Error::MissingIdentity)?.to_string();
    Ok(SendRequest {
        room_id,
        txn_id,
        event_type: event.event_type.clone(),
        content: event.content.clone(),
        state_key: event.state_key.clone(),
    })
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
