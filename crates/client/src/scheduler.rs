// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Per-queue FIFO dispatcher for outbound events.
//!
//! A queue function assigns each event to a named queue, or to none, in which
//! case the caller sends it directly. Each named queue has at most one worker
//! task: the entry at the head of the queue is the one being dispatched, and
//! the next entry is not started until the head has settled. Independent
//! queues run concurrently.
//!
//! A failed dispatch asks the retry function what to do. While a retry is
//! waiting the queue stays blocked; giving up rejects the entry's handle with
//! the last error and moves on to the next entry.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use mx_core::{types, Event, EventKey};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::config::SchedulerConfig;
use crate::error::{ClientError, ClientResult, TransportError};
use crate::transport::SendOutcome;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    After(Duration),
    GiveUp,
}

/// Decides which queue an event joins. `None` means "not scheduled".
pub type QueueFn = Arc<dyn Fn(&Event) -> Option<String> + Send + Sync>;

/// Decides whether and when to retry. Receives the number of failed attempts so far.
pub type RetryFn = Arc<dyn Fn(&Event, u32, &ClientError) -> Retry + Send + Sync>;

/// Performs one dispatch attempt.
pub type ProcessFn = Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, ClientResult<SendOutcome>> + Send + Sync>;

/// Rate-limit-aware exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(SchedulerConfig::default())
    }
}

impl From<SchedulerConfig> for RetryPolicy {
    fn from(config: SchedulerConfig) -> Self {
        RetryPolicy { max_attempts: config.max_attempts, base_delay: Duration::from_millis(config.base_delay_ms) }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `attempts` failures.
    ///
    /// Bad request and auth failures are never retried. A rate-limit response
    /// waits as long as the server asks. Anything else backs off
    /// exponentially until `max_attempts` is reached.
    pub fn backoff(&self, attempts: u32, err: &TransportError) -> Retry {
        if matches!(err.status, Some(400 | 401 | 403)) {
            return Retry::GiveUp;
        }
        if err.is_rate_limited() {
            if let Some(wait) = err.retry_after_ms.filter(|ms| *ms > 0) {
                return Retry::After(Duration::from_millis(wait));
            }
        }
        if attempts >= self.max_attempts {
            return Retry::GiveUp;
        }
        let factor = 2u32.saturating_pow(attempts);
        Retry::After(self.base_delay.saturating_mul(factor))
    }

    /// [`RetryPolicy::backoff`] over client errors; only transport errors are retried.
    pub fn retry(&self, attempts: u32, err: &ClientError) -> Retry {
        match err.transport() {
            Some(err) => self.backoff(attempts, err),
            None => Retry::GiveUp,
        }
    }
}

/// Default retry function: [`RetryPolicy::default`] for every event.
pub fn retry_backoff_ratelimit(_event: &Event, attempts: u32, err: &ClientError) -> Retry {
    RetryPolicy::default().retry(attempts, err)
}

/// Default queue function: messages and events related to another event
/// share the "message" queue; everything else is sent directly.
pub fn queue_messages(event: &Event) -> Option<String> {
    if event.event_type == types::ROOM_MESSAGE || event.has_association() {
        return Some("message".to_string());
    }
    None
}

/// Resolves once a scheduled event has been sent or given up on.
#[derive(Debug)]
pub struct SendHandle {
    rx: oneshot::Receiver<ClientResult<SendOutcome>>,
}

impl SendHandle {
    pub(crate) fn new(rx: oneshot::Receiver<ClientResult<SendOutcome>>) -> Self {
        SendHandle { rx }
    }

    pub async fn outcome(self) -> ClientResult<SendOutcome> {
        self.rx.await.unwrap_or(Err(ClientError::ChannelClosed))
    }
}

struct Entry {
    key: Option<EventKey>,
    event: Arc<Event>,
    done: oneshot::Sender<ClientResult<SendOutcome>>,
}

struct Shared {
    queues: Mutex<HashMap<String, VecDeque<Entry>>>,
    process: ProcessFn,
    queue_fn: QueueFn,
    retry_fn: RetryFn,
}

/// Outbound event scheduler. Cheap to clone.
#[derive(Clone)]
pub struct SendScheduler {
    shared: Arc<Shared>,
}

impl SendScheduler {
    /// Creates a scheduler with [`queue_messages`] and [`retry_backoff_ratelimit`].
    pub fn new(process: ProcessFn) -> Self {
        Self::with_policies(process, Arc::new(queue_messages), Arc::new(retry_backoff_ratelimit))
    }

    pub fn with_policies(process: ProcessFn, queue_fn: QueueFn, retry_fn: RetryFn) -> Self {
        SendScheduler {
            shared: Arc::new(Shared { queues: Mutex::new(HashMap::new()), process, queue_fn, retry_fn }),
        }
    }

    /// The queue an event would join, without queueing it.
    pub fn queue_name(&self, event: &Event) -> Option<String> {
        (self.shared.queue_fn)(event)
    }

    /// Queues an event. Returns `None` if the queue function declines it.
    pub async fn queue(&self, event: Arc<Event>) -> Option<SendHandle> {
        let name = self.queue_name(&event)?;
        let (done, rx) = oneshot::channel();
        let start_worker = {
            let mut queues = self.shared.queues.lock().await;
            let queue = queues.entry(name.clone()).or_default();
            queue.push_back(Entry { key: event.key(), event, done });
            queue.len() == 1
        };
        if start_worker {
            debug!(queue = %name, "starting queue worker");
            tokio::spawn(process_queue(Arc::clone(&self.shared), name));
        }
        Some(SendHandle::new(rx))
    }

    /// Removes a queued event that has not been dispatched yet. The head of
    /// each queue is already being dispatched and cannot be removed.
    pub async fn remove(&self, key: &EventKey) -> bool {
        let removed = {
            let mut queues = self.shared.queues.lock().await;
            queues.values_mut().find_map(|queue| {
                let index = queue.iter().skip(1).position(|entry| entry.key.as_ref() == Some(key))? + 1;
                queue.remove(index)
            })
        };
        match removed {
            Some(entry) => {
                let _ = entry.done.send(Err(ClientError::Cancelled));
                true
            }
            None => false,
        }
    }

    /// Events still waiting in a queue, head first.
    pub async fn queued_events(&self, name: &str) -> Vec<Arc<Event>> {
        let queues = self.shared.queues.lock().await;
        queues
            .get(name)
            .map(|queue| queue.iter().map(|entry| Arc::clone(&entry.event)).collect())
            .unwrap_or_default()
    }
}

async fn process_queue(shared: Arc<Shared>, name: String) {
    loop {
        let head = {
            let queues = shared.queues.lock().await;
            queues.get(&name).and_then(|queue| queue.front()).map(|entry| Arc::clone(&entry.event))
        };
        let Some(event) = head else { return };

        let result = dispatch(&shared, &name, &event).await;

        let (entry, drained) = {
            let mut queues = shared.queues.lock().await;
            match queues.get_mut(&name) {
                Some(queue) => {
                    let entry = queue.pop_front();
                    let drained = queue.is_empty();
                    if drained {
                        queues.remove(&name);
                    }
                    (entry, drained)
                }
                None => (None, true),
            }
        };
        if let Some(entry) = entry {
            let _ = entry.done.send(result);
        }
        if drained {
            debug!(queue = %name, "queue drained");
            return;
        }
    }
}

async fn dispatch(shared: &Shared, name: &str, event: &Arc<Event>) -> ClientResult<SendOutcome> {
    let mut attempts = 0u32;
    loop {
        let err = match (shared.process)(Arc::clone(event)).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) => err,
        };
        attempts += 1;
        match (shared.retry_fn)(event, attempts, &err) {
            Retry::After(delay) => {
                debug!(queue = %name, attempts, delay_ms = delay.as_millis() as u64, error = %err, "retrying send");
                tokio::time::sleep(delay).await;
            }
            Retry::GiveUp => {
                warn!(queue = %name, attempts, error = %err, "giving up on send");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
