// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Local echoes awaiting server confirmation.
//!
//! A sent event is confirmed by two independent signals: the send response
//! carrying the server-assigned event id, and the remote echo arriving over
//! sync with our transaction id in its unsigned data. Either may come first.
//! The local echo is only replaced once both have been seen; until then it
//! stays visible with status `sending`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::event::{Event, EventStatus};

/// Where local echoes are shown while they are pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PendingEventOrdering {
    /// In the live timeline, in send order.
    #[default]
    Chronological,
    /// In a separate pending list, outside the timeline.
    Detached,
}

impl PendingEventOrdering {
    pub fn as_str(self) -> &'static str {
        match self {
            PendingEventOrdering::Chronological => "chronological",
            PendingEventOrdering::Detached => "detached",
        }
    }
}

impl fmt::Display for PendingEventOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PendingEventOrdering {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chronological" => Ok(PendingEventOrdering::Chronological),
            "detached" => Ok(PendingEventOrdering::Detached),
            other => Err(Error::InvalidPendingOrdering(other.to_string())),
        }
    }
}

impl TryFrom<String> for PendingEventOrdering {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PendingEventOrdering> for String {
    fn from(value: PendingEventOrdering) -> Self {
        value.as_str().to_string()
    }
}

/// Progress of one transaction towards confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    AwaitingBoth,
    /// The send response arrived; waiting for the remote echo.
    AwaitingEcho { event_id: String },
    /// The remote echo arrived first and is held back.
    AwaitingResponse { echo: Arc<Event> },
    Complete,
}

/// What the caller should do after feeding a signal in.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Wait,
    /// Both signals seen: replace the local echo with this event.
    Splice(Arc<Event>),
}

impl Reconciliation {
    pub fn on_response(&mut self, event_id: impl Into<String>) -> Step {
        match std::mem::replace(self, Reconciliation::Complete) {
            Reconciliation::AwaitingBoth | Reconciliation::AwaitingEcho { .. } => {
                *self = Reconciliation::AwaitingEcho { event_id: event_id.into() };
                Step::Wait
            }
            Reconciliation::AwaitingResponse { echo } => Step::Splice(echo),
            Reconciliation::Complete => Step::Wait,
        }
    }

    pub fn on_echo(&mut self, echo: Arc<Event>) -> Step {
        match std::mem::replace(self, Reconciliation::Complete) {
            Reconciliation::AwaitingBoth | Reconciliation::AwaitingResponse { .. } => {
                *self = Reconciliation::AwaitingResponse { echo };
                Step::Wait
            }
            Reconciliation::AwaitingEcho { .. } => Step::Splice(echo),
            Reconciliation::Complete => Step::Wait,
        }
    }

    /// Event id from the send response, once known.
    pub fn confirmed_event_id(&self) -> Option<&str> {
        match self {
            Reconciliation::AwaitingEcho { event_id } => Some(event_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub txn_id: String,
    pub event: Arc<Event>,
    pub status: EventStatus,
    pub reconciliation: Reconciliation,
}

/// Result of offering a remote echo to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum EchoOutcome {
    /// Not one of ours; handle as a normal live event.
    NotPending(Arc<Event>),
    /// Held until the send response arrives.
    Buffered,
    /// Replace the local echo with this event.
    Ready(Arc<Event>),
}

#[derive(Debug, Clone, Default)]
pub struct PendingEventTracker {
    ordering: PendingEventOrdering,
    pending: Vec<PendingEvent>,
}

impl PendingEventTracker {
    pub fn new(ordering: PendingEventOrdering) -> Self {
        PendingEventTracker { ordering, pending: Vec::new() }
    }

    pub fn ordering(&self) -> PendingEventOrdering {
        self.ordering
    }

    /// Pending events in the order they were created.
    pub fn events(&self) -> impl Iterator<Item = &PendingEvent> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get(&self, txn_id: &str) -> Option<&PendingEvent> {
        self.pending.iter().find(|p| p.txn_id == txn_id)
    }

    fn get_mut(&mut self, txn_id: &str) -> Result<&mut PendingEvent> {
        self.pending
            .iter_mut()
            .find(|p| p.txn_id == txn_id)
            .ok_or_else(|| Error::UnknownTransaction(txn_id.to_string()))
    }

    fn take(&mut self, txn_id: &str) -> Option<PendingEvent> {
        let idx = self.pending.iter().position(|p| p.txn_id == txn_id)?;
        Some(self.pending.remove(idx))
    }

    /// Starts tracking a local event. It must carry a transaction id.
    pub fn add(&mut self, event: Arc<Event>, status: EventStatus) -> Result<()> {
        let txn_id = event
            .transaction_id()
            .ok_or_else(|| Error::InvalidInput("pending event has no transaction id".to_string()))?
            .to_string();
        if self.get(&txn_id).is_some() {
            return Err(Error::InvalidInput(format!("transaction {txn_id} is already pending")));
        }
        self.pending.push(PendingEvent { txn_id, event, status, reconciliation: Reconciliation::AwaitingBoth });
        Ok(())
    }

    /// Moves a pending event to `status`, returning the previous status.
    pub fn set_status(&mut self, txn_id: &str, status: EventStatus) -> Result<EventStatus> {
        let pending = self.get_mut(txn_id)?;
        let old = pending.status;
        if !old.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                from: old.to_string(),
                to: status.to_string(),
                valid_targets: old.valid_targets().iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "),
            });
        }
        pending.status = status;
        if status == EventStatus::Sending {
            pending.reconciliation = Reconciliation::AwaitingBoth;
        }
        Ok(old)
    }

    /// Cancels a queued or unsent event and stops tracking it. Anything else
    /// is an error and leaves the event untouched.
    pub fn cancel(&mut self, txn_id: &str) -> Result<PendingEvent> {
        let status = self.get_mut(txn_id)?.status;
        if !status.is_cancellable() {
            return Err(Error::NotCancellable(status.to_string()));
        }
        let mut pending = self.take(txn_id).ok_or_else(|| Error::UnknownTransaction(txn_id.to_string()))?;
        pending.status = EventStatus::Cancelled;
        Ok(pending)
    }

    /// Records the send response for a transaction.
    pub fn on_send_response(&mut self, txn_id: &str, event_id: &str) -> Result<Step> {
        let pending = self.get_mut(txn_id)?;
        let step = pending.reconciliation.on_response(event_id);
        if let Step::Splice(_) = step {
            self.take(txn_id);
        }
        debug!(txn_id, event_id, spliced = matches!(step, Step::Splice(_)), "send confirmed");
        Ok(step)
    }

    /// Offers a live event that may be the remote echo of one of ours.
    pub fn on_remote_echo(&mut self, echo: Arc<Event>) -> EchoOutcome {
        let Some(txn_id) = echo.transaction_id().map(str::to_string) else {
            return EchoOutcome::NotPending(echo);
        };
        let Ok(pending) = self.get_mut(&txn_id) else {
            return EchoOutcome::NotPending(echo);
        };
        if pending.status != EventStatus::Sending {
            // The server has it even though our send looked failed.
            self.take(&txn_id);
            return EchoOutcome::Ready(echo);
        }
        match pending.reconciliation.on_echo(echo) {
            Step::Wait => EchoOutcome::Buffered,
            Step::Splice(echo) => {
                self.take(&txn_id);
                EchoOutcome::Ready(echo)
            }
        }
    }

    /// Marks a send as failed. When the echo was already buffered the
    /// server evidently has the event, so it is returned for splicing.
    pub fn on_send_failure(&mut self, txn_id: &str) -> Result<Option<Arc<Event>>> {
        let pending = self.get_mut(txn_id)?;
        if let Reconciliation::AwaitingResponse { echo } = &pending.reconciliation {
            let echo = Arc::clone(echo);
            self.take(txn_id);
            return Ok(Some(echo));
        }
        self.set_status(txn_id, EventStatus::NotSent)?;
        Ok(None)
    }

    pub fn remove(&mut self, txn_id: &str) -> Option<PendingEvent> {
        self.take(txn_id)
    }
}

#[cfg(test)]
#[path = "pending_tests.rs"]
mod tests;
