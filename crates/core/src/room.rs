// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! A room: its timelines, threads, receipts, tags and local echoes.
//!
//! Every mutation records its notifications in an outbox instead of
//! publishing them directly. Callers apply a whole batch and then drain the
//! outbox with [`Room::take_notifications`], so observers only ever see fully
//! applied batches.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::event::{types, Event, EventKey, EventStatus};
use crate::naming::calculate_room_name;
use crate::notify::Notification;
use crate::pending::{EchoOutcome, PendingEvent, PendingEventOrdering, PendingEventTracker, Step};
use crate::protocol::{RoomSummary, UnreadNotifications};
use crate::receipts::{Receipt, Receipts, READ};
use crate::state::{Membership, RoomState};
use crate::timeline::{AddedEvent, Direction, Timeline, TimelineEntry, TimelineId};
use crate::timeline_set::{DuplicateStrategy, LiveInsert, TimelineSet, TimelineSetOptions};

/// Behaviour switches shared by every room of a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoomOptions {
    pub timeline_support: bool,
    pub pending_ordering: PendingEventOrdering,
    pub duplicate_strategy: DuplicateStrategy,
}

#[derive(Debug, Clone)]
pub struct Room {
    room_id: String,
    my_user_id: String,
    options: RoomOptions,
    timelines: TimelineSet,
    threads: BTreeMap<String, TimelineSet>,
    receipts: Receipts,
    tags: BTreeMap<String, Value>,
    account_data: BTreeMap<String, Arc<Event>>,
    pending: PendingEventTracker,
    summary: RoomSummary,
    unread: UnreadNotifications,
    membership: Option<Membership>,
    name: String,
    outbox: Vec<Notification>,
}

impl Room {
    pub fn new(room_id: impl Into<String>, my_user_id: impl Into<String>, options: RoomOptions) -> Self {
        let room_id = room_id.into();
        let timelines = TimelineSet::new(
            room_id.clone(),
            TimelineSetOptions { timeline_support: options.timeline_support, live_only: false },
        );
        Room {
            my_user_id: my_user_id.into(),
            options,
            timelines,
            threads: BTreeMap::new(),
            receipts: Receipts::new(),
            tags: BTreeMap::new(),
            account_data: BTreeMap::new(),
            pending: PendingEventTracker::new(options.pending_ordering),
            summary: RoomSummary::default(),
            unread: UnreadNotifications::default(),
            membership: None,
            name: room_id.clone(),
            room_id,
            outbox: Vec::new(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn my_user_id(&self) -> &str {
        &self.my_user_id
    }

    pub fn options(&self) -> RoomOptions {
        self.options
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeline_set(&self) -> &TimelineSet {
        &self.timelines
    }

    pub fn live_timeline(&self) -> &Timeline {
        self.timelines.live_timeline()
    }

    /// State after the last live event.
    pub fn current_state(&self) -> &RoomState {
        self.live_timeline().state(Direction::Forwards)
    }

    /// State before the first event of the live timeline.
    pub fn old_state(&self) -> &RoomState {
        self.live_timeline().state(Direction::Backwards)
    }

    pub fn find_event(&self, key: &EventKey) -> Option<&TimelineEntry> {
        self.timelines.find_event(key)
    }

    pub fn compare_event_ordering(&self, a: &str, b: &str) -> Option<Ordering> {
        self.timelines.compare_event_ordering(a, b)
    }

    /// Our membership: the sync section the room arrived in wins over state.
    pub fn my_membership(&self) -> Option<Membership> {
        self.membership.or_else(|| self.current_state().member(&self.my_user_id).and_then(|m| m.membership))
    }

    pub fn set_my_membership(&mut self, membership: Membership) {
        self.membership = Some(membership);
    }

    pub fn summary(&self) -> &RoomSummary {
        &self.summary
    }

    pub fn set_summary(&mut self, summary: &RoomSummary) {
        self.summary.merge(summary);
    }

    pub fn unread_notifications(&self) -> UnreadNotifications {
        self.unread
    }

    pub fn set_unread_notifications(&mut self, unread: UnreadNotifications) {
        self.unread = unread;
    }

    pub fn thread(&self, root_id: &str) -> Option<&TimelineSet> {
        self.threads.get(root_id)
    }

    pub fn thread_roots(&self) -> impl Iterator<Item = &str> {
        self.threads.keys().map(String::as_str)
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags.keys().cloned().collect()
    }

    pub fn tag(&self, tag: &str) -> Option<&Value> {
        self.tags.get(tag)
    }

    pub fn account_data(&self, event_type: &str) -> Option<&Arc<Event>> {
        self.account_data.get(event_type)
    }

    pub fn receipt_for_user(&self, user_id: &str, receipt_type: &str) -> Option<&Receipt> {
        self.receipts.receipt_for_user(&self.timelines, user_id, receipt_type)
    }

    pub fn users_read_up_to(&self, event_id: &str) -> Vec<String> {
        self.receipts.users_read_up_to(&self.timelines, event_id)
    }

    /// Local echoes still awaiting confirmation, oldest first.
    pub fn pending_events(&self) -> impl Iterator<Item = &PendingEvent> {
        self.pending.events()
    }

    pub fn pending_event(&self, txn_id: &str) -> Option<&PendingEvent> {
        self.pending.get(txn_id)
    }

    /// Drains the notifications recorded since the last call.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    fn emit_all(&mut self, notifications: impl IntoIterator<Item = Notification>) {
        self.outbox.extend(notifications);
    }

    fn emit_added(&mut self, timeline: TimelineId, added: AddedEvent, to_start: bool) {
        self.outbox.extend(added.state_changes);
        self.outbox.push(Notification::TimelineEvent {
            room_id: self.room_id.clone(),
            event_key: added.key,
            timeline,
            to_start,
        });
    }

    /// Applies state events outside the timeline.
    ///
    /// An empty live timeline has both boundary states seeded; otherwise the
    /// events only move the current state.
    pub fn apply_state_events(&mut self, events: &[Arc<Event>]) -> Result<()> {
        let live = self.timelines.live_timeline_mut();
        let notifications = if live.is_empty() {
            live.initialise_state(events)?
        } else {
            live.state_mut(Direction::Forwards).set_state_events(events, true)
        };
        self.emit_all(notifications);
        Ok(())
    }

    /// Applies stripped invite state. It never overrides real state.
    pub fn apply_stripped_state(&mut self, events: &[Arc<Event>]) {
        let live = self.timelines.live_timeline_mut();
        live.state_mut(Direction::Backwards).set_stripped_state(events);
        let notifications = live.state_mut(Direction::Forwards).set_stripped_state(events);
        self.emit_all(notifications);
    }

    /// Adds a batch of live events in order.
    ///
    /// Remote echoes of our own sends go through the pending tracker and
    /// are only inserted once the send has been confirmed too. Redactions
    /// rewrite their target in place. Thread replies are mirrored into the
    /// thread's own timeline set, and each sender gets a synthetic read
    /// receipt on their own event. Duplicates that are ignored do neither.
    ///
    /// An event that cannot be added (for example one without any id) is
    /// logged and skipped; the rest of the batch still applies.
    pub fn add_live_events(&mut self, events: Vec<Arc<Event>>) -> Result<()> {
        for event in events {
            let event_type = event.event_type.clone();
            if let Err(e) = self.add_live_event(event) {
                warn!(room_id = %self.room_id, %event_type, error = %e, "skipping live event");
            }
        }
        self.recalculate_name();
        Ok(())
    }

    fn add_live_event(&mut self, event: Arc<Event>) -> Result<()> {
        if event.key().is_none() {
            return Err(Error::MissingIdentity);
        }
        if event.event_type == types::ROOM_REDACTION {
            self.apply_redaction(&event)?;
        }

        let event = match self.pending.on_remote_echo(event) {
            EchoOutcome::NotPending(event) => event,
            EchoOutcome::Buffered => {
                debug!(room_id = %self.room_id, "remote echo buffered until send completes");
                return Ok(());
            }
            EchoOutcome::Ready(echo) => return self.splice_remote_echo(echo),
        };

        if self.insert_live(Arc::clone(&event))? {
            self.add_to_thread(&event)?;
            self.synthesize_receipt(&event);
        }
        Ok(())
    }

    /// Returns false when the event was an ignored duplicate.
    fn insert_live(&mut self, event: Arc<Event>) -> Result<bool> {
        let live = self.timelines.live_timeline_id();
        match self.timelines.add_live_event(event, self.options.duplicate_strategy, None)? {
            LiveInsert::Added(added) => self.emit_added(live, added, false),
            LiveInsert::Replaced { key } => trace!(room_id = %self.room_id, %key, "replaced duplicate event"),
            LiveInsert::Ignored { .. } => return Ok(false),
        }
        Ok(true)
    }

    fn apply_redaction(&mut self, redaction: &Event) -> Result<()> {
        let Some(target) = redaction.redacts.as_deref() else {
            return Ok(());
        };
        let key = EventKey::id(target);
        let Some(entry) = self.timelines.find_event(&key) else {
            trace!(room_id = %self.room_id, target, "redaction target not loaded");
            return Ok(());
        };
        if entry.event.is_redacted() {
            return Ok(());
        }
        let redacted = Arc::new(entry.event.redacted(redaction));
        self.timelines.replace_event(&key, redacted)?;
        Ok(())
    }

    fn add_to_thread(&mut self, event: &Arc<Event>) -> Result<()> {
        let Some(root) = event.thread_root().map(str::to_string) else {
            return Ok(());
        };
        let Some(key) = event.key() else {
            return Ok(());
        };
        let room_id = self.room_id.clone();
        let thread = self.threads.entry(root.clone()).or_insert_with(|| {
            TimelineSet::new(room_id, TimelineSetOptions { timeline_support: false, live_only: true })
        });
        if let LiveInsert::Added(_) =
            thread.add_live_event(Arc::clone(event), self.options.duplicate_strategy, None)?
        {
            self.outbox.push(Notification::ThreadUpdated { room_id: self.room_id.clone(), root_id: root, event_key: key });
        }
        Ok(())
    }

    fn synthesize_receipt(&mut self, event: &Event) {
        // A receipt on a redaction would point at an event clients hide.
        if event.event_type == types::ROOM_REDACTION {
            return;
        }
        let Some(event_id) = event.event_id.clone() else {
            return;
        };
        if self.current_state().member(&event.sender).is_none() {
            return;
        }
        let receipt = Receipt { event_id: event_id.clone(), ts: event.origin_server_ts };
        if self.receipts.add_receipt(&self.timelines, READ, &event.sender, receipt, true) {
            self.outbox.push(Notification::Receipt {
                room_id: self.room_id.clone(),
                event_id,
                receipt_type: READ.to_string(),
                user_id: event.sender.clone(),
                synthetic: true,
            });
        }
    }

    /// Handles one ephemeral event: receipts go to the receipt map,
    /// everything else to the current state's ephemeral handler.
    pub fn handle_ephemeral(&mut self, event: &Event) {
        if event.event_type == types::RECEIPT {
            for update in Receipts::parse(event) {
                let receipt = Receipt { event_id: update.event_id.clone(), ts: update.ts };
                if self.receipts.add_receipt(&self.timelines, &update.receipt_type, &update.user_id, receipt, false) {
                    self.outbox.push(Notification::Receipt {
                        room_id: self.room_id.clone(),
                        event_id: update.event_id,
                        receipt_type: update.receipt_type,
                        user_id: update.user_id,
                        synthetic: false,
                    });
                }
            }
            return;
        }
        let notifications = self.timelines.live_timeline_mut().state_mut(Direction::Forwards).handle_ephemeral(event);
        self.emit_all(notifications);
    }

    /// Stores room account data; `m.tag` replaces the tag map.
    pub fn add_account_data(&mut self, event: Arc<Event>) {
        if event.event_type == types::TAG {
            self.tags = event
                .content
                .get("tags")
                .and_then(Value::as_object)
                .map(|tags| tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();
            self.outbox.push(Notification::Tags { room_id: self.room_id.clone(), tags: self.tags() });
        }
        self.outbox.push(Notification::AccountData {
            room_id: self.room_id.clone(),
            event_type: event.event_type.clone(),
        });
        self.account_data.insert(event.event_type.clone(), event);
    }

    /// Replaces the live timeline after a gap.
    ///
    /// Local echoes still pending in chronological mode are carried over to
    /// the new live timeline when the old one is no longer reachable.
    pub fn reset_live_timeline(&mut self, back_token: Option<String>, forward_token: Option<String>) -> Result<()> {
        let notification = self.timelines.reset_live_timeline(back_token, forward_token)?;
        self.outbox.push(notification);

        if self.pending.ordering() == PendingEventOrdering::Chronological {
            let carried: Vec<(Arc<Event>, EventStatus)> = self
                .pending
                .events()
                .filter(|p| !self.timelines.contains_event(&EventKey::Txn(p.txn_id.clone())))
                .map(|p| (Arc::clone(&p.event), p.status))
                .collect();
            let live = self.timelines.live_timeline_id();
            for (event, status) in carried {
                let added = self.timelines.append_live(live, event, Some(status))?;
                self.emit_added(live, added, false);
            }
        }
        Ok(())
    }

    /// Gives a fresh, empty live timeline its first back-pagination token.
    pub fn initialise_back_token(&mut self, token: Option<String>) {
        let live = self.timelines.live_timeline_mut();
        if live.is_empty() && live.pagination_token(Direction::Backwards).is_none() {
            live.set_pagination_token(token, Direction::Backwards);
        }
    }

    /// Inserts paginated events at one end of a timeline.
    pub fn add_events_to_timeline(
        &mut self,
        events: Vec<Arc<Event>>,
        to_start: bool,
        timeline: TimelineId,
        pagination_token: Option<String>,
    ) -> Result<()> {
        let added = self.timelines.add_events_to_timeline(events, to_start, timeline, pagination_token)?;
        for added in added {
            self.emit_added(timeline, added, to_start);
        }
        Ok(())
    }

    /// Starts tracking a local echo. In chronological mode it is also shown
    /// at the end of the live timeline.
    pub fn add_pending_event(&mut self, event: Arc<Event>, status: EventStatus) -> Result<()> {
        self.pending.add(Arc::clone(&event), status)?;
        let key = event.key().ok_or(Error::MissingIdentity)?;
        match self.pending.ordering() {
            PendingEventOrdering::Chronological => {
                let live = self.timelines.live_timeline_id();
                let added = self.timelines.append_live(live, event, Some(status))?;
                self.emit_added(live, added, false);
            }
            PendingEventOrdering::Detached => {
                self.outbox.push(Notification::LocalEchoUpdated {
                    room_id: self.room_id.clone(),
                    event_key: key.clone(),
                    old_event_id: key,
                    old_status: None,
                });
            }
        }
        Ok(())
    }

    /// Moves a local echo to a new status.
    pub fn update_pending_status(&mut self, txn_id: &str, status: EventStatus) -> Result<()> {
        let old = self.pending.set_status(txn_id, status)?;
        self.reflect_status(txn_id, old, status)
    }

    fn reflect_status(&mut self, txn_id: &str, old: EventStatus, status: EventStatus) -> Result<()> {
        let key = EventKey::Txn(txn_id.to_string());
        if self.timelines.contains_event(&key) {
            self.timelines.set_status(&key, Some(status))?;
        }
        self.outbox.push(Notification::LocalEchoUpdated {
            room_id: self.room_id.clone(),
            event_key: key.clone(),
            old_event_id: key,
            old_status: Some(old),
        });
        Ok(())
    }

    /// Records the send response for a local echo.
    pub fn on_send_response(&mut self, txn_id: &str, event_id: &str) -> Result<()> {
        match self.pending.on_send_response(txn_id, event_id)? {
            Step::Splice(echo) => self.splice_remote_echo(echo),
            Step::Wait => Ok(()),
        }
    }

    /// Records a failed send. The local echo becomes `not_sent` unless the
    /// remote echo had already arrived.
    pub fn on_send_failure(&mut self, txn_id: &str) -> Result<()> {
        match self.pending.on_send_failure(txn_id)? {
            Some(echo) => self.splice_remote_echo(echo),
            None => self.reflect_status(txn_id, EventStatus::Sending, EventStatus::NotSent),
        }
    }

    /// Cancels a queued or unsent local echo and removes it from view.
    pub fn cancel_pending_event(&mut self, txn_id: &str) -> Result<PendingEvent> {
        let old_status = self.pending.get(txn_id).map(|p| p.status);
        let cancelled = self.pending.cancel(txn_id)?;
        let key = EventKey::Txn(txn_id.to_string());
        self.timelines.remove_event(&key);
        self.outbox.push(Notification::LocalEchoUpdated {
            room_id: self.room_id.clone(),
            event_key: key.clone(),
            old_event_id: key,
            old_status,
        });
        Ok(cancelled)
    }

    /// Replaces a local echo with its confirmed remote echo.
    ///
    /// The remote echo keeps the local echo's position when the local echo
    /// is in the timeline; otherwise it is appended live.
    fn splice_remote_echo(&mut self, echo: Arc<Event>) -> Result<()> {
        let txn_id = echo
            .transaction_id()
            .ok_or_else(|| Error::InvalidInput("remote echo has no transaction id".to_string()))?
            .to_string();
        let old_key = EventKey::Txn(txn_id);
        let new_key = echo.key().ok_or(Error::MissingIdentity)?;

        if self.timelines.contains_event(&old_key) {
            if self.timelines.contains_event(&new_key) {
                self.timelines.remove_event(&old_key);
            } else {
                self.timelines.replace_event(&old_key, Arc::clone(&echo))?;
                self.timelines.set_status(&new_key, None)?;
            }
        } else {
            self.insert_live(Arc::clone(&echo))?;
        }
        debug!(room_id = %self.room_id, %old_key, %new_key, "local echo replaced by remote echo");

        self.outbox.push(Notification::LocalEchoUpdated {
            room_id: self.room_id.clone(),
            event_key: new_key,
            old_event_id: old_key,
            old_status: Some(EventStatus::Sending),
        });
        self.add_to_thread(&echo)?;
        self.synthesize_receipt(&echo);
        Ok(())
    }

    /// Recomputes the display name, notifying when it changed.
    pub fn recalculate_name(&mut self) {
        let name = calculate_room_name(self.current_state(), &self.summary, &self.my_user_id);
        if name != self.name {
            self.name = name.clone();
            self.outbox.push(Notification::NameChanged { room_id: self.room_id.clone(), name });
        }
    }
}

#[cfg(test)]
#[path = "room_tests.rs"]
mod tests;
