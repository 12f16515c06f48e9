// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! mx-core: room and timeline engine for the mx sync client
//!
//! This crate provides the synchronous data model shared by the client
//! runtime and the replay tool: events, room state, timelines and their
//! ordering, receipts, local-echo reconciliation and the projection of sync
//! responses onto rooms. Nothing here performs I/O.

pub mod clock;
pub mod error;
pub mod event;
pub mod naming;
pub mod notify;
pub mod ordering;
pub mod pending;
pub mod projector;
pub mod protocol;
pub mod receipts;
pub mod room;
pub mod state;
pub mod timeline;
pub mod timeline_set;

pub use clock::{ClockSource, SystemClock, TxnIdGenerator};
pub use error::{Error, Result};
pub use event::{types, Event, EventKey, EventMeta, EventStatus, Unsigned};
pub use notify::Notification;
pub use ordering::{compare_events, TimelineGraph};
pub use pending::{EchoOutcome, PendingEvent, PendingEventOrdering, PendingEventTracker, Reconciliation, Step};
pub use projector::RoomSyncProjector;
pub use protocol::{InvitedRoom, JoinedRoom, LeftRoom, RoomSummary, Rooms, SyncResponse, TimelineSection};
pub use receipts::{Receipt, Receipts};
pub use room::{Room, RoomOptions};
pub use state::{Member, Membership, RoomState};
pub use timeline::{Direction, Timeline, TimelineEntry, TimelineId};
pub use timeline_set::{DuplicateStrategy, LiveInsert, TimelineSet, TimelineSetOptions};
