// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for mx-core operations.

use thiserror::Error;

/// All possible errors that can occur in mx-core operations.
///
/// Every variant is a protocol or validation failure: it is raised
/// synchronously, never retried, and surfaced to the caller as-is.
#[derive(Debug, Error)]
pub enum Error {
    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("timeline not found: {0}")]
    TimelineNotFound(u64),

    #[error("event not found: {0}")]
    EventNotFound(String),

    #[error("unknown transaction id: {0}")]
    UnknownTransaction(String),

    #[error("invalid duplicate strategy: '{0}'\n  hint: valid strategies are: ignore, replace")]
    InvalidDuplicateStrategy(String),

    #[error("invalid pending event ordering: '{0}'\n  hint: valid orderings are: chronological, detached")]
    InvalidPendingOrdering(String),

    #[error("cannot add live events to timeline {0}: it is not the live timeline")]
    NotLiveTimeline(u64),

    #[error("cannot add events to the start of live-only timeline {0} after it has grown forwards")]
    LiveOnlyTimeline(u64),

    #[error("invalid status transition: cannot go from {from} to {to}\n  hint: from '{from}' you can go to: {valid_targets}")]
    InvalidTransition {
        from: String,
        to: String,
        valid_targets: String,
    },

    #[error("cannot cancel event in status {0}\n  hint: only queued or not_sent events can be cancelled")]
    NotCancellable(String),

    #[error("event has neither an event id nor a transaction id")]
    MissingIdentity,

    #[error("{0}")]
    InvalidInput(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for mx-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
