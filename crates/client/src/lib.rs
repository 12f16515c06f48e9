// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! mx-client: async runtime for the mx sync engine
//!
//! Drives the long-poll sync loop, schedules outbound sends and to-device
//! messages, persists progress, and fans out room notifications. The room
//! model itself lives in `mx-core`.

pub mod client;
pub mod config;
pub mod emitter;
pub mod error;
pub mod file_store;
pub mod persistence;
pub mod rooms;
pub mod scheduler;
pub mod sync;
pub mod to_device;
pub mod transport;

#[cfg(test)]
mod test_helpers;

pub use client::{Client, PendingSend};
pub use config::{ClientConfig, SchedulerConfig, SyncConfig, ToDeviceConfig};
pub use emitter::{ClientEvent, Emitter, SyncState};
pub use error::{ClientError, ClientResult, StoreError, StoreResult, TransportError, TransportResult};
pub use file_store::FileStore;
pub use persistence::{MemoryStore, Persistence, RoomSnapshot};
pub use rooms::RoomMap;
pub use scheduler::{queue_messages, retry_backoff_ratelimit, Retry, RetryPolicy, SendHandle, SendScheduler};
pub use sync::{Bootstrap, SyncApi, SyncHandle};
pub use to_device::{ToDeviceBatch, ToDeviceMessage, ToDeviceMessageQueue};
pub use transport::{SendOutcome, SendRequest, SyncRequest, Transport};
