// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Loaded from TOML. Every field except `user_id` has a default:
//!
//! ```toml
//! user_id = "@alice:example.org"
//! timeline_support = true
//! pending_event_ordering = "detached"
//! duplicate_strategy = "replace"
//!
//! [sync]
//! timeout_ms = 30000
//! failed_sync_error_threshold = 3
//! ```
//!
//! Strategy strings are closed sets; an unknown value fails at load time.

use std::fs;
use std::path::Path;
use std::time::Duration;

use mx_core::{DuplicateStrategy, PendingEventOrdering, RoomOptions};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Fully qualified id of the local user, e.g. `@alice:example.org`.
    pub user_id: String,
    /// Keep old timelines linked after a gap instead of discarding them.
    #[serde(default)]
    pub timeline_support: bool,
    #[serde(default)]
    pub pending_event_ordering: PendingEventOrdering,
    #[serde(default)]
    pub duplicate_strategy: DuplicateStrategy,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub to_device: ToDeviceConfig,
}

/// Long-poll loop and keep-alive timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Server-side long-poll timeout.
    pub timeout_ms: u64,
    /// Consecutive failed syncs before the state becomes ERROR rather than RECONNECTING.
    pub failed_sync_error_threshold: u32,
    /// Wait before the first keep-alive probe after a failure.
    pub keep_alive_delay_ms: u64,
    /// Wait between failed keep-alive probes.
    pub keep_alive_retry_ms: u64,
    /// Wait after a keep-alive probe answered with a 4xx before resuming.
    pub keep_alive_client_error_delay_ms: u64,
    /// Name under which the sync filter id is persisted.
    pub filter_name: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            timeout_ms: 30_000,
            failed_sync_error_threshold: 3,
            keep_alive_delay_ms: 2_000,
            keep_alive_retry_ms: 5_000,
            keep_alive_client_error_delay_ms: 2_000,
            filter_name: "mx-client".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn keep_alive_delay(&self) -> Duration {
        Duration::from_millis(self.keep_alive_delay_ms)
    }

    pub fn keep_alive_retry(&self) -> Duration {
        Duration::from_millis(self.keep_alive_retry_ms)
    }

    pub fn keep_alive_client_error_delay(&self) -> Duration {
        Duration::from_millis(self.keep_alive_client_error_delay_ms)
    }
}

/// Retry policy for outbound sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Attempts after which a failing send gives up.
    pub max_attempts: u32,
    /// Backoff base; attempt `n` waits `base_delay_ms * 2^n`.
    pub base_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig { max_attempts: 5, base_delay_ms: 1_000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToDeviceConfig {
    /// Largest number of (user, device) messages sent in one request.
    pub max_batch_size: usize,
}

impl Default for ToDeviceConfig {
    fn default() -> Self {
        ToDeviceConfig { max_batch_size: 20 }
    }
}

impl ClientConfig {
    /// Creates a config with defaults for everything but the user id.
    pub fn new(user_id: impl Into<String>) -> Self {
        ClientConfig {
            user_id: user_id.into(),
            timeline_support: false,
            pending_event_ordering: PendingEventOrdering::default(),
            duplicate_strategy: DuplicateStrategy::default(),
            sync: SyncConfig::default(),
            scheduler: SchedulerConfig::default(),
            to_device: ToDeviceConfig::default(),
        }
    }

    /// Loads and validates a config file.
    pub fn load(path: &Path) -> ClientResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a config from TOML text.
    pub fn from_toml_str(content: &str) -> ClientResult<Self> {
        let config: ClientConfig =
            toml::from_str(content).map_err(|e| ClientError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as TOML.
    pub fn save(&self, path: &Path) -> ClientResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> ClientResult<()> {
        if !is_user_id(&self.user_id) {
            return Err(ClientError::Config(format!(
                "invalid user_id '{}'\n  hint: user ids look like @name:server",
                self.user_id
            )));
        }
        if self.sync.failed_sync_error_threshold == 0 {
            return Err(ClientError::Config("sync.failed_sync_error_threshold must be at least 1".to_string()));
        }
        if self.scheduler.max_attempts == 0 {
            return Err(ClientError::Config("scheduler.max_attempts must be at least 1".to_string()));
        }
        if self.to_device.max_batch_size == 0 {
            return Err(ClientError::Config("to_device.max_batch_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Options every room created by this client is built with.
    pub fn room_options(&self) -> RoomOptions {
        RoomOptions {
            timeline_support: self.timeline_support,
            pending_ordering: self.pending_event_ordering,
            duplicate_strategy: self.duplicate_strategy,
        }
    }
}

fn is_user_id(id: &str) -> bool {
    match id.strip_prefix('@').and_then(|rest| rest.split_once(':')) {
        Some((local, server)) => !local.is_empty() && !server.is_empty(),
        None => false,
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
