// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wall clock access and transaction id generation.
//!
//! Transaction ids have the form `m{now_ms}.{counter}`. The counter is
//! per generator and never repeats, so ids stay unique even when the clock
//! stalls or goes backwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Trait for getting the current wall clock time.
///
/// This allows injecting a mock clock for testing.
pub trait ClockSource: Send + Sync {
    /// Returns the current time in milliseconds since Unix epoch.
    fn now_ms(&self) -> u64;
}

/// System clock implementation using `std::time::SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
    }
}

impl<C: ClockSource> ClockSource for &C {
    fn now_ms(&self) -> u64 {
        (*self).now_ms()
    }
}

impl<C: ClockSource + ?Sized> ClockSource for std::sync::Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Produces client transaction ids.
#[derive(Debug)]
pub struct TxnIdGenerator<C: ClockSource = SystemClock> {
    clock: C,
    counter: AtomicU64,
}

impl TxnIdGenerator<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for TxnIdGenerator<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ClockSource> TxnIdGenerator<C> {
    pub fn with_clock(clock: C) -> Self {
        TxnIdGenerator { clock, counter: AtomicU64::new(0) }
    }

    pub fn next_id(&self) -> String {
        let counter = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("m{}.{}", self.clock.now_ms(), counter)
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
