// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Read receipts.
//!
//! Each (receipt type, user) pair holds up to two receipts: the real one the
//! server sent and a synthetic one inferred from the user's own messages.
//! Neither kind moves backwards in timeline order. When the order of the old
//! and new event cannot be decided the update is rejected, unless the old
//! event is no longer held at all (it was dropped by a timeline reset).

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::event::{Event, EventKey};
use crate::ordering::{compare_events, TimelineGraph};

pub const READ: &str = "m.read";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub event_id: String,
    pub ts: u64,
}

/// One receipt parsed out of an `m.receipt` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptUpdate {
    pub event_id: String,
    pub receipt_type: String,
    pub user_id: String,
    pub ts: u64,
}

#[derive(Debug, Clone, Default)]
struct ReceiptPair {
    real: Option<Receipt>,
    synthetic: Option<Receipt>,
}

#[derive(Debug, Clone, Default)]
pub struct Receipts {
    by_user: HashMap<(String, String), ReceiptPair>,
}

fn compare<G: TimelineGraph + ?Sized>(graph: &G, a: &Receipt, b: &Receipt) -> Option<Ordering> {
    compare_events(graph, &EventKey::id(a.event_id.as_str()), &EventKey::id(b.event_id.as_str()))
}

impl Receipts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a receipt, returning whether it was accepted.
    pub fn add_receipt<G: TimelineGraph + ?Sized>(
        &mut self,
        graph: &G,
        receipt_type: &str,
        user_id: &str,
        receipt: Receipt,
        synthetic: bool,
    ) -> bool {
        let pair = self.by_user.entry((receipt_type.to_string(), user_id.to_string())).or_default();

        if synthetic {
            let behind = |existing: &Option<Receipt>| {
                existing.as_ref().is_some_and(|existing| compare(graph, existing, &receipt) == Some(Ordering::Greater))
            };
            if behind(&pair.real) || behind(&pair.synthetic) {
                return false;
            }
            pair.synthetic = Some(receipt);
            return true;
        }

        if let Some(existing) = &pair.real {
            if existing.event_id == receipt.event_id {
                if receipt.ts <= existing.ts {
                    return false;
                }
            } else {
                match compare(graph, existing, &receipt) {
                    Some(Ordering::Less) | Some(Ordering::Equal) => {}
                    Some(Ordering::Greater) => return false,
                    None if graph.locate(&EventKey::id(existing.event_id.as_str())).is_none() => {
                        trace!(user_id, event_id = %existing.event_id, "previous receipt event no longer held, replacing");
                    }
                    None => {
                        trace!(user_id, event_id = %receipt.event_id, "receipt order unknown, ignoring");
                        return false;
                    }
                }
            }
        }

        if let Some(synthetic) = &pair.synthetic {
            if matches!(compare(graph, &receipt, synthetic), Some(Ordering::Greater | Ordering::Equal)) {
                pair.synthetic = None;
            }
        }
        pair.real = Some(receipt);
        true
    }

    /// The receipt that currently counts: the synthetic one only when it is
    /// known to be later than the real one.
    pub fn receipt_for_user<G: TimelineGraph + ?Sized>(
        &self,
        graph: &G,
        user_id: &str,
        receipt_type: &str,
    ) -> Option<&Receipt> {
        let pair = self.by_user.get(&(receipt_type.to_string(), user_id.to_string()))?;
        match (&pair.real, &pair.synthetic) {
            (Some(real), Some(synthetic)) => {
                if compare(graph, synthetic, real) == Some(Ordering::Greater) {
                    Some(synthetic)
                } else {
                    Some(real)
                }
            }
            (Some(receipt), None) | (None, Some(receipt)) => Some(receipt),
            (None, None) => None,
        }
    }

    /// Receipts the server sent, ignoring synthesised ones.
    pub fn real_receipt(&self, user_id: &str, receipt_type: &str) -> Option<&Receipt> {
        self.by_user.get(&(receipt_type.to_string(), user_id.to_string()))?.real.as_ref()
    }

    /// Users whose effective read receipt is at or after `event_id`.
    pub fn users_read_up_to<G: TimelineGraph + ?Sized>(&self, graph: &G, event_id: &str) -> Vec<String> {
        let target = EventKey::id(event_id);
        let mut users: Vec<String> = self
            .by_user
            .keys()
            .filter(|(receipt_type, _)| receipt_type == READ)
            .filter_map(|(_, user_id)| {
                let receipt = self.receipt_for_user(graph, user_id, READ)?;
                let at = compare_events(graph, &EventKey::id(receipt.event_id.as_str()), &target)?;
                (at != Ordering::Less).then(|| user_id.clone())
            })
            .collect();
        users.sort();
        users
    }

    /// Parses an `m.receipt` ephemeral event:
    /// `{ "$event": { "m.read": { "@user": { "ts": 1 } } } }`.
    pub fn parse(event: &Event) -> Vec<ReceiptUpdate> {
        let mut updates = Vec::new();
        for (event_id, by_type) in &event.content {
            let Some(by_type) = by_type.as_object() else { continue };
            for (receipt_type, by_user) in by_type {
                let Some(by_user) = by_user.as_object() else { continue };
                for (user_id, data) in by_user {
                    let ts = data.get("ts").and_then(|ts| ts.as_u64()).unwrap_or(0);
                    updates.push(ReceiptUpdate {
                        event_id: event_id.clone(),
                        receipt_type: receipt_type.clone(),
                        user_id: user_id.clone(),
                        ts,
                    });
                }
            }
        }
        updates
    }
}

#[cfg(test)]
#[path = "receipts_tests.rs"]
mod tests;
