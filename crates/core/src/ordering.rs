// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Event ordering across timelines.
//!
//! Ordering rules:
//! 1. Identical keys are equal, whether or not they are known.
//! 2. Within one timeline, insertion positions decide.
//! 3. Across directly linked timelines, the earlier-linked timeline's events
//!    come first regardless of their positions.
//! 4. Anything else (unknown events, unlinked or non-adjacent timelines) is
//!    undecidable and yields `None`. Callers must handle that case; it is
//!    never guessed.

use std::cmp::Ordering;

use crate::event::EventKey;
use crate::timeline::{Direction, TimelineId};

/// The view of a timeline set that ordering needs.
pub trait TimelineGraph {
    /// Timeline and position holding the event.
    fn locate(&self, key: &EventKey) -> Option<(TimelineId, i64)>;

    /// Neighbour of a timeline as declared on that timeline.
    fn neighbour(&self, timeline: TimelineId, direction: Direction) -> Option<TimelineId>;
}

/// Compares two events. `None` means the order cannot be decided.
pub fn compare_events<G: TimelineGraph + ?Sized>(
    graph: &G,
    a: &EventKey,
    b: &EventKey,
) -> Option<Ordering> {
    if a == b {
        return Some(Ordering::Equal);
    }

    let (timeline_a, position_a) = graph.locate(a)?;
    let (timeline_b, position_b) = graph.locate(b)?;

    if timeline_a == timeline_b {
        return Some(position_a.cmp(&position_b));
    }

    if graph.neighbour(timeline_a, Direction::Forwards) == Some(timeline_b) {
        return Some(Ordering::Less);
    }
    if graph.neighbour(timeline_a, Direction::Backwards) == Some(timeline_b) {
        return Some(Ordering::Greater);
    }

    None
}

#[cfg(test)]
#[path = "ordering_tests.rs"]
mod tests;
