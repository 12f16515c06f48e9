// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;
use yare::parameterized;

/// Hand-built graph: three timelines 1 <-> 2 <-> 3, plus an orphan 9.
/// Timeline 4 links forwards to 5, but 5 does not link back.
struct Graph {
    events: HashMap<EventKey, (TimelineId, i64)>,
    links: HashMap<(TimelineId, Direction), TimelineId>,
}

fn graph() -> Graph {
    let mut events = HashMap::new();
    for (id, tl, pos) in [
        ("$a1", 1, 0),
        ("$a2", 1, 1),
        ("$b1", 2, -5),
        ("$b2", 2, 7),
        ("$c1", 3, 0),
        ("$o1", 9, 0),
        ("$d1", 4, 10),
        ("$e1", 5, 0),
    ] {
        events.insert(EventKey::id(id), (TimelineId(tl), pos));
    }
    let mut links = HashMap::new();
    links.insert((TimelineId(1), Direction::Forwards), TimelineId(2));
    links.insert((TimelineId(2), Direction::Backwards), TimelineId(1));
    links.insert((TimelineId(2), Direction::Forwards), TimelineId(3));
    links.insert((TimelineId(3), Direction::Backwards), TimelineId(2));
    links.insert((TimelineId(4), Direction::Forwards), TimelineId(5));
    Graph { events, links }
}

impl TimelineGraph for Graph {
    fn locate(&self, key: &EventKey) -> Option<(TimelineId, i64)> {
        self.events.get(key).copied()
    }

    fn neighbour(&self, timeline: TimelineId, direction: Direction) -> Option<TimelineId> {
        self.links.get(&(timeline, direction)).copied()
    }
}

fn cmp(a: &str, b: &str) -> Option<Ordering> {
    compare_events(&graph(), &EventKey::id(a), &EventKey::id(b))
}

#[parameterized(
    same_timeline_less = { "$a1", "$a2", Some(Ordering::Less) },
    same_timeline_greater = { "$a2", "$a1", Some(Ordering::Greater) },
    adjacent_ignores_positions = { "$a2", "$b1", Some(Ordering::Less) },
    adjacent_backwards = { "$b1", "$a2", Some(Ordering::Greater) },
    non_adjacent_forwards = { "$a1", "$c1", None },
    non_adjacent_backwards = { "$c1", "$a1", None },
    unlinked = { "$a1", "$o1", None },
    unknown_event = { "$a1", "$nope", None },
    one_sided_link_forward = { "$d1", "$e1", Some(Ordering::Less) },
    one_sided_link_reverse = { "$e1", "$d1", None },
)]
fn ordering_cases(a: &str, b: &str, expected: Option<Ordering>) {
    assert_eq!(cmp(a, b), expected);
}

#[test]
fn identical_ids_are_equal_even_if_unknown() {
    assert_eq!(cmp("$a1", "$a1"), Some(Ordering::Equal));
    assert_eq!(cmp("$ghost", "$ghost"), Some(Ordering::Equal));
}

#[test]
fn same_timeline_order_is_antisymmetric() {
    let ids = ["$b1", "$b2"];
    for a in ids {
        for b in ids {
            let forward = cmp(a, b).map(Ordering::reverse);
            assert_eq!(forward, cmp(b, a));
        }
    }
}
