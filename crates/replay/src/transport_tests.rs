// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use std::io::Cursor;
use std::io::Write as _;
use tempfile::NamedTempFile;

fn request() -> SyncRequest {
    SyncRequest { since: None, filter_id: None, timeout_ms: 0 }
}

#[test]
fn reads_one_batch_per_line_skipping_blanks() {
    let input = "{\"next_batch\": \"s1\"}\n\n   \n{\"next_batch\": \"s2\"}\n";
    let transport = ReplayTransport::from_reader(Cursor::new(input)).unwrap();
    assert_eq!(transport.remaining(), 2);
}

#[test]
fn bad_line_reports_its_number() {
    let input = "{\"next_batch\": \"s1\"}\n\n{\"rooms\": 5}\n";
    let err = ReplayTransport::from_reader(Cursor::new(input)).err().unwrap();
    assert!(matches!(err, Error::BadBatch { line: 3, .. }));
}

#[test]
fn missing_file_names_the_path() {
    let err = ReplayTransport::open(Path::new("/nonexistent/fixture.jsonl")).err().unwrap();
    assert!(err.to_string().contains("/nonexistent/fixture.jsonl"));
}

#[tokio::test]
async fn serves_batches_in_order_then_reports_exhaustion() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{{\"next_batch\": \"s1\"}}").unwrap();
    writeln!(file, "{{\"next_batch\": \"s2\"}}").unwrap();
    let transport = ReplayTransport::open(file.path()).unwrap();

    assert_eq!(transport.sync_once(request()).await.unwrap().next_batch, "s1");
    assert_eq!(transport.sync_once(request()).await.unwrap().next_batch, "s2");
    assert_eq!(transport.served(), 2);

    let parked = transport.sync_once(request());
    let timed_out = tokio::time::timeout(std::time::Duration::from_millis(10), parked).await;
    assert!(timed_out.is_err());
    transport.exhausted().await;
}

#[tokio::test]
async fn sends_get_distinct_synthetic_ids() {
    let transport = ReplayTransport::new(Vec::new());
    let request = || SendRequest {
        room_id: "!r:x".into(),
        txn_id: "t".into(),
        event_type: "m.room.message".into(),
        content: Default::default(),
        state_key: None,
    };
    let a = transport.send_event(request()).await.unwrap();
    let b = transport.send_event(request()).await.unwrap();
    assert_ne!(a, b);
    assert!(matches!(a, SendOutcome::EventId(id) if id.starts_with('$')));
}
