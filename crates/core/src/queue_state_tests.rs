// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::{Clock, FakeClock};
use crate::conflict::{ConflictKind, Severity};
use crate::operation::OperationStatus;
use crate::test_support::*;

#[test]
fn empty_queue_document() {
    let clock = FakeClock::new();
    let queue = OperationQueue::empty(clock.now_utc());

    assert_eq!(queue.version, 0);
    assert!(queue.operations.is_empty());
    assert!(queue.conflicts.is_empty());
    assert_eq!(queue.status_counts().total(), 0);
    assert_eq!(queue.active_conflicts(), 0);
}

#[test]
fn status_counts_partition_operations() {
    let clock = FakeClock::new();
    let mut queue = OperationQueue::empty(clock.now_utc());

    let mut a = editor_op(create_spec_payload("a"));
    a.status = OperationStatus::Completed;
    let b = editor_op(create_spec_payload("b"));
    let mut c = editor_op(create_spec_payload("c"));
    c.status = OperationStatus::Failed;
    queue.operations = vec![a, b, c];

    let counts = queue.status_counts();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.total(), queue.operations.len());
}

#[test]
fn lookup_by_id() {
    let clock = FakeClock::new();
    let mut queue = OperationQueue::empty(clock.now_utc());
    let op = editor_op(sync_status_payload());
    let id = op.id.clone();
    queue.operations.push(op);

    assert!(queue.get(&id).is_some());
    assert!(queue.get("op-missing").is_none());

    if let Some(op) = queue.get_mut(&id) {
        op.cancel("test");
    }
    assert_eq!(queue.get(&id).map(|o| o.status), Some(OperationStatus::Cancelled));
}

#[test]
fn active_conflicts_skips_resolved() {
    let clock = FakeClock::new();
    let mut queue = OperationQueue::empty(clock.now_utc());

    let open = Conflict::new(
        ConflictKind::DuplicateOperation,
        vec![],
        "open",
        "spec:s1",
        Severity::Low,
        clock.now_utc(),
    );
    let mut settled = Conflict::new(
        ConflictKind::OutdatedOperation,
        vec![],
        "settled",
        "spec:s2",
        Severity::Low,
        clock.now_utc(),
    );
    settled.mark_resolved(
        crate::conflict::Resolution::Cancel,
        crate::conflict::ResolvedBy::System,
        clock.now_utc(),
    );

    queue.conflicts.insert(open.id.clone(), open);
    queue.conflicts.insert(settled.id.clone(), settled);
    assert_eq!(queue.active_conflicts(), 1);
}

#[test]
fn document_round_trips_with_conflict_map() {
    let clock = FakeClock::new();
    let mut queue = OperationQueue::empty(clock.now_utc());
    queue.operations.push(editor_op(create_spec_payload("a")));
    let conflict = Conflict::new(
        ConflictKind::DuplicateOperation,
        vec![queue.operations[0].id.clone()],
        "dup",
        "spec:a",
        Severity::Low,
        clock.now_utc(),
    );
    queue.conflicts.insert(conflict.id.clone(), conflict);
    queue.version = 3;

    let json = serde_json::to_string_pretty(&queue).unwrap();
    let parsed: OperationQueue = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, queue);
}
