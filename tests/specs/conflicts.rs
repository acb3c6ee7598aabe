// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict detection and resolution, end to end.

use super::common::*;
use sf_core::test_support::*;
use sf_core::{ConflictKind, Event, OperationStatus, Resolution, ResolvedBy};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn duplicate_create_spec_is_auto_cancelled() {
    let h = harness().await;

    let first = h
        .service
        .queue(editor_op(create_spec_payload("auth")))
        .await
        .unwrap();
    let second = h
        .service
        .queue(editor_op(create_spec_payload("auth")))
        .await
        .unwrap();

    // Both entered the queue, and exactly one duplicate conflict exists.
    let snapshot = h.service.queue_snapshot();
    assert_eq!(snapshot.operations.len(), 2);
    let conflicts: Vec<_> = snapshot
        .conflicts
        .values()
        .filter(|c| c.kind == ConflictKind::DuplicateOperation)
        .collect();
    assert_eq!(conflicts.len(), 1);

    // Within ~200 ms the background resolver cancels the newcomer.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let snapshot = h.service.queue_snapshot();
    let conflict = snapshot
        .conflicts
        .values()
        .find(|c| c.kind == ConflictKind::DuplicateOperation)
        .unwrap();
    assert!(conflict.resolved);
    assert_eq!(conflict.resolution, Some(Resolution::Cancel));
    assert_eq!(conflict.resolved_by, Some(ResolvedBy::System));

    assert_eq!(
        snapshot.get(&second).unwrap().status,
        OperationStatus::Cancelled
    );
    assert_eq!(snapshot.get(&first).unwrap().status, OperationStatus::Pending);

    // The survivor processes normally now that the conflict is settled.
    let report = h.service.process().await.unwrap();
    assert_eq!(report.succeeded, 1);
}

#[tokio::test]
async fn concurrent_modification_blocks_both_until_user_decides() {
    let h = harness().await;

    let first = h
        .service
        .queue(editor_op(update_requirements_payload(
            "s1",
            "# Requirements drafted in the editor with ten sections",
        )))
        .await
        .unwrap();
    h.clock.advance(Duration::from_secs(30));
    let second = h
        .service
        .queue(server_op(update_requirements_payload(
            "s1",
            "completely rewritten server copy, different in every line",
        )))
        .await
        .unwrap();

    let snapshot = h.service.queue_snapshot();
    let conflict = snapshot
        .conflicts
        .values()
        .find(|c| c.kind == ConflictKind::ConcurrentModification)
        .unwrap()
        .clone();
    assert!(snapshot.get(&second).unwrap().conflict_ids.contains(&conflict.id));
    assert!(h
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, Event::ConflictDetected { .. })));

    // Neither operation runs while the conflict is open.
    let report = h.service.process().await.unwrap();
    assert_eq!(report.processed, 0);

    // Editor wins: the server-side operation is cancelled.
    h.service
        .resolve_conflict(&conflict.id, Resolution::ExtensionWins, ResolvedBy::User)
        .await
        .unwrap();

    let snapshot = h.service.queue_snapshot();
    assert_eq!(
        snapshot.get(&second).unwrap().status,
        OperationStatus::Cancelled
    );
    let report = h.service.process().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(
        h.service.queue_snapshot().get(&first).unwrap().status,
        OperationStatus::Completed
    );
}

#[tokio::test]
async fn version_mismatch_waits_for_user_decision() {
    let h = harness().await;

    h.service
        .queue(editor_op(versioned_update_payload(
            "s1",
            "# editor copy at version three",
            3,
        )))
        .await
        .unwrap();
    h.clock.advance(Duration::from_secs(90));
    let second = h
        .service
        .queue(server_op(versioned_update_payload(
            "s1",
            "totally different server body for version five",
            5,
        )))
        .await
        .unwrap();

    let snapshot = h.service.queue_snapshot();
    let conflict = snapshot
        .conflicts
        .values()
        .find(|c| c.kind == ConflictKind::VersionMismatch)
        .unwrap()
        .clone();
    assert!(!conflict.auto_resolvable);
    assert_eq!(conflict.recommendations.first(), Some(&Resolution::UserDecide));

    // Server wins cancels the editor-side member.
    h.service
        .resolve_conflict(&conflict.id, Resolution::ServerWins, ResolvedBy::User)
        .await
        .unwrap();
    let snapshot = h.service.queue_snapshot();
    assert_eq!(snapshot.get(&second).unwrap().status, OperationStatus::Pending);
    assert_eq!(
        snapshot
            .operations
            .iter()
            .filter(|o| o.status == OperationStatus::Cancelled)
            .count(),
        1
    );
}

#[tokio::test]
async fn split_products_are_returned_for_explicit_enqueue() {
    let h = harness().await;

    let original = h
        .service
        .queue(editor_op(update_requirements_payload(
            "s1",
            "a plain early revision with no sections in it anywhere",
        )))
        .await
        .unwrap();
    h.clock.advance(Duration::from_secs(30));
    // The newcomer carries two top-level sections; split targets it
    // (conflict members are recorded candidate-first).
    let second = h
        .service
        .queue(server_op(update_requirements_payload(
            "s1",
            "# Intro\nscope\n# Details\nbody",
        )))
        .await
        .unwrap();

    let snapshot = h.service.queue_snapshot();
    let conflict = snapshot
        .conflicts
        .values()
        .find(|c| c.kind == ConflictKind::ConcurrentModification)
        .unwrap()
        .clone();

    let outcome = h
        .service
        .resolve_conflict(&conflict.id, Resolution::Split, ResolvedBy::User)
        .await
        .unwrap();

    // The split source is cancelled and the engine does not self-enqueue
    // the products.
    assert_eq!(outcome.split_products.len(), 2);
    let snapshot = h.service.queue_snapshot();
    assert_eq!(
        snapshot.get(&second).unwrap().status,
        OperationStatus::Cancelled
    );
    assert_eq!(
        snapshot.get(&original).unwrap().status,
        OperationStatus::Pending
    );
    for product in &outcome.split_products {
        assert!(snapshot.get(&product.id).is_none());
    }

    // The caller enqueues them explicitly.
    for product in outcome.split_products {
        h.service.queue(product).await.unwrap();
    }
    let snapshot = h.service.queue_snapshot();
    assert!(snapshot.get(&format!("{second}-split-1")).is_some());
    assert!(snapshot.get(&format!("{second}-split-2")).is_some());
}
