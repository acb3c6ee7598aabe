// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sf_core::test_support::*;
use sf_core::{Clock, ConflictKind, FakeClock, OperationStatus, Resolution, ResolvedBy};

#[test]
fn detect_stores_conflicts_and_returns_ids() {
    let clock = FakeClock::new();
    let mut engine = ConflictEngine::new();

    let existing = editor_op(create_spec_payload("auth"));
    let candidate = server_op(create_spec_payload("auth"));
    let ids = engine.detect(&candidate, &[existing], clock.now_utc());

    assert_eq!(ids.len(), 1);
    let conflict = engine.get(&ids[0]).unwrap();
    assert_eq!(conflict.kind, ConflictKind::DuplicateOperation);
    assert!(!conflict.resolved);
    assert!(!engine.is_resolved(&ids[0]));
    assert_eq!(engine.active_count(), 1);
}

#[test]
fn unknown_conflict_counts_as_resolved() {
    let engine = ConflictEngine::new();
    let ghost = sf_core::ConflictId::from_string("cfl-gone");
    assert!(engine.is_resolved(&ghost));
    assert!(engine.all_resolved(&[ghost]));
}

#[test]
fn resolve_applies_and_settles() {
    let clock = FakeClock::new();
    let mut engine = ConflictEngine::new();

    let existing = editor_op(create_spec_payload("auth"));
    let candidate = server_op(create_spec_payload("auth"));
    let mut ops = vec![existing, candidate.clone()];
    let ids = engine.detect(&candidate, &ops[..1], clock.now_utc());

    clock.advance(std::time::Duration::from_millis(150));
    let outcome = engine
        .resolve(
            &ids[0],
            Resolution::Cancel,
            ResolvedBy::System,
            &mut ops,
            clock.now_utc(),
        )
        .unwrap();

    assert!(outcome.applied);
    // Cancelling a duplicate drops the newcomer, keeping the original.
    assert_eq!(outcome.cancelled, vec![candidate.id.clone()]);
    assert_eq!(ops[0].status, OperationStatus::Pending);
    assert_eq!(ops[1].status, OperationStatus::Cancelled);

    let conflict = engine.get(&ids[0]).unwrap();
    assert!(conflict.resolved);
    assert_eq!(conflict.resolution, Some(Resolution::Cancel));
    assert_eq!(conflict.resolved_by, Some(ResolvedBy::System));
    assert_eq!(conflict.resolution_attempts, 1);
    assert_eq!(engine.active_count(), 0);
}

#[test]
fn resolve_unknown_conflict_errors() {
    let clock = FakeClock::new();
    let mut engine = ConflictEngine::new();
    let mut ops = Vec::new();

    let err = engine
        .resolve(
            &sf_core::ConflictId::from_string("cfl-missing"),
            Resolution::Cancel,
            ResolvedBy::User,
            &mut ops,
            clock.now_utc(),
        )
        .unwrap_err();
    assert!(matches!(err, crate::error::EngineError::UnknownConflict(_)));
}

#[test]
fn resolve_twice_is_idempotent() {
    let clock = FakeClock::new();
    let mut engine = ConflictEngine::new();

    let existing = editor_op(create_spec_payload("auth"));
    let candidate = server_op(create_spec_payload("auth"));
    let mut ops = vec![existing, candidate.clone()];
    let ids = engine.detect(&candidate, &ops[..1], clock.now_utc());

    engine
        .resolve(&ids[0], Resolution::Cancel, ResolvedBy::System, &mut ops, clock.now_utc())
        .unwrap();
    let second = engine
        .resolve(&ids[0], Resolution::Cancel, ResolvedBy::System, &mut ops, clock.now_utc())
        .unwrap();
    assert!(!second.applied);
    assert!(second.cancelled.is_empty());
    assert_eq!(engine.get(&ids[0]).unwrap().resolution_attempts, 1);
}

#[test]
fn user_decide_leaves_conflict_open_but_records_attempt() {
    let clock = FakeClock::new();
    let mut engine = ConflictEngine::new();

    let existing = editor_op(versioned_update_payload("s1", "# body", 1));
    let candidate = server_op(versioned_update_payload("s1", "# body", 2));
    let mut ops = vec![existing, candidate.clone()];
    let ids = engine.detect(&candidate, &ops[..1], clock.now_utc());
    let version_conflict = ids
        .iter()
        .find(|id| engine.get(id).unwrap().kind == ConflictKind::VersionMismatch)
        .cloned()
        .unwrap();

    let outcome = engine
        .resolve(
            &version_conflict,
            Resolution::UserDecide,
            ResolvedBy::System,
            &mut ops,
            clock.now_utc(),
        )
        .unwrap();

    assert!(!outcome.applied);
    let conflict = engine.get(&version_conflict).unwrap();
    assert!(!conflict.resolved);
    assert_eq!(conflict.resolution_attempts, 1);
    assert_eq!(conflict.last_attempt_at, Some(clock.now_utc()));
}

#[test]
fn auto_candidates_lists_unresolved_auto_kinds() {
    let clock = FakeClock::new();
    let mut engine = ConflictEngine::new();

    // duplicate_operation: auto-resolvable with cancel.
    let existing = editor_op(create_spec_payload("auth"));
    let candidate = server_op(create_spec_payload("auth"));
    let ids = engine.detect(&candidate, std::slice::from_ref(&existing), clock.now_utc());

    let autos = engine.auto_candidates();
    assert_eq!(autos, vec![(ids[0].clone(), Resolution::Cancel)]);

    // Settle it; nothing left to auto-resolve.
    let mut ops = vec![existing, candidate];
    engine
        .resolve(&ids[0], Resolution::Cancel, ResolvedBy::System, &mut ops, clock.now_utc())
        .unwrap();
    assert!(engine.auto_candidates().is_empty());
}

#[test]
fn cleanup_drops_only_old_resolved_conflicts() {
    let clock = FakeClock::new();
    let mut engine = ConflictEngine::new();

    let existing = editor_op(create_spec_payload("auth"));
    let candidate = server_op(create_spec_payload("auth"));
    let mut ops = vec![existing.clone(), candidate.clone()];
    let resolved_ids = engine.detect(&candidate, &ops[..1], clock.now_utc());
    engine
        .resolve(&resolved_ids[0], Resolution::Cancel, ResolvedBy::System, &mut ops, clock.now_utc())
        .unwrap();

    // A second, unresolved conflict detected much later.
    clock.advance(std::time::Duration::from_secs(3600 * 48));
    let late_candidate = server_op(create_spec_payload("billing"));
    let late_existing = editor_op(create_spec_payload("billing"));
    engine.detect(&late_candidate, std::slice::from_ref(&late_existing), clock.now_utc());

    let removed = engine.cleanup(24, clock.now_utc());
    assert_eq!(removed, 1);
    assert!(engine.get(&resolved_ids[0]).is_none());
    assert_eq!(engine.active_count(), 1);
}

#[test]
fn pattern_suggestion_promotes_recommendation_for_manual_kinds() {
    let clock = FakeClock::new();
    let mut engine = ConflictEngine::new();

    // Resolve the same concurrent-modification shape three times with
    // server_wins so the pattern table learns it.
    for _ in 0..3 {
        let existing = editor_op(update_requirements_payload("s1", "# editor body"));
        let candidate = server_op(update_requirements_payload("s1", "# server body"));
        let mut ops = vec![existing, candidate.clone()];
        let ids = engine.detect(&candidate, &ops[..1], clock.now_utc());
        let concurrent = ids
            .iter()
            .find(|id| engine.get(id).unwrap().kind == ConflictKind::ConcurrentModification)
            .cloned()
            .unwrap();
        engine
            .resolve(&concurrent, Resolution::ServerWins, ResolvedBy::User, &mut ops, clock.now_utc())
            .unwrap();
    }

    // The next detection of that shape leads with the learned resolution.
    let existing = editor_op(update_requirements_payload("s1", "# editor body"));
    let candidate = server_op(update_requirements_payload("s1", "# server body"));
    let ids = engine.detect(&candidate, std::slice::from_ref(&existing), clock.now_utc());
    let concurrent = ids
        .iter()
        .find(|id| engine.get(id).unwrap().kind == ConflictKind::ConcurrentModification)
        .cloned()
        .unwrap();
    assert_eq!(
        engine.get(&concurrent).unwrap().recommendations.first(),
        Some(&Resolution::ServerWins)
    );
}

#[test]
fn table_round_trips_through_from_table() {
    let clock = FakeClock::new();
    let mut engine = ConflictEngine::new();
    let existing = editor_op(create_spec_payload("auth"));
    let candidate = server_op(create_spec_payload("auth"));
    engine.detect(&candidate, std::slice::from_ref(&existing), clock.now_utc());

    let rebuilt = ConflictEngine::from_table(engine.table());
    assert_eq!(rebuilt.active_count(), engine.active_count());
    assert_eq!(rebuilt.table().len(), engine.table().len());
}
