// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolution application.
//!
//! Each strategy mutates the involved operations in place and reports what
//! it did. Split products are returned to the caller rather than enqueued;
//! re-enqueueing mid-resolution would re-trigger detection.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sf_core::{
    Conflict, ConflictKind, Operation, OperationId, OperationSource, OperationStatus, Resolution,
};

/// Seconds a deferred operation is pushed back.
pub const DEFER_SECS: i64 = 30;

/// What applying a resolution did.
#[derive(Debug, Clone, Default)]
pub struct ResolutionOutcome {
    /// False when the strategy is not applicable by the system
    /// (`user_decide`); the conflict stays open.
    pub applied: bool,
    pub cancelled: Vec<OperationId>,
    pub retried: Vec<OperationId>,
    pub deferred: Vec<OperationId>,
    pub reordered: Vec<OperationId>,
    pub merged_into: Option<OperationId>,
    /// Derived operations produced by `split`; the caller decides whether
    /// to enqueue them.
    pub split_products: Vec<Operation>,
}

/// Apply `resolution` to the conflict's member operations.
pub(crate) fn apply(
    conflict: &Conflict,
    resolution: Resolution,
    ops: &mut [Operation],
    now: DateTime<Utc>,
) -> ResolutionOutcome {
    match resolution {
        // Cancelling a duplicate drops the redundant newcomer and keeps
        // the original; every other kind cancels all members.
        Resolution::Cancel if conflict.kind == ConflictKind::DuplicateOperation => {
            cancel_duplicate(conflict, ops)
        }
        Resolution::Cancel => cancel_members(conflict, ops, now),
        Resolution::ExtensionWins => source_wins(conflict, ops, OperationSource::Editor),
        Resolution::ServerWins => source_wins(conflict, ops, OperationSource::Server),
        Resolution::Merge => merge(conflict, ops),
        Resolution::Retry => retry(conflict, ops),
        Resolution::Defer => defer(conflict, ops, now),
        Resolution::Reorder => reorder(conflict, ops, now),
        Resolution::Split => split(conflict, ops, now),
        Resolution::UserDecide => ResolutionOutcome::default(),
    }
}

fn member_indices(conflict: &Conflict, ops: &[Operation]) -> Vec<usize> {
    conflict
        .operations
        .iter()
        .filter_map(|id| ops.iter().position(|op| op.id == *id))
        .collect()
}

/// Cancel every non-terminal member.
fn cancel_members(conflict: &Conflict, ops: &mut [Operation], _now: DateTime<Utc>) -> ResolutionOutcome {
    let mut outcome = ResolutionOutcome {
        applied: true,
        ..ResolutionOutcome::default()
    };
    for idx in member_indices(conflict, ops) {
        let op = &mut ops[idx];
        // In-progress members are marked too; cancellation is cooperative
        // and the in-flight handler observes the status.
        if !op.is_terminal() {
            op.cancel(format!(
                "cancelled resolving {} conflict {}",
                conflict.kind, conflict.id
            ));
            outcome.cancelled.push(op.id.clone());
        }
    }
    outcome
}

/// Cancel the duplicate itself (the conflict's first member is always the
/// candidate that duplicated existing work); the originals keep running.
fn cancel_duplicate(conflict: &Conflict, ops: &mut [Operation]) -> ResolutionOutcome {
    let mut outcome = ResolutionOutcome {
        applied: true,
        ..ResolutionOutcome::default()
    };
    let Some(first) = conflict.operations.first() else {
        return outcome;
    };
    if let Some(op) = ops.iter_mut().find(|op| op.id == *first) {
        if !op.is_terminal() {
            op.cancel(format!("duplicate of existing work, conflict {}", conflict.id));
            outcome.cancelled.push(op.id.clone());
        }
    }
    outcome
}

/// Cancel members from the losing side.
fn source_wins(
    conflict: &Conflict,
    ops: &mut [Operation],
    winner: OperationSource,
) -> ResolutionOutcome {
    let mut outcome = ResolutionOutcome {
        applied: true,
        ..ResolutionOutcome::default()
    };
    for idx in member_indices(conflict, ops) {
        let op = &mut ops[idx];
        if op.source != winner && !op.is_terminal() {
            op.cancel(format!("superseded: {winner} side wins conflict {}", conflict.id));
            outcome.cancelled.push(op.id.clone());
        }
    }
    outcome
}

/// Deduplicate the two members' content lines into the first and cancel the
/// second. Falls back to `extension_wins` when the members are not a pair
/// of same-kind content updates on one resource.
fn merge(conflict: &Conflict, ops: &mut [Operation]) -> ResolutionOutcome {
    let indices = member_indices(conflict, ops);
    let mut mergeable: Vec<usize> = indices
        .iter()
        .copied()
        .filter(|&i| !ops[i].is_terminal() && ops[i].payload.content().is_some())
        .collect();
    // Members are recorded candidate-first; the merge target is the
    // earliest-queued operation.
    mergeable.sort_by(|&a, &b| {
        ops[a]
            .timestamp
            .cmp(&ops[b].timestamp)
            .then(ops[a].id.cmp(&ops[b].id))
    });

    let (first, second) = match (mergeable.first(), mergeable.get(1)) {
        (Some(&a), Some(&b))
            if ops[a].kind() == ops[b].kind()
                && ops[a].resource_path() == ops[b].resource_path() =>
        {
            (a, b)
        }
        _ => return source_wins(conflict, ops, OperationSource::Editor),
    };

    let base = ops[first].payload.content().unwrap_or_default().to_string();
    let incoming = ops[second].payload.content().unwrap_or_default().to_string();

    let mut merged: Vec<&str> = base.lines().collect();
    for line in incoming.lines() {
        if !merged.contains(&line) {
            merged.push(line);
        }
    }
    let first_id = ops[first].id.clone();
    let second_id = ops[second].id.clone();
    ops[first].payload.set_content(merged.join("\n"));
    ops[first]
        .metadata
        .insert("merged_from".to_string(), serde_json::json!(second_id));
    ops[second].cancel(format!("merged into {first_id}"));

    ResolutionOutcome {
        applied: true,
        cancelled: vec![second_id],
        merged_into: Some(first_id),
        ..ResolutionOutcome::default()
    }
}

/// Reset failed members with remaining budget to pending.
fn retry(conflict: &Conflict, ops: &mut [Operation]) -> ResolutionOutcome {
    let mut outcome = ResolutionOutcome {
        applied: true,
        ..ResolutionOutcome::default()
    };
    for idx in member_indices(conflict, ops) {
        let op = &mut ops[idx];
        if op.status == OperationStatus::Failed && op.retry_count < op.max_retries {
            op.retry_count += 1;
            op.reset_for_retry();
            outcome.retried.push(op.id.clone());
        }
    }
    outcome
}

/// Lower pending members one priority level and stamp a deferral horizon.
fn defer(conflict: &Conflict, ops: &mut [Operation], now: DateTime<Utc>) -> ResolutionOutcome {
    let mut outcome = ResolutionOutcome {
        applied: true,
        ..ResolutionOutcome::default()
    };
    let until = now + ChronoDuration::seconds(DEFER_SECS);
    for idx in member_indices(conflict, ops) {
        let op = &mut ops[idx];
        if op.status == OperationStatus::Pending {
            op.priority = op.priority.lower();
            op.metadata.insert(
                "deferred_until".to_string(),
                serde_json::json!(until.to_rfc3339()),
            );
            outcome.deferred.push(op.id.clone());
        }
    }
    outcome
}

/// Re-sequence pending members by (priority desc, dependency count asc),
/// assigning strictly increasing timestamps one second apart from now.
fn reorder(conflict: &Conflict, ops: &mut [Operation], now: DateTime<Utc>) -> ResolutionOutcome {
    let mut pending: Vec<usize> = member_indices(conflict, ops)
        .into_iter()
        .filter(|&i| ops[i].status == OperationStatus::Pending)
        .collect();
    pending.sort_by(|&a, &b| {
        ops[b]
            .priority
            .cmp(&ops[a].priority)
            .then(ops[a].dependencies.len().cmp(&ops[b].dependencies.len()))
    });

    let mut outcome = ResolutionOutcome {
        applied: true,
        ..ResolutionOutcome::default()
    };
    for (slot, idx) in pending.into_iter().enumerate() {
        ops[idx].timestamp = now + ChronoDuration::seconds(slot as i64 + 1);
        outcome.reordered.push(ops[idx].id.clone());
    }
    outcome
}

/// Split the first content member along top-level markdown headers into
/// derived operations (`<orig>-split-<i>`), cancelling the original.
fn split(conflict: &Conflict, ops: &mut [Operation], now: DateTime<Utc>) -> ResolutionOutcome {
    let Some(idx) = member_indices(conflict, ops)
        .into_iter()
        .find(|&i| !ops[i].is_terminal() && ops[i].payload.content().is_some())
    else {
        return cancel_members(conflict, ops, now);
    };

    let content = ops[idx].payload.content().unwrap_or_default().to_string();
    let sections = split_markdown_sections(&content);

    let original = ops[idx].clone();
    let mut products = Vec::with_capacity(sections.len());
    for (i, section) in sections.iter().enumerate() {
        let mut derived = original.clone();
        derived.id = OperationId::from_string(format!("{}-split-{}", original.id, i + 1));
        derived.payload.set_content(section.clone());
        derived.status = OperationStatus::Pending;
        derived.timestamp = now + ChronoDuration::seconds(i as i64);
        derived.started_at = None;
        derived.completed_at = None;
        derived.actual_duration_ms = None;
        derived.retry_count = 0;
        derived.next_retry_at = None;
        derived.conflict_ids = Vec::new();
        derived.result = None;
        derived.error = None;
        derived
            .metadata
            .insert("split_from".to_string(), serde_json::json!(original.id));
        products.push(derived);
    }

    ops[idx].cancel(format!("split into {} operations", products.len()));

    ResolutionOutcome {
        applied: true,
        cancelled: vec![original.id],
        split_products: products,
        ..ResolutionOutcome::default()
    }
}

/// Split on lines beginning `# `; a leading headerless preamble becomes its
/// own section. Content without headers yields one section.
fn split_markdown_sections(content: &str) -> Vec<String> {
    let mut sections: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in content.lines() {
        if line.starts_with("# ") && !current.is_empty() {
            sections.push(std::mem::take(&mut current));
        }
        current.push(line);
    }
    if !current.is_empty() {
        sections.push(current);
    }
    if sections.is_empty() {
        sections.push(Vec::new());
    }
    sections.into_iter().map(|lines| lines.join("\n")).collect()
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
