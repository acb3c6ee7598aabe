// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict detectors.
//!
//! Each detector is a pure function over the candidate operation and the
//! current queue contents. The battery runs on every enqueue; several
//! detectors may fire for one candidate.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sf_core::{
    Conflict, ConflictKind, Operation, OperationKind, OperationStatus, Priority, Severity,
};

/// Parameter similarity at or above this ratio flags a duplicate.
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Two modifying operations on one resource within this window collide.
pub const CONCURRENT_WINDOW_SECS: i64 = 60;

/// Pending operations older than this are flagged as outdated.
pub const OUTDATED_AGE_MINS: i64 = 5;

/// Run all detectors against `candidate`.
pub(crate) fn run_detectors(
    candidate: &Operation,
    existing: &[Operation],
    now: DateTime<Utc>,
) -> Vec<Conflict> {
    let mut found = Vec::new();
    found.extend(detect_duplicate(candidate, existing, now));
    found.extend(detect_concurrent_modification(candidate, existing, now));
    found.extend(detect_dependency_conflict(candidate, existing, now));
    found.extend(detect_resource_locked(candidate, existing, now));
    found.extend(detect_version_mismatch(candidate, existing, now));
    found.extend(detect_priority_conflict(candidate, existing, now));
    found.extend(detect_circular_dependency(candidate, existing, now));
    found.extend(detect_outdated(candidate, now));
    found
}

/// Severity from the operations involved: exclusive-operation involvement
/// forces critical; otherwise the highest priority present decides.
fn severity_for(involved: &[&Operation]) -> Severity {
    if involved.iter().any(|op| op.kind().is_exclusive()) {
        return Severity::Critical;
    }
    match involved.iter().map(|op| op.priority).max() {
        Some(Priority::Urgent) => Severity::High,
        Some(Priority::High) => Severity::Medium,
        _ => Severity::Low,
    }
}

/// Spec documents the involved operations are likely to touch.
fn affected_files(involved: &[&Operation]) -> Vec<String> {
    let mut files = Vec::new();
    let mut push = |path: String| {
        if !files.contains(&path) {
            files.push(path);
        }
    };
    for op in involved {
        let Some(spec) = op.payload.spec_id() else {
            continue;
        };
        match op.kind() {
            OperationKind::UpdateRequirements | OperationKind::AddUserStory => {
                push(format!("specs/{spec}/requirements.md"));
            }
            OperationKind::UpdateDesign => push(format!("specs/{spec}/design.md")),
            OperationKind::UpdateTasks | OperationKind::UpdateTaskStatus => {
                push(format!("specs/{spec}/tasks.md"));
            }
            OperationKind::CreateSpec | OperationKind::DeleteSpec => {
                push(format!("specs/{spec}/requirements.md"));
                push(format!("specs/{spec}/design.md"));
                push(format!("specs/{spec}/tasks.md"));
            }
            OperationKind::SetCurrentSpec
            | OperationKind::SyncStatus
            | OperationKind::Heartbeat => {}
        }
    }
    files
}

fn conflict_of(
    kind: ConflictKind,
    candidate: &Operation,
    others: Vec<&Operation>,
    description: String,
    now: DateTime<Utc>,
) -> Conflict {
    let mut involved = vec![candidate];
    involved.extend(others.iter().copied());
    let severity = severity_for(&involved);
    let mut conflict = Conflict::new(
        kind,
        involved.iter().map(|op| op.id.clone()).collect(),
        description,
        candidate.resource_path(),
        severity,
        now,
    );
    conflict.affected_files = affected_files(&involved);
    conflict
}

/// Canonical serialization of the payload for similarity comparison.
fn canonical_params(op: &Operation) -> String {
    serde_json::to_string(&op.payload).unwrap_or_default()
}

/// Levenshtein ratio over serialized params between same-kind operations.
fn detect_duplicate(
    candidate: &Operation,
    existing: &[Operation],
    now: DateTime<Utc>,
) -> Option<Conflict> {
    let reference = canonical_params(candidate);
    let dups: Vec<&Operation> = existing
        .iter()
        .filter(|other| {
            !other.is_terminal()
                && other.kind() == candidate.kind()
                && strsim::normalized_levenshtein(&reference, &canonical_params(other))
                    >= SIMILARITY_THRESHOLD
        })
        .collect();
    if dups.is_empty() {
        return None;
    }
    let description = format!(
        "{} duplicates {} queued {} operation(s) with near-identical parameters",
        candidate.id,
        dups.len(),
        candidate.kind()
    );
    Some(conflict_of(
        ConflictKind::DuplicateOperation,
        candidate,
        dups,
        description,
        now,
    ))
}

/// Another live modifying operation touched the same resource recently.
fn detect_concurrent_modification(
    candidate: &Operation,
    existing: &[Operation],
    now: DateTime<Utc>,
) -> Option<Conflict> {
    if !candidate.kind().is_modifying() {
        return None;
    }
    let resource = candidate.resource_path();
    let concurrent: Vec<&Operation> = existing
        .iter()
        .filter(|other| {
            !other.is_terminal()
                && other.kind().is_modifying()
                && other.resource_path() == resource
                && (candidate.timestamp - other.timestamp).abs()
                    <= ChronoDuration::seconds(CONCURRENT_WINDOW_SECS)
        })
        .collect();
    if concurrent.is_empty() {
        return None;
    }
    let description = format!(
        "{} modifies {resource} concurrently with {} other operation(s)",
        candidate.id,
        concurrent.len()
    );
    Some(conflict_of(
        ConflictKind::ConcurrentModification,
        candidate,
        concurrent,
        description,
        now,
    ))
}

/// A dependency's resource is being mutated by a different in-progress
/// operation, so the dependency's outcome may be stale by the time it is
/// consumed.
fn detect_dependency_conflict(
    candidate: &Operation,
    existing: &[Operation],
    now: DateTime<Utc>,
) -> Option<Conflict> {
    let mut involved = Vec::new();
    for dep_id in &candidate.dependencies {
        let Some(dep) = existing.iter().find(|o| o.id == *dep_id) else {
            continue;
        };
        let dep_resource = dep.resource_path();
        for other in existing {
            if other.id != dep.id
                && other.status == OperationStatus::InProgress
                && other.resource_path() == dep_resource
                && !involved.iter().any(|o: &&Operation| o.id == other.id)
            {
                involved.push(other);
            }
        }
    }
    if involved.is_empty() {
        return None;
    }
    let description = format!(
        "{} depends on operations whose resources are being mutated in flight",
        candidate.id
    );
    Some(conflict_of(
        ConflictKind::DependencyConflict,
        candidate,
        involved,
        description,
        now,
    ))
}

/// An in-progress exclusive operation holds the candidate's resource.
fn detect_resource_locked(
    candidate: &Operation,
    existing: &[Operation],
    now: DateTime<Utc>,
) -> Option<Conflict> {
    let resource = candidate.resource_path();
    let holders: Vec<&Operation> = existing
        .iter()
        .filter(|other| {
            other.status == OperationStatus::InProgress
                && other.kind().is_exclusive()
                && other.resource_path() == resource
        })
        .collect();
    if holders.is_empty() {
        return None;
    }
    let description = format!(
        "{resource} is held exclusively by {} in-progress operation(s)",
        holders.len()
    );
    Some(conflict_of(
        ConflictKind::ResourceLocked,
        candidate,
        holders,
        description,
        now,
    ))
}

/// The candidate declares a different resource version than a pending
/// operation on the same resource.
fn detect_version_mismatch(
    candidate: &Operation,
    existing: &[Operation],
    now: DateTime<Utc>,
) -> Option<Conflict> {
    let declared = candidate.payload.declared_version()?;
    let resource = candidate.resource_path();
    let mismatched: Vec<&Operation> = existing
        .iter()
        .filter(|other| {
            other.status == OperationStatus::Pending
                && other.resource_path() == resource
                && other
                    .payload
                    .declared_version()
                    .is_some_and(|v| v != declared)
        })
        .collect();
    if mismatched.is_empty() {
        return None;
    }
    let description = format!(
        "{} declares version {declared} of {resource} but pending operations declare otherwise",
        candidate.id
    );
    Some(conflict_of(
        ConflictKind::VersionMismatch,
        candidate,
        mismatched,
        description,
        now,
    ))
}

/// An urgent candidate arrives while lower-priority work occupies its
/// resource.
fn detect_priority_conflict(
    candidate: &Operation,
    existing: &[Operation],
    now: DateTime<Utc>,
) -> Option<Conflict> {
    if candidate.priority != Priority::Urgent {
        return None;
    }
    let resource = candidate.resource_path();
    let blockers: Vec<&Operation> = existing
        .iter()
        .filter(|other| {
            other.status == OperationStatus::InProgress
                && other.priority < Priority::Urgent
                && other.resource_path() == resource
        })
        .collect();
    if blockers.is_empty() {
        return None;
    }
    let description = format!(
        "urgent {} is blocked by lower-priority work on {resource}",
        candidate.id
    );
    Some(conflict_of(
        ConflictKind::PriorityConflict,
        candidate,
        blockers,
        description,
        now,
    ))
}

/// DFS over `dependencies` starting from the candidate; a node revisited
/// while still on the stack closes a cycle.
fn detect_circular_dependency(
    candidate: &Operation,
    existing: &[Operation],
    now: DateTime<Utc>,
) -> Option<Conflict> {
    use std::collections::HashMap;

    let mut deps: HashMap<&str, &[sf_core::OperationId]> = existing
        .iter()
        .map(|op| (op.id.as_str(), op.dependencies.as_slice()))
        .collect();
    deps.insert(candidate.id.as_str(), candidate.dependencies.as_slice());

    fn dfs<'a>(
        node: &'a str,
        deps: &HashMap<&'a str, &'a [sf_core::OperationId]>,
        stack: &mut Vec<&'a str>,
        visited: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|n| *n == node) {
            return Some(stack[pos..].iter().map(|s| s.to_string()).collect());
        }
        if visited.contains(&node) {
            return None;
        }
        visited.push(node);
        stack.push(node);
        if let Some(children) = deps.get(node) {
            for child in children.iter() {
                if let Some(cycle) = dfs(child.as_str(), deps, stack, visited) {
                    return Some(cycle);
                }
            }
        }
        stack.pop();
        None
    }

    let mut stack = Vec::new();
    let mut visited = Vec::new();
    let cycle = dfs(candidate.id.as_str(), &deps, &mut stack, &mut visited)?;

    let description = format!(
        "dependency cycle of length {} through {}",
        cycle.len(),
        candidate.id
    );
    let members: Vec<&Operation> = cycle
        .iter()
        .filter(|id| id.as_str() != candidate.id.as_str())
        .filter_map(|id| existing.iter().find(|o| o.id == **id))
        .collect();
    Some(conflict_of(
        ConflictKind::CircularDependency,
        candidate,
        members,
        description,
        now,
    ))
}

/// A pending candidate older than [`OUTDATED_AGE_MINS`].
fn detect_outdated(candidate: &Operation, now: DateTime<Utc>) -> Option<Conflict> {
    if candidate.status != OperationStatus::Pending {
        return None;
    }
    if now - candidate.timestamp <= ChronoDuration::minutes(OUTDATED_AGE_MINS) {
        return None;
    }
    let description = format!(
        "{} has been pending since {} (over {OUTDATED_AGE_MINS} minutes)",
        candidate.id,
        candidate.timestamp.to_rfc3339(),
    );
    Some(conflict_of(
        ConflictKind::OutdatedOperation,
        candidate,
        Vec::new(),
        description,
        now,
    ))
}

#[cfg(test)]
#[path = "detect_tests.rs"]
mod tests;
