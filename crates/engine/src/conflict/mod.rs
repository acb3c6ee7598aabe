// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict detection and resolution.
//!
//! The engine owns the conflict table; operations reference conflicts by
//! id only. Detection runs on every enqueue, resolution is applied either
//! by the background auto-resolver (default recommendation, ~100 ms after
//! detection) or by an explicit user decision.

mod detect;
mod patterns;
mod resolve;

pub use detect::{CONCURRENT_WINDOW_SECS, OUTDATED_AGE_MINS, SIMILARITY_THRESHOLD};
pub use patterns::{PatternStats, PatternTable};
pub use resolve::{ResolutionOutcome, DEFER_SECS};

use crate::error::EngineError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sf_core::{Conflict, ConflictId, Operation, Resolution, ResolvedBy};
use std::collections::HashMap;

/// Owner of the conflict table and pattern statistics.
#[derive(Default)]
pub struct ConflictEngine {
    conflicts: HashMap<ConflictId, Conflict>,
    patterns: PatternTable,
}

impl ConflictEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted conflict table.
    pub fn from_table(conflicts: HashMap<ConflictId, Conflict>) -> Self {
        Self {
            conflicts,
            patterns: PatternTable::default(),
        }
    }

    /// Clone of the table for persisting alongside the queue.
    pub fn table(&self) -> HashMap<ConflictId, Conflict> {
        self.conflicts.clone()
    }

    pub fn get(&self, id: &ConflictId) -> Option<&Conflict> {
        self.conflicts.get(id)
    }

    pub fn patterns(&self) -> &PatternTable {
        &self.patterns
    }

    /// Conflicts not yet settled.
    pub fn unresolved(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.values().filter(|c| !c.resolved)
    }

    pub fn active_count(&self) -> usize {
        self.unresolved().count()
    }

    /// A conflict id is resolved when its record says so, or when the
    /// record has already been cleaned up.
    pub fn is_resolved(&self, id: &ConflictId) -> bool {
        self.conflicts.get(id).is_none_or(|c| c.resolved)
    }

    pub fn all_resolved(&self, ids: &[ConflictId]) -> bool {
        ids.iter().all(|id| self.is_resolved(id))
    }

    /// Whether any unresolved conflict involves this operation. Every
    /// member of a live conflict is held back, not just the candidate
    /// that carries the conflict id.
    pub fn blocks(&self, op: &sf_core::OperationId) -> bool {
        self.unresolved().any(|c| c.involves(op))
    }

    /// Run the detector battery for a candidate about to be enqueued.
    /// Stores any conflicts produced and returns their ids.
    pub fn detect(
        &mut self,
        candidate: &Operation,
        existing: &[Operation],
        now: DateTime<Utc>,
    ) -> Vec<ConflictId> {
        let mut ids = Vec::new();
        for mut conflict in detect::run_detectors(candidate, existing, now) {
            // Promote a historically successful resolution, but never
            // disturb what the auto-resolver would apply.
            if let Some(suggested) = self.patterns.suggest(conflict.kind, &conflict.resource_path)
            {
                promote_recommendation(&mut conflict.recommendations, suggested, conflict.auto_resolvable);
            }
            self.patterns
                .record_detection(conflict.kind, &conflict.resource_path, now);
            tracing::info!(
                conflict = %conflict.id,
                kind = %conflict.kind,
                severity = %conflict.severity,
                resource = %conflict.resource_path,
                "conflict detected"
            );
            ids.push(conflict.id.clone());
            self.conflicts.insert(conflict.id.clone(), conflict);
        }
        ids
    }

    /// Apply a resolution to a conflict's member operations.
    ///
    /// Settles the conflict when the strategy applied; `user_decide` leaves
    /// it open. Resolving an already-settled conflict is a no-op.
    pub fn resolve(
        &mut self,
        id: &ConflictId,
        resolution: Resolution,
        resolved_by: ResolvedBy,
        ops: &mut [Operation],
        now: DateTime<Utc>,
    ) -> Result<ResolutionOutcome, EngineError> {
        let conflict = self
            .conflicts
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownConflict(id.clone()))?;
        if conflict.resolved {
            return Ok(ResolutionOutcome::default());
        }

        conflict.record_attempt(now);
        let outcome = resolve::apply(conflict, resolution, ops, now);
        if outcome.applied {
            conflict.mark_resolved(resolution, resolved_by, now);
            let elapsed_ms = (now - conflict.timestamp).num_milliseconds().max(0) as u64;
            let kind = conflict.kind;
            let resource = conflict.resource_path.clone();
            self.patterns
                .record_resolution(kind, &resource, resolution, true, elapsed_ms, now);
            tracing::info!(
                conflict = %id,
                resolution = %resolution,
                by = %resolved_by,
                elapsed_ms,
                "conflict resolved"
            );
        } else {
            tracing::info!(
                conflict = %id,
                resolution = %resolution,
                "resolution left for user decision"
            );
        }
        Ok(outcome)
    }

    /// Unresolved auto-resolvable conflicts with their default resolution,
    /// for the background resolver to schedule.
    pub fn auto_candidates(&self) -> Vec<(ConflictId, Resolution)> {
        self.unresolved()
            .filter(|c| c.auto_resolvable)
            .filter_map(|c| c.default_resolution().map(|r| (c.id.clone(), r)))
            .collect()
    }

    /// Drop resolved conflicts settled more than `max_age_hours` ago.
    /// Returns how many were removed.
    pub fn cleanup(&mut self, max_age_hours: u64, now: DateTime<Utc>) -> usize {
        let horizon = now - ChronoDuration::hours(max_age_hours as i64);
        let before = self.conflicts.len();
        self.conflicts
            .retain(|_, c| !c.resolved || c.resolved_at.unwrap_or(c.timestamp) >= horizon);
        before - self.conflicts.len()
    }
}

/// Move `suggested` to the front of `recommendations` when it is already an
/// allowed option. Auto-resolvable kinds keep their default in front.
fn promote_recommendation(
    recommendations: &mut Vec<Resolution>,
    suggested: Resolution,
    auto_resolvable: bool,
) {
    if auto_resolvable {
        return;
    }
    if let Some(pos) = recommendations.iter().position(|r| *r == suggested) {
        if pos > 0 {
            let r = recommendations.remove(pos);
            recommendations.insert(0, r);
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
