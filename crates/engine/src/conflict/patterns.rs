// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict pattern accumulation.
//!
//! Rolling per-`(kind, resource)` statistics over detections and
//! resolutions, consulted to promote a historically successful resolution
//! for recurring conflicts. Runtime-only: repopulates naturally as
//! conflicts recur, so it is not persisted.

use chrono::{DateTime, Utc};
use sf_core::{ConflictKind, Resolution};
use std::collections::HashMap;

/// Minimum recurrences before the table suggests anything.
const SUGGEST_MIN_FREQUENCY: u64 = 3;

/// Minimum success rate before the table suggests anything.
const SUGGEST_MIN_SUCCESS_RATE: f64 = 0.5;

/// Statistics for one recurring conflict shape.
#[derive(Debug, Clone, Default)]
pub struct PatternStats {
    pub frequency: u64,
    pub last_occurrence: Option<DateTime<Utc>>,
    pub common_resolution: Option<Resolution>,
    pub success_rate: f64,
    pub avg_resolution_time_ms: f64,
    resolution_counts: HashMap<Resolution, u64>,
    attempts: u64,
    successes: u64,
}

/// `(conflict kind, resource path)` → rolling statistics.
#[derive(Debug, Default)]
pub struct PatternTable {
    entries: HashMap<(ConflictKind, String), PatternStats>,
}

impl PatternTable {
    pub fn record_detection(&mut self, kind: ConflictKind, resource: &str, now: DateTime<Utc>) {
        let entry = self
            .entries
            .entry((kind, resource.to_string()))
            .or_default();
        entry.frequency += 1;
        entry.last_occurrence = Some(now);
    }

    pub fn record_resolution(
        &mut self,
        kind: ConflictKind,
        resource: &str,
        resolution: Resolution,
        success: bool,
        elapsed_ms: u64,
        now: DateTime<Utc>,
    ) {
        let entry = self
            .entries
            .entry((kind, resource.to_string()))
            .or_default();
        entry.attempts += 1;
        if success {
            entry.successes += 1;
        }
        *entry.resolution_counts.entry(resolution).or_default() += 1;
        entry.common_resolution = entry
            .resolution_counts
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(res, _)| *res);
        entry.success_rate = entry.successes as f64 / entry.attempts as f64;
        // Incremental mean over attempts.
        entry.avg_resolution_time_ms +=
            (elapsed_ms as f64 - entry.avg_resolution_time_ms) / entry.attempts as f64;
        entry.last_occurrence = Some(now);
    }

    /// A resolution worth promoting for this conflict shape, if the history
    /// is deep and successful enough.
    pub fn suggest(&self, kind: ConflictKind, resource: &str) -> Option<Resolution> {
        let entry = self.entries.get(&(kind, resource.to_string()))?;
        if entry.frequency >= SUGGEST_MIN_FREQUENCY
            && entry.success_rate >= SUGGEST_MIN_SUCCESS_RATE
        {
            entry.common_resolution
        } else {
            None
        }
    }

    pub fn get(&self, kind: ConflictKind, resource: &str) -> Option<&PatternStats> {
        self.entries.get(&(kind, resource.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "patterns_tests.rs"]
mod tests;
