// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persisted operation-queue document (`mcp-operations.json`).

use crate::conflict::{Conflict, ConflictId};
use crate::operation::{Operation, OperationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregate processing statistics carried with the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_processed: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub average_processing_time_ms: f64,
}

/// Per-status operation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed + self.cancelled
    }
}

/// The queue document both agents read and write.
///
/// `operations` is kept in processing order (priority desc, timestamp asc,
/// id asc); `version` increases by one on every successful persist, so a
/// reader observing a lower version than its last snapshot is stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationQueue {
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub conflicts: HashMap<ConflictId, Conflict>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub processing_stats: ProcessingStats,
}

impl OperationQueue {
    /// Fresh empty queue document.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            operations: Vec::new(),
            conflicts: HashMap::new(),
            version: 0,
            created_at: now,
            last_modified: now,
            processing_stats: ProcessingStats::default(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Operation> {
        self.operations.iter().find(|o| o.id == *id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Operation> {
        self.operations.iter_mut().find(|o| o.id == *id)
    }

    /// Count operations by status. The sum always equals `operations.len()`.
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for op in &self.operations {
            match op.status {
                OperationStatus::Pending => counts.pending += 1,
                OperationStatus::InProgress => counts.in_progress += 1,
                OperationStatus::Completed => counts.completed += 1,
                OperationStatus::Failed => counts.failed += 1,
                OperationStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    /// Conflicts not yet resolved.
    pub fn active_conflicts(&self) -> usize {
        self.conflicts.values().filter(|c| !c.resolved).count()
    }
}

#[cfg(test)]
#[path = "queue_state_tests.rs"]
mod tests;
