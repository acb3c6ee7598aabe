// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authoritative in-memory operation queue.
//!
//! Operations are kept sorted in processing order (priority desc, timestamp
//! asc, id asc). All lifecycle transitions go through here so the counters
//! and rolling statistics stay consistent with the records.

use crate::config::QueueConfig;
use crate::conflict::ConflictEngine;
use crate::error::EngineError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sf_core::{
    Conflict, ConflictId, Operation, OperationId, OperationQueue, OperationStatus,
    ProcessingStats, RetryPolicy, StatusCounts,
};
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Window for the rolling processing-time average.
const DURATION_WINDOW: usize = 50;

/// Processing order: priority desc, then timestamp asc, then id asc.
pub fn processing_order(a: &Operation, b: &Operation) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then(a.timestamp.cmp(&b.timestamp))
        .then(a.id.cmp(&b.id))
}

/// Priority-ordered, dependency-aware operation store.
pub struct Queue {
    operations: Vec<Operation>,
    version: u64,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    stats: ProcessingStats,
    /// Recent processing durations feeding the rolling average. Not persisted.
    durations: VecDeque<u64>,
    config: QueueConfig,
}

impl Queue {
    pub fn new(config: QueueConfig, now: DateTime<Utc>) -> Self {
        Self {
            operations: Vec::new(),
            version: 0,
            created_at: now,
            last_modified: now,
            stats: ProcessingStats::default(),
            durations: VecDeque::with_capacity(DURATION_WINDOW),
            config,
        }
    }

    /// Rebuild from a persisted document, restoring the ordering invariant
    /// (a foreign writer may have appended out of order).
    pub fn from_document(doc: &OperationQueue, config: QueueConfig) -> Self {
        let mut operations = doc.operations.clone();
        operations.sort_by(processing_order);
        Self {
            operations,
            version: doc.version,
            created_at: doc.created_at,
            last_modified: doc.last_modified,
            stats: doc.processing_stats.clone(),
            durations: VecDeque::with_capacity(DURATION_WINDOW),
            config,
        }
    }

    /// Assemble the persistable document; the conflict table is owned by
    /// the [`ConflictEngine`] and joined in here.
    pub fn to_document(&self, conflicts: HashMap<ConflictId, Conflict>) -> OperationQueue {
        OperationQueue {
            operations: self.operations.clone(),
            conflicts,
            version: self.version,
            created_at: self.created_at,
            last_modified: self.last_modified,
            processing_stats: self.stats.clone(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Bump the version for an imminent persist.
    pub fn bump_version(&mut self, now: DateTime<Utc>) -> u64 {
        self.version += 1;
        self.last_modified = now;
        self.version
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn operations_mut(&mut self) -> &mut [Operation] {
        &mut self.operations
    }

    pub fn get(&self, id: &str) -> Option<&Operation> {
        self.operations.iter().find(|o| o.id == *id)
    }

    fn get_mut(&mut self, id: &OperationId) -> Result<&mut Operation, EngineError> {
        self.operations
            .iter_mut()
            .find(|o| o.id == *id)
            .ok_or_else(|| EngineError::UnknownOperation(id.clone()))
    }

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

    pub fn stats(&self) -> &ProcessingStats {
        &self.stats
    }

    /// Validate and insert an operation, consulting the conflict engine.
    /// Returns the ids of any conflicts detected against the candidate.
    pub fn enqueue(
        &mut self,
        mut op: Operation,
        conflicts: &mut ConflictEngine,
        now: DateTime<Utc>,
    ) -> Result<Vec<ConflictId>, EngineError> {
        op.validate()?;
        if self.operations.iter().any(|o| o.id == op.id) {
            return Err(EngineError::DuplicateId(op.id));
        }
        if self.operations.len() >= self.config.max_queue_size {
            return Err(EngineError::QueueFull {
                capacity: self.config.max_queue_size,
            });
        }

        // Dependencies referencing nothing in the queue are recorded on the
        // operation; such an operation never becomes eligible.
        let missing: Vec<String> = op
            .dependencies
            .iter()
            .filter(|d| !self.operations.iter().any(|o| o.id == **d))
            .map(|d| d.to_string())
            .collect();
        if !missing.is_empty() {
            op.metadata.insert(
                "missing_dependencies".to_string(),
                serde_json::json!(missing),
            );
        }

        let detected = conflicts.detect(&op, &self.operations, now);
        op.conflict_ids.extend(detected.iter().cloned());

        let pos = self
            .operations
            .iter()
            .position(|existing| processing_order(&op, existing) == Ordering::Less)
            .unwrap_or(self.operations.len());
        self.operations.insert(pos, op);
        self.last_modified = now;
        Ok(detected)
    }

    /// Flip failed operations whose retry instant has passed back to pending.
    fn promote_ready_retries(&mut self, now: DateTime<Utc>) {
        for op in &mut self.operations {
            if op.status == OperationStatus::Failed
                && op.retry_count < op.max_retries
                && op.next_retry_at.is_some_and(|at| at <= now)
            {
                op.reset_for_retry();
            }
        }
    }

    /// The next operation to run: highest-priority pending operation whose
    /// dependencies are all completed, whose conflicts are all resolved,
    /// and whose retry instant (if any) has passed.
    pub fn next_eligible(
        &mut self,
        conflicts: &ConflictEngine,
        now: DateTime<Utc>,
    ) -> Option<OperationId> {
        self.promote_ready_retries(now);

        let deps_completed = |op: &Operation| {
            op.dependencies.iter().all(|dep| {
                self.operations
                    .iter()
                    .any(|o| o.id == *dep && o.status == OperationStatus::Completed)
            })
        };

        self.operations
            .iter()
            .find(|op| {
                op.status == OperationStatus::Pending
                    && op.next_retry_at.is_none_or(|at| at <= now)
                    && deps_completed(op)
                    && conflicts.all_resolved(&op.conflict_ids)
                    && !conflicts.blocks(&op.id)
            })
            .map(|op| op.id.clone())
    }

    /// pending → in_progress.
    pub fn begin(&mut self, id: &OperationId, now: DateTime<Utc>) -> Result<(), EngineError> {
        let op = self.get_mut(id)?;
        if op.status != OperationStatus::Pending {
            return Err(EngineError::InvalidTransition {
                id: id.clone(),
                reason: format!("begin requires pending, found {}", op.status),
            });
        }
        op.start(now);
        self.last_modified = now;
        Ok(())
    }

    /// in_progress → completed. Returns the measured duration.
    pub fn complete(
        &mut self,
        id: &OperationId,
        now: DateTime<Utc>,
        result: Option<serde_json::Value>,
    ) -> Result<u64, EngineError> {
        let op = self.get_mut(id)?;
        if op.status != OperationStatus::InProgress {
            return Err(EngineError::InvalidTransition {
                id: id.clone(),
                reason: format!("complete requires in_progress, found {}", op.status),
            });
        }
        op.finish(now, result);
        let duration = op.actual_duration_ms.unwrap_or(0);

        self.stats.total_processed += 1;
        self.stats.success_count += 1;
        self.record_duration(duration);
        self.last_modified = now;
        Ok(duration)
    }

    /// in_progress → failed, scheduling a retry while budget and
    /// recoverability allow. Returns whether a retry was scheduled.
    pub fn fail(
        &mut self,
        id: &OperationId,
        now: DateTime<Utc>,
        error: String,
        recoverable: bool,
        retry: &RetryPolicy,
    ) -> Result<bool, EngineError> {
        let op = self.get_mut(id)?;
        if op.status != OperationStatus::InProgress {
            return Err(EngineError::InvalidTransition {
                id: id.clone(),
                reason: format!("fail requires in_progress, found {}", op.status),
            });
        }

        let will_retry = recoverable && retry.should_retry(op.retry_count, op.max_retries);
        if will_retry {
            let delay = retry.delay(op.retry_count);
            let retry_at = now + ChronoDuration::milliseconds(delay.as_millis() as i64);
            op.fail_with_retry(now, error, retry_at);
        } else {
            op.fail_terminal(now, error);
        }
        let duration = op.actual_duration_ms.unwrap_or(0);

        self.stats.total_processed += 1;
        self.stats.failure_count += 1;
        self.record_duration(duration);
        self.last_modified = now;
        Ok(will_retry)
    }

    /// pending | in_progress → cancelled.
    pub fn cancel(
        &mut self,
        id: &OperationId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let op = self.get_mut(id)?;
        if !matches!(
            op.status,
            OperationStatus::Pending | OperationStatus::InProgress
        ) {
            return Err(EngineError::InvalidTransition {
                id: id.clone(),
                reason: format!("cancel requires pending or in_progress, found {}", op.status),
            });
        }
        op.cancel(reason);
        self.last_modified = now;
        Ok(())
    }

    /// Drop completed and cancelled operations older than `max_age`
    /// (by `completed_at`, falling back to the creation timestamp).
    /// Pending, in-progress, and failed operations are kept regardless of
    /// age. Returns how many were removed.
    pub fn cleanup(&mut self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let horizon = now - ChronoDuration::milliseconds(max_age.as_millis() as i64);
        let before = self.operations.len();
        self.operations.retain(|op| {
            if !matches!(
                op.status,
                OperationStatus::Completed | OperationStatus::Cancelled
            ) {
                return true;
            }
            op.completed_at.unwrap_or(op.timestamp) >= horizon
        });
        let removed = before - self.operations.len();
        if removed > 0 {
            self.last_modified = now;
        }
        removed
    }

    /// Restore the ordering invariant after resolutions mutated priorities
    /// or timestamps in place.
    pub fn resort(&mut self) {
        self.operations.sort_by(processing_order);
    }

    fn record_duration(&mut self, duration_ms: u64) {
        if self.durations.len() == DURATION_WINDOW {
            self.durations.pop_front();
        }
        self.durations.push_back(duration_ms);
        let sum: u64 = self.durations.iter().sum();
        self.stats.average_processing_time_ms = sum as f64 / self.durations.len() as f64;
    }

    /// Rolling average over the last [`DURATION_WINDOW`] durations.
    pub fn average_duration_ms(&self) -> f64 {
        self.stats.average_processing_time_ms
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
