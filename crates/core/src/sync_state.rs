// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persisted sync-state document (`specforge-sync.json`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bound on the `sync_errors` ring.
pub const SYNC_ERROR_CAP: usize = 50;

/// One tracked specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecRecord {
    pub spec_id: String,
    /// Monotonically non-decreasing per spec_id.
    pub version: u64,
    pub last_modified: DateTime<Utc>,
}

/// A recent error, kept in a bounded ring for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorRecord {
    pub timestamp: DateTime<Utc>,
    /// Stable error-kind tag (e.g. `lock_timeout`).
    pub kind: String,
    pub message: String,
    pub recoverable: bool,
}

/// Rolling performance figures exposed to dashboards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub average_operation_time_ms: f64,
    /// Operations per second over the most recent processing pass.
    pub queue_processing_rate: f64,
    pub last_processing_duration_ms: u64,
}

/// The sync-state document both agents read to see each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub extension_online: bool,
    pub server_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pending_operations: usize,
    #[serde(default)]
    pub in_progress_operations: usize,
    #[serde(default)]
    pub failed_operations: usize,
    #[serde(default)]
    pub completed_operations: usize,
    #[serde(default)]
    pub active_conflicts: usize,
    #[serde(default)]
    pub specifications: Vec<SpecRecord>,
    #[serde(default)]
    pub sync_errors: Vec<SyncErrorRecord>,
    #[serde(default)]
    pub performance: PerformanceMetrics,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            extension_online: false,
            server_online: false,
            last_sync: None,
            pending_operations: 0,
            in_progress_operations: 0,
            failed_operations: 0,
            completed_operations: 0,
            active_conflicts: 0,
            specifications: Vec::new(),
            sync_errors: Vec::new(),
            performance: PerformanceMetrics::default(),
        }
    }
}

impl SyncState {
    /// Append to the error ring, evicting the oldest past [`SYNC_ERROR_CAP`].
    pub fn record_error(&mut self, record: SyncErrorRecord) {
        self.sync_errors.push(record);
        if self.sync_errors.len() > SYNC_ERROR_CAP {
            let excess = self.sync_errors.len() - SYNC_ERROR_CAP;
            self.sync_errors.drain(..excess);
        }
    }

    /// Upsert a specification entry, bumping its version monotonically.
    /// Returns the new version.
    pub fn bump_spec(&mut self, spec_id: &str, now: DateTime<Utc>) -> u64 {
        if let Some(entry) = self.specifications.iter_mut().find(|s| s.spec_id == spec_id) {
            entry.version += 1;
            entry.last_modified = now;
            return entry.version;
        }
        self.specifications.push(SpecRecord {
            spec_id: spec_id.to_string(),
            version: 1,
            last_modified: now,
        });
        1
    }

    pub fn spec_version(&self, spec_id: &str) -> Option<u64> {
        self.specifications
            .iter()
            .find(|s| s.spec_id == spec_id)
            .map(|s| s.version)
    }
}

#[cfg(test)]
#[path = "sync_state_tests.rs"]
mod tests;
