// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict records and resolution vocabulary.
//!
//! A conflict is a detected inconsistency between two or more operations.
//! Like a human-in-the-loop decision it carries an ordered set of options;
//! the first recommendation doubles as the default when the kind is
//! auto-resolvable by the system.

use crate::operation::OperationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a conflict.
    pub struct ConflictId("cfl-");
}

/// The eight detectable conflict kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    DuplicateOperation,
    ConcurrentModification,
    DependencyConflict,
    ResourceLocked,
    VersionMismatch,
    PriorityConflict,
    CircularDependency,
    OutdatedOperation,
}

crate::simple_display! {
    ConflictKind {
        DuplicateOperation => "duplicate_operation",
        ConcurrentModification => "concurrent_modification",
        DependencyConflict => "dependency_conflict",
        ResourceLocked => "resource_locked",
        VersionMismatch => "version_mismatch",
        PriorityConflict => "priority_conflict",
        CircularDependency => "circular_dependency",
        OutdatedOperation => "outdated_operation",
    }
}

/// How severe a conflict is, derived from the operations involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

crate::simple_display! {
    Severity {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

/// Resolution strategies a conflict can be settled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Cancel,
    Retry,
    Defer,
    Reorder,
    Split,
    Merge,
    ExtensionWins,
    ServerWins,
    UserDecide,
}

crate::simple_display! {
    Resolution {
        Cancel => "cancel",
        Retry => "retry",
        Defer => "defer",
        Reorder => "reorder",
        Split => "split",
        Merge => "merge",
        ExtensionWins => "extension_wins",
        ServerWins => "server_wins",
        UserDecide => "user_decide",
    }
}

/// Who settled a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    System,
    User,
}

crate::simple_display! {
    ResolvedBy {
        System => "system",
        User => "user",
    }
}

impl ConflictKind {
    /// Recommended resolutions, best first. The first element is the
    /// default applied by the auto-resolver for auto-resolvable kinds.
    pub fn recommendations(self) -> &'static [Resolution] {
        match self {
            ConflictKind::DuplicateOperation => &[Resolution::Cancel],
            ConflictKind::ConcurrentModification => &[
                Resolution::Merge,
                Resolution::ExtensionWins,
                Resolution::ServerWins,
                Resolution::Defer,
                Resolution::Cancel,
            ],
            ConflictKind::DependencyConflict => {
                &[Resolution::Reorder, Resolution::Defer, Resolution::Cancel]
            }
            ConflictKind::ResourceLocked => {
                &[Resolution::Defer, Resolution::Retry, Resolution::Cancel]
            }
            ConflictKind::VersionMismatch => &[
                Resolution::UserDecide,
                Resolution::ExtensionWins,
                Resolution::ServerWins,
            ],
            ConflictKind::PriorityConflict => &[Resolution::Reorder, Resolution::Defer],
            ConflictKind::CircularDependency => &[Resolution::Reorder, Resolution::Cancel],
            ConflictKind::OutdatedOperation => &[Resolution::Cancel, Resolution::Retry],
        }
    }

    /// Whether the system may settle this kind without a user decision.
    ///
    /// Kinds whose default resolution needs no judgment about content
    /// (drop a duplicate, push back a blocked op, reshuffle priorities,
    /// expire stale work) are settled by the background resolver; the rest
    /// wait for the user.
    pub fn auto_resolvable(self) -> bool {
        matches!(
            self,
            ConflictKind::DuplicateOperation
                | ConflictKind::ResourceLocked
                | ConflictKind::PriorityConflict
                | ConflictKind::OutdatedOperation
        )
    }
}

/// A detected inconsistency between operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: ConflictId,
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    /// Operations involved, candidate first.
    pub operations: Vec<OperationId>,
    pub description: String,
    pub severity: Severity,
    pub recommendations: Vec<Resolution>,
    /// Canonical identifier of the contended resource (e.g. `spec:<id>`).
    pub resource_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_files: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<ResolvedBy>,
    #[serde(default)]
    pub resolution_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub auto_resolvable: bool,
}

impl Conflict {
    /// Create an unresolved conflict with the kind's recommendation set.
    pub fn new(
        kind: ConflictKind,
        operations: Vec<OperationId>,
        description: impl Into<String>,
        resource_path: impl Into<String>,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            kind,
            operations,
            description: description.into(),
            severity,
            recommendations: kind.recommendations().to_vec(),
            resource_path: resource_path.into(),
            affected_files: Vec::new(),
            timestamp: now,
            resolved: false,
            resolved_at: None,
            resolution: None,
            resolved_by: None,
            resolution_attempts: 0,
            last_attempt_at: None,
            auto_resolvable: kind.auto_resolvable(),
        }
    }

    /// The default resolution the auto-resolver would apply.
    pub fn default_resolution(&self) -> Option<Resolution> {
        self.recommendations.first().copied()
    }

    /// Mark this conflict settled.
    pub fn mark_resolved(
        &mut self,
        resolution: Resolution,
        resolved_by: ResolvedBy,
        now: DateTime<Utc>,
    ) {
        self.resolved = true;
        self.resolution = Some(resolution);
        self.resolved_by = Some(resolved_by);
        self.resolved_at = Some(now);
    }

    /// Record an application attempt (successful or not).
    pub fn record_attempt(&mut self, now: DateTime<Utc>) {
        self.resolution_attempts += 1;
        self.last_attempt_at = Some(now);
    }

    pub fn involves(&self, op: &OperationId) -> bool {
        self.operations.iter().any(|o| o == op)
    }
}

#[cfg(test)]
#[path = "conflict_tests.rs"]
mod tests;
