// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observable events emitted through the notification hooks.
//!
//! Serializes with `{"type": "scope:verb", ...fields}` format. The core
//! never renders UI; consumers subscribe to these and decide presentation.

use crate::conflict::{ConflictId, ConflictKind, Resolution, ResolvedBy, Severity};
use crate::operation::{OperationId, OperationKind, OperationSource, Priority};
use serde::{Deserialize, Serialize};

/// What happened to a specification, as reported by the editor side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecChangeKind {
    Created,
    Updated,
    Deleted,
}

crate::simple_display! {
    SpecChangeKind {
        Created => "created",
        Updated => "updated",
        Deleted => "deleted",
    }
}

/// Events observable through the notification hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "operation:queued")]
    OperationQueued {
        id: OperationId,
        kind: OperationKind,
        priority: Priority,
        source: OperationSource,
    },

    #[serde(rename = "operation:started")]
    OperationStarted { id: OperationId },

    #[serde(rename = "operation:completed")]
    OperationCompleted { id: OperationId, duration_ms: u64 },

    #[serde(rename = "operation:failed")]
    OperationFailed {
        id: OperationId,
        error: String,
        will_retry: bool,
    },

    #[serde(rename = "operation:cancelled")]
    OperationCancelled { id: OperationId, reason: String },

    #[serde(rename = "conflict:detected")]
    ConflictDetected {
        id: ConflictId,
        kind: ConflictKind,
        severity: Severity,
        operations: Vec<OperationId>,
    },

    #[serde(rename = "conflict:resolved")]
    ConflictResolved {
        id: ConflictId,
        resolution: Resolution,
        resolved_by: ResolvedBy,
    },

    /// Recoverable anomaly worth surfacing (corrupt state fallback,
    /// expired-lock reclaim, pruning failure).
    #[serde(rename = "sync:warning")]
    SyncWarning { message: String },

    /// An error recorded into the sync-state ring.
    #[serde(rename = "sync:error")]
    SyncError {
        kind: String,
        message: String,
        recoverable: bool,
    },

    #[serde(rename = "sync:spec_changed")]
    SpecChanged {
        spec_id: String,
        change: SpecChangeKind,
        version: u64,
    },
}

impl Event {
    /// One-line `key=value` summary for logs.
    pub fn log_summary(&self) -> String {
        match self {
            Event::OperationQueued {
                id,
                kind,
                priority,
                source,
            } => format!("queued op={id} kind={kind} priority={priority} source={source}"),
            Event::OperationStarted { id } => format!("started op={id}"),
            Event::OperationCompleted { id, duration_ms } => {
                format!("completed op={id} elapsed_ms={duration_ms}")
            }
            Event::OperationFailed {
                id,
                error,
                will_retry,
            } => format!("failed op={id} retry={will_retry} error={error}"),
            Event::OperationCancelled { id, reason } => {
                format!("cancelled op={id} reason={reason}")
            }
            Event::ConflictDetected {
                id,
                kind,
                severity,
                operations,
            } => format!(
                "conflict op_count={} conflict={id} kind={kind} severity={severity}",
                operations.len()
            ),
            Event::ConflictResolved {
                id,
                resolution,
                resolved_by,
            } => format!("resolved conflict={id} resolution={resolution} by={resolved_by}"),
            Event::SyncWarning { message } => format!("warning {message}"),
            Event::SyncError {
                kind,
                message,
                recoverable,
            } => format!("error kind={kind} recoverable={recoverable} {message}"),
            Event::SpecChanged {
                spec_id,
                change,
                version,
            } => format!("spec_changed spec={spec_id} change={change} version={version}"),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
