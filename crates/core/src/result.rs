// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The results ledger (`mcp-results.json`).
//!
//! Append-style: the processing side pushes one entry per finished
//! operation; the ledger keeps only the newest [`RESULTS_CAP`] entries.

use crate::operation::OperationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bound on ledger length.
pub const RESULTS_CAP: usize = 100;

/// Outcome of one operation, as recorded for the peer agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub operation_id: OperationId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    /// Whether the failure (if any) is worth retrying.
    #[serde(default)]
    pub retryable: bool,
}

/// The on-disk ledger document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsLedger {
    pub results: Vec<OperationResult>,
    pub last_updated: DateTime<Utc>,
}

impl ResultsLedger {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            results: Vec::new(),
            last_updated: now,
        }
    }

    /// Append an entry, pruning the oldest past [`RESULTS_CAP`].
    pub fn push(&mut self, result: OperationResult, now: DateTime<Utc>) {
        self.results.push(result);
        if self.results.len() > RESULTS_CAP {
            let excess = self.results.len() - RESULTS_CAP;
            self.results.drain(..excess);
        }
        self.last_updated = now;
    }

    pub fn for_operation(&self, id: &str) -> Option<&OperationResult> {
        self.results.iter().rev().find(|r| r.operation_id == *id)
    }
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
