// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validation errors for operation ingest.

use crate::operation::OperationKind;
use thiserror::Error;

/// Why an operation record was rejected at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("operation id is empty")]
    EmptyId,
    #[error("retry_count {count} exceeds max_retries {max}")]
    RetryBudget { count: u32, max: u32 },
    #[error("{kind} params: {field} must not be empty")]
    EmptyField {
        kind: OperationKind,
        field: &'static str,
    },
    #[error("operation depends on itself")]
    SelfDependency,
}
