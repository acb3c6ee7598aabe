// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::operation::{Operation, OperationPayload, OperationSource};
use crate::params::{
    CreateSpecParams, DeleteSpecParams, HeartbeatParams, SpecContentParams, SyncStatusParams,
};

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core enumeration types.
pub mod strategies {
    use crate::conflict::Resolution;
    use crate::operation::{OperationStatus, Priority};
    use proptest::prelude::*;

    pub fn arb_priority() -> impl Strategy<Value = Priority> {
        prop_oneof![
            Just(Priority::Low),
            Just(Priority::Normal),
            Just(Priority::High),
            Just(Priority::Urgent),
        ]
    }

    pub fn arb_status() -> impl Strategy<Value = OperationStatus> {
        prop_oneof![
            Just(OperationStatus::Pending),
            Just(OperationStatus::InProgress),
            Just(OperationStatus::Completed),
            Just(OperationStatus::Failed),
            Just(OperationStatus::Cancelled),
        ]
    }

    pub fn arb_resolution() -> impl Strategy<Value = Resolution> {
        prop_oneof![
            Just(Resolution::Cancel),
            Just(Resolution::Retry),
            Just(Resolution::Defer),
            Just(Resolution::Reorder),
            Just(Resolution::Split),
            Just(Resolution::Merge),
            Just(Resolution::ExtensionWins),
            Just(Resolution::ServerWins),
            Just(Resolution::UserDecide),
        ]
    }
}

// ── Payload factory functions ───────────────────────────────────────────

pub fn create_spec_payload(name: &str) -> OperationPayload {
    OperationPayload::CreateSpec(CreateSpecParams {
        name: name.to_string(),
        description: format!("{name} description"),
        spec_id: None,
    })
}

pub fn update_requirements_payload(spec_id: &str, content: &str) -> OperationPayload {
    OperationPayload::UpdateRequirements(SpecContentParams {
        spec_id: spec_id.to_string(),
        content: content.to_string(),
        version: None,
    })
}

pub fn versioned_update_payload(spec_id: &str, content: &str, version: u64) -> OperationPayload {
    OperationPayload::UpdateRequirements(SpecContentParams {
        spec_id: spec_id.to_string(),
        content: content.to_string(),
        version: Some(version),
    })
}

pub fn delete_spec_payload(spec_id: &str) -> OperationPayload {
    OperationPayload::DeleteSpec(DeleteSpecParams {
        spec_id: spec_id.to_string(),
    })
}

pub fn sync_status_payload() -> OperationPayload {
    OperationPayload::SyncStatus(SyncStatusParams::default())
}

pub fn heartbeat_payload(server_version: &str) -> OperationPayload {
    OperationPayload::Heartbeat(HeartbeatParams {
        server_version: Some(server_version.to_string()),
        editor_version: None,
        workspace: None,
    })
}

/// A pending editor-side operation at the fake clock's start instant.
pub fn editor_op(payload: OperationPayload) -> Operation {
    Operation::builder()
        .payload(payload)
        .source(OperationSource::Editor)
        .build()
}

/// A pending server-side operation at the fake clock's start instant.
pub fn server_op(payload: OperationPayload) -> Operation {
    Operation::builder()
        .payload(payload)
        .source(OperationSource::Server)
        .build()
}
