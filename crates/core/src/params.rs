// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-kind operation payloads.
//!
//! Each operation kind carries exactly one of these shapes. Ingest is
//! strict: unknown fields are rejected so a drifting peer shows up as a
//! validation failure instead of silently dropped data.

use serde::{Deserialize, Serialize};

/// Payload for `create_spec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSpecParams {
    pub name: String,
    pub description: String,
    /// Explicit spec id; generated from `name` by the consumer when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_id: Option<String>,
}

/// Payload for the three content-update kinds
/// (`update_requirements`, `update_design`, `update_tasks`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecContentParams {
    pub spec_id: String,
    pub content: String,
    /// Resource version the sender believes it is updating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// Payload for `add_user_story`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserStoryParams {
    pub spec_id: String,
    pub as_a: String,
    pub i_want: String,
    pub so_that: String,
}

/// Payload for `update_task_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskStatusParams {
    pub spec_id: String,
    pub task_id: String,
    pub status: String,
}

/// Payload for `delete_spec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteSpecParams {
    pub spec_id: String,
}

/// Payload for `set_current_spec`. `None` clears the current selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CurrentSpecParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_id: Option<String>,
}

/// Payload for `sync_status`. Empty by design; serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncStatusParams {}

/// Payload for `heartbeat`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

#[cfg(test)]
#[path = "params_tests.rs"]
mod tests;
