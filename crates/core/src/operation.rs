// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation entity and state machine.
//!
//! An operation is one requested unit of work in the shared queue. The two
//! agents only ever exchange operations through the queue file, so the full
//! lifecycle (timing, retry budget, dependency and conflict references) is
//! carried on the record itself.

use crate::clock::Clock;
use crate::conflict::ConflictId;
use crate::error::ValidationError;
use crate::params::{
    CreateSpecParams, CurrentSpecParams, DeleteSpecParams, HeartbeatParams, SpecContentParams,
    SyncStatusParams, TaskStatusParams, UserStoryParams,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for an operation.
    ///
    /// Either agent may mint operation IDs, and resolution strategies derive
    /// new ones (`<orig>-split-<i>`), so foreign formats are accepted.
    pub struct OperationId("op-");
}

/// Default retry budget for a freshly created operation.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Lifecycle status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    OperationStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// Scheduling priority. Ordered: `Low < Normal < High < Urgent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// One level lower, saturating at [`Priority::Low`]. Used by `defer`.
    pub fn lower(self) -> Self {
        match self {
            Priority::Urgent => Priority::High,
            Priority::High => Priority::Normal,
            Priority::Normal | Priority::Low => Priority::Low,
        }
    }
}

crate::simple_display! {
    Priority {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

/// Which agent created the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationSource {
    Editor,
    Server,
}

crate::simple_display! {
    OperationSource {
        Editor => "editor",
        Server => "server",
    }
}

/// Operation kind plus its typed payload.
///
/// Serializes as `{"type": "<kind>", "params": {...}}` inline in the
/// operation record. The tag drives validation and handler dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum OperationPayload {
    CreateSpec(CreateSpecParams),
    UpdateRequirements(SpecContentParams),
    UpdateDesign(SpecContentParams),
    UpdateTasks(SpecContentParams),
    AddUserStory(UserStoryParams),
    UpdateTaskStatus(TaskStatusParams),
    DeleteSpec(DeleteSpecParams),
    SetCurrentSpec(CurrentSpecParams),
    SyncStatus(SyncStatusParams),
    Heartbeat(HeartbeatParams),
}

/// Tag-only variant of [`OperationPayload`] (strips the payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateSpec,
    UpdateRequirements,
    UpdateDesign,
    UpdateTasks,
    AddUserStory,
    UpdateTaskStatus,
    DeleteSpec,
    SetCurrentSpec,
    SyncStatus,
    Heartbeat,
}

impl From<&OperationPayload> for OperationKind {
    fn from(p: &OperationPayload) -> Self {
        match p {
            OperationPayload::CreateSpec(_) => OperationKind::CreateSpec,
            OperationPayload::UpdateRequirements(_) => OperationKind::UpdateRequirements,
            OperationPayload::UpdateDesign(_) => OperationKind::UpdateDesign,
            OperationPayload::UpdateTasks(_) => OperationKind::UpdateTasks,
            OperationPayload::AddUserStory(_) => OperationKind::AddUserStory,
            OperationPayload::UpdateTaskStatus(_) => OperationKind::UpdateTaskStatus,
            OperationPayload::DeleteSpec(_) => OperationKind::DeleteSpec,
            OperationPayload::SetCurrentSpec(_) => OperationKind::SetCurrentSpec,
            OperationPayload::SyncStatus(_) => OperationKind::SyncStatus,
            OperationPayload::Heartbeat(_) => OperationKind::Heartbeat,
        }
    }
}

crate::simple_display! {
    OperationKind {
        CreateSpec => "create_spec",
        UpdateRequirements => "update_requirements",
        UpdateDesign => "update_design",
        UpdateTasks => "update_tasks",
        AddUserStory => "add_user_story",
        UpdateTaskStatus => "update_task_status",
        DeleteSpec => "delete_spec",
        SetCurrentSpec => "set_current_spec",
        SyncStatus => "sync_status",
        Heartbeat => "heartbeat",
    }
}

impl OperationKind {
    /// Kinds that require uncontested access to their resource.
    pub fn is_exclusive(self) -> bool {
        matches!(self, OperationKind::CreateSpec | OperationKind::DeleteSpec)
    }

    /// Kinds that mutate a specification (as opposed to pure status traffic).
    pub fn is_modifying(self) -> bool {
        !matches!(self, OperationKind::SyncStatus | OperationKind::Heartbeat)
    }
}

impl OperationPayload {
    pub fn kind(&self) -> OperationKind {
        OperationKind::from(self)
    }

    /// The spec this payload targets, when it is spec-scoped.
    pub fn spec_id(&self) -> Option<&str> {
        match self {
            OperationPayload::CreateSpec(p) => p.spec_id.as_deref(),
            OperationPayload::UpdateRequirements(p)
            | OperationPayload::UpdateDesign(p)
            | OperationPayload::UpdateTasks(p) => Some(&p.spec_id),
            OperationPayload::AddUserStory(p) => Some(&p.spec_id),
            OperationPayload::UpdateTaskStatus(p) => Some(&p.spec_id),
            OperationPayload::DeleteSpec(p) => Some(&p.spec_id),
            OperationPayload::SetCurrentSpec(p) => p.spec_id.as_deref(),
            OperationPayload::SyncStatus(_) | OperationPayload::Heartbeat(_) => None,
        }
    }

    /// Text content for content-update payloads (merge/split targets).
    pub fn content(&self) -> Option<&str> {
        match self {
            OperationPayload::UpdateRequirements(p)
            | OperationPayload::UpdateDesign(p)
            | OperationPayload::UpdateTasks(p) => Some(&p.content),
            _ => None,
        }
    }

    /// Replace the text content. Returns false for payloads without content.
    pub fn set_content(&mut self, content: String) -> bool {
        match self {
            OperationPayload::UpdateRequirements(p)
            | OperationPayload::UpdateDesign(p)
            | OperationPayload::UpdateTasks(p) => {
                p.content = content;
                true
            }
            _ => false,
        }
    }

    /// Resource version the sender declared, if any.
    pub fn declared_version(&self) -> Option<u64> {
        match self {
            OperationPayload::UpdateRequirements(p)
            | OperationPayload::UpdateDesign(p)
            | OperationPayload::UpdateTasks(p) => p.version,
            _ => None,
        }
    }

    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let empty = |kind: OperationKind, field: &'static str| ValidationError::EmptyField {
            kind,
            field,
        };
        match self {
            OperationPayload::CreateSpec(p) => {
                if p.name.trim().is_empty() {
                    return Err(empty(self.kind(), "name"));
                }
            }
            OperationPayload::UpdateRequirements(p)
            | OperationPayload::UpdateDesign(p)
            | OperationPayload::UpdateTasks(p) => {
                if p.spec_id.trim().is_empty() {
                    return Err(empty(self.kind(), "spec_id"));
                }
            }
            OperationPayload::AddUserStory(p) => {
                if p.spec_id.trim().is_empty() {
                    return Err(empty(self.kind(), "spec_id"));
                }
                if p.i_want.trim().is_empty() {
                    return Err(empty(self.kind(), "i_want"));
                }
            }
            OperationPayload::UpdateTaskStatus(p) => {
                if p.spec_id.trim().is_empty() {
                    return Err(empty(self.kind(), "spec_id"));
                }
                if p.task_id.trim().is_empty() {
                    return Err(empty(self.kind(), "task_id"));
                }
            }
            OperationPayload::DeleteSpec(p) => {
                if p.spec_id.trim().is_empty() {
                    return Err(empty(self.kind(), "spec_id"));
                }
            }
            OperationPayload::SetCurrentSpec(_)
            | OperationPayload::SyncStatus(_)
            | OperationPayload::Heartbeat(_) => {}
        }
        Ok(())
    }
}

/// A single operation record in the shared queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    #[serde(flatten)]
    pub payload: OperationPayload,
    pub status: OperationStatus,
    pub priority: Priority,
    pub source: OperationSource,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_ms: Option<u64>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Present iff status is failed and the operation is retry-eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<OperationId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflict_ids: Vec<ConflictId>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Operation {
    /// Create a pending operation with a fresh id.
    pub fn new(payload: OperationPayload, source: OperationSource, clock: &impl Clock) -> Self {
        Self {
            id: OperationId::new(),
            payload,
            status: OperationStatus::Pending,
            priority: Priority::Normal,
            source,
            timestamp: clock.now_utc(),
            started_at: None,
            completed_at: None,
            actual_duration_ms: None,
            estimated_duration_ms: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            next_retry_at: None,
            dependencies: Vec::new(),
            conflict_ids: Vec::new(),
            metadata: HashMap::new(),
            result: None,
            error: None,
        }
    }

    crate::setters! {
        set {
            priority: Priority,
            max_retries: u32,
            dependencies: Vec<OperationId>,
        }
        option {
            estimated_duration_ms: u64,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.payload.kind()
    }

    /// Canonical identifier of the resource this operation contends for:
    /// `spec:<spec_id>` for spec-scoped operations, `<kind>:<op_id>` otherwise.
    pub fn resource_path(&self) -> String {
        match self.payload.spec_id() {
            Some(spec) => format!("spec:{spec}"),
            None => format!("{}:{}", self.kind(), self.id),
        }
    }

    /// Completed, cancelled, or failed with the retry budget exhausted.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            OperationStatus::Completed | OperationStatus::Cancelled => true,
            OperationStatus::Failed => self.retry_count >= self.max_retries,
            OperationStatus::Pending | OperationStatus::InProgress => false,
        }
    }

    /// pending → in_progress. Stamps `started_at` exactly once.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = OperationStatus::InProgress;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    /// in_progress → completed. Stamps `completed_at` and the measured duration.
    pub fn finish(&mut self, now: DateTime<Utc>, result: Option<serde_json::Value>) {
        self.status = OperationStatus::Completed;
        self.completed_at = Some(now);
        self.actual_duration_ms = self
            .started_at
            .map(|s| (now - s).num_milliseconds().max(0) as u64);
        self.result = result;
        self.error = None;
        self.next_retry_at = None;
    }

    /// in_progress → failed with another attempt scheduled. Consumes one retry.
    pub fn fail_with_retry(&mut self, now: DateTime<Utc>, error: String, retry_at: DateTime<Utc>) {
        self.status = OperationStatus::Failed;
        self.completed_at = Some(now);
        self.actual_duration_ms = self
            .started_at
            .map(|s| (now - s).num_milliseconds().max(0) as u64);
        self.error = Some(error);
        self.retry_count += 1;
        self.next_retry_at = Some(retry_at);
    }

    /// in_progress → failed terminally (budget exhausted or non-recoverable).
    pub fn fail_terminal(&mut self, now: DateTime<Utc>, error: String) {
        self.status = OperationStatus::Failed;
        self.completed_at = Some(now);
        self.actual_duration_ms = self
            .started_at
            .map(|s| (now - s).num_milliseconds().max(0) as u64);
        self.error = Some(error);
        self.retry_count = self.max_retries;
        self.next_retry_at = None;
    }

    /// failed → pending once `next_retry_at` has passed. Clears the error;
    /// the retry was already counted when the failure was recorded.
    pub fn reset_for_retry(&mut self) {
        self.status = OperationStatus::Pending;
        self.error = None;
        self.next_retry_at = None;
        self.started_at = None;
        self.completed_at = None;
        self.actual_duration_ms = None;
    }

    /// pending | in_progress → cancelled.
    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.status = OperationStatus::Cancelled;
        self.error = Some(reason.into());
        self.next_retry_at = None;
    }

    /// Validate the record shape: non-empty id, retry budget invariant,
    /// payload field checks, no self-dependency.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if self.retry_count > self.max_retries {
            return Err(ValidationError::RetryBudget {
                count: self.retry_count,
                max: self.max_retries,
            });
        }
        if self.dependencies.iter().any(|d| *d == self.id) {
            return Err(ValidationError::SelfDependency);
        }
        self.payload.validate()
    }
}

crate::builder! {
    pub struct OperationBuilder => Operation {
        set {
            id: OperationId = OperationId::new(),
            payload: OperationPayload = OperationPayload::SyncStatus(SyncStatusParams::default()),
            status: OperationStatus = OperationStatus::Pending,
            priority: Priority = Priority::Normal,
            source: OperationSource = OperationSource::Editor,
            timestamp: chrono::DateTime<chrono::Utc> = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(crate::clock::FakeClock::START_EPOCH_MS as i64).unwrap_or_default(),
            retry_count: u32 = 0,
            max_retries: u32 = DEFAULT_MAX_RETRIES,
            dependencies: Vec<OperationId> = Vec::new(),
            conflict_ids: Vec<ConflictId> = Vec::new(),
            metadata: HashMap<String, serde_json::Value> = HashMap::new(),
        }
        option {
            started_at: chrono::DateTime<chrono::Utc> = None,
            completed_at: chrono::DateTime<chrono::Utc> = None,
            actual_duration_ms: u64 = None,
            estimated_duration_ms: u64 = None,
            next_retry_at: chrono::DateTime<chrono::Utc> = None,
            result: serde_json::Value = None,
            error: String = None,
        }
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
