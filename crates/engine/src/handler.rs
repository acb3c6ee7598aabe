// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation handler dispatch.
//!
//! The core owns operation *lifecycle*; the work an operation describes is
//! performed by a handler installed by the consumer. The built-in handler
//! covers the bookkeeping kinds and marks artifact-producing kinds as
//! delegated so the surrounding system can act on them.

use async_trait::async_trait;
use sf_core::{Operation, OperationPayload};
use thiserror::Error;

/// A handler failure. `recoverable` feeds the retry decision: fatal
/// failures bypass the retry budget entirely.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub recoverable: bool,
}

impl HandlerError {
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            recoverable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            recoverable: false,
        }
    }
}

/// Performs the work an operation describes.
#[async_trait]
pub trait OperationHandler: Send + Sync + 'static {
    /// Run one operation to completion. The returned value becomes the
    /// operation's `result`.
    async fn handle(&self, op: &Operation) -> Result<serde_json::Value, HandlerError>;
}

/// Built-in handler for the bookkeeping operation kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalHandler;

#[async_trait]
impl OperationHandler for LocalHandler {
    async fn handle(&self, op: &Operation) -> Result<serde_json::Value, HandlerError> {
        match &op.payload {
            OperationPayload::SyncStatus(_) => Ok(serde_json::json!({ "acknowledged": true })),
            OperationPayload::Heartbeat(params) => Ok(serde_json::json!({
                "server_version": params.server_version,
                "editor_version": params.editor_version,
            })),
            OperationPayload::SetCurrentSpec(params) => Ok(serde_json::json!({
                "current_spec": params.spec_id,
            })),
            // Artifact-producing kinds are performed by the surrounding
            // system; completing them here records the hand-off.
            other => Ok(serde_json::json!({
                "delegated": true,
                "kind": other.kind().to_string(),
            })),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
mod scripted {
    use super::{HandlerError, OperationHandler};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sf_core::{Operation, OperationId};
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Handler that replays a script of outcomes, then succeeds.
    /// Records every operation it was asked to run.
    #[derive(Clone, Default)]
    pub struct ScriptedHandler {
        outcomes: Arc<Mutex<VecDeque<Result<serde_json::Value, HandlerError>>>>,
        calls: Arc<Mutex<Vec<OperationId>>>,
    }

    impl ScriptedHandler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the outcome for the next call.
        pub fn push_outcome(&self, outcome: Result<serde_json::Value, HandlerError>) {
            self.outcomes.lock().push_back(outcome);
        }

        /// Queue `n` recoverable failures.
        pub fn fail_times(&self, n: usize, message: &str) {
            for _ in 0..n {
                self.push_outcome(Err(HandlerError::recoverable(message)));
            }
        }

        pub fn calls(&self) -> Vec<OperationId> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl OperationHandler for ScriptedHandler {
        async fn handle(&self, op: &Operation) -> Result<serde_json::Value, HandlerError> {
            self.calls.lock().push(op.id.clone());
            self.outcomes
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(serde_json::json!({ "ok": true })))
        }
    }

    /// Handler that panics, for exercising the panic fail-safe.
    #[derive(Clone, Copy, Default)]
    pub struct PanickingHandler;

    #[allow(clippy::panic)]
    #[async_trait]
    impl OperationHandler for PanickingHandler {
        async fn handle(&self, _op: &Operation) -> Result<serde_json::Value, HandlerError> {
            panic!("handler blew up");
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use scripted::{PanickingHandler, ScriptedHandler};

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
