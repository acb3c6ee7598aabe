// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sf-engine: queue scheduling, conflict handling, and the sync service.
//!
//! The [`SyncService`] is the only entry point for callers: it owns the
//! in-memory [`Queue`] and sync state, routes all persistence through
//! sf-store, and delegates conflict decisions to the [`ConflictEngine`].

mod config;
mod conflict;
mod error;
mod handler;
mod queue;
mod service;
mod sink;

pub use config::{QueueConfig, ServiceConfig};
pub use conflict::{
    ConflictEngine, PatternStats, PatternTable, ResolutionOutcome, CONCURRENT_WINDOW_SECS,
    DEFER_SECS, OUTDATED_AGE_MINS, SIMILARITY_THRESHOLD,
};
pub use error::EngineError;
pub use handler::{HandlerError, LocalHandler, OperationHandler};
#[cfg(any(test, feature = "test-support"))]
pub use handler::{PanickingHandler, ScriptedHandler};
pub use queue::{processing_order, Queue};
pub use service::{
    CleanupReport, ProcessReport, SyncService, QUEUE_FILE, RESULTS_FILE, SYNC_STATE_FILE,
};
#[cfg(any(test, feature = "test-support"))]
pub use sink::RecordingSink;
pub use sink::{ChannelSink, EventSink, NullSink};
