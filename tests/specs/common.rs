// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the end-to-end scenarios.

use sf_core::params::CreateSpecParams;
use sf_core::{FakeClock, Operation, OperationPayload, OperationSource, Priority};
use sf_engine::{RecordingSink, ScriptedHandler, ServiceConfig, SyncService};
use tempfile::TempDir;

pub type TestService = SyncService<ScriptedHandler, RecordingSink, FakeClock>;

pub struct Harness {
    pub dir: TempDir,
    pub clock: FakeClock,
    pub handler: ScriptedHandler,
    pub sink: RecordingSink,
    pub service: TestService,
}

/// Spin up a service over a fresh temp workspace.
pub async fn harness() -> Harness {
    harness_with_config(ServiceConfig::default()).await
}

pub async fn harness_with_config(config: ServiceConfig) -> Harness {
    let dir = TempDir::new().expect("temp workspace");
    let clock = FakeClock::new();
    let handler = ScriptedHandler::new();
    let sink = RecordingSink::new();
    let service = SyncService::initialize(
        dir.path(),
        config,
        handler.clone(),
        sink.clone(),
        clock.clone(),
    )
    .await
    .expect("initialize");
    Harness {
        dir,
        clock,
        handler,
        sink,
        service,
    }
}

/// A second service over the same workspace, standing in for the peer
/// process. Shares the clock so cross-agent timing lines up.
pub async fn peer_service(harness: &Harness) -> TestService {
    SyncService::initialize(
        harness.dir.path(),
        ServiceConfig::default(),
        ScriptedHandler::new(),
        RecordingSink::new(),
        harness.clock.clone(),
    )
    .await
    .expect("peer initialize")
}

/// A create_spec operation whose params are distinctive enough that two of
/// them never read as duplicates.
pub fn named_spec_op(
    clock: &FakeClock,
    name: &str,
    description: &str,
    priority: Priority,
) -> Operation {
    Operation::new(
        OperationPayload::CreateSpec(CreateSpecParams {
            name: name.to_string(),
            description: description.to_string(),
            spec_id: None,
        }),
        OperationSource::Editor,
        clock,
    )
    .priority(priority)
}
