// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Initialisation, recovery, and the two-agent file channel.

use super::common::*;
use sf_core::test_support::*;
use sf_core::{Event, OperationStatus, SpecChangeKind};
use sf_engine::{QUEUE_FILE, RESULTS_FILE, SYNC_STATE_FILE};

#[tokio::test]
async fn fresh_init_creates_no_state_until_first_mutation() {
    let h = harness().await;

    assert!(!h.dir.path().join(QUEUE_FILE).exists());
    assert!(!h.dir.path().join(RESULTS_FILE).exists());

    let state = h.service.sync_state_snapshot();
    assert!(state.extension_online);
    assert_eq!(state.pending_operations, 0);

    // First mutation materialises the queue file.
    h.service
        .queue(editor_op(create_spec_payload("auth")))
        .await
        .unwrap();
    assert!(h.dir.path().join(QUEUE_FILE).exists());
}

#[tokio::test]
async fn corrupted_queue_file_yields_empty_queue_and_warning() {
    let h = harness().await;
    h.service
        .queue(editor_op(create_spec_payload("auth")))
        .await
        .unwrap();

    // Corrupt the queue on disk (and remove the checksum sidecar so the
    // corruption is seen by the parser, not the checksum).
    std::fs::write(h.dir.path().join(QUEUE_FILE), "{severed").unwrap();
    let _ = std::fs::remove_file(h.dir.path().join(format!("{QUEUE_FILE}.checksum")));

    let peer = peer_service(&h).await;
    assert!(peer.queue_snapshot().operations.is_empty());

    // A warning was surfaced; initialization itself succeeded.
    assert_eq!(peer.sync_state_snapshot().pending_operations, 0);
}

#[tokio::test]
async fn operations_flow_between_two_agents_through_the_files() {
    let h = harness().await;

    // Editor-side agent queues work and goes away.
    let id = h
        .service
        .queue(editor_op(create_spec_payload("auth")))
        .await
        .unwrap();
    h.service.dispose().await.unwrap();

    // Server-side agent starts fresh over the same workspace, sees the
    // queued operation, and runs it.
    let peer = peer_service(&h).await;
    let snapshot = peer.queue_snapshot();
    assert_eq!(snapshot.operations.len(), 1);
    assert_eq!(snapshot.get(&id).unwrap().status, OperationStatus::Pending);

    let report = peer.process().await.unwrap();
    assert_eq!(report.succeeded, 1);

    // A third reader observes the completion and the result entry.
    let observer = peer_service(&h).await;
    assert_eq!(
        observer.queue_snapshot().get(&id).unwrap().status,
        OperationStatus::Completed
    );
    assert!(observer.results().unwrap().for_operation(&id).unwrap().success);
}

#[tokio::test]
async fn queue_version_increases_across_persists() {
    let h = harness().await;

    let v0 = h.service.queue_version();
    h.service
        .queue(editor_op(create_spec_payload("auth")))
        .await
        .unwrap();
    let v1 = h.service.queue_version();
    assert!(v1 > v0);

    h.service.process().await.unwrap();
    let v2 = h.service.queue_version();
    assert!(v2 > v1);

    // A fresh reader picks up the latest version, not a stale one.
    let peer = peer_service(&h).await;
    assert_eq!(peer.queue_version(), v2);
}

#[tokio::test]
async fn heartbeat_round_trip_marks_server_online() {
    let h = harness().await;
    assert!(!h.service.sync_state_snapshot().server_online);

    h.service.heartbeat("0.9.1", "1.4.0", "ws").await.unwrap();
    h.service.process().await.unwrap();

    let state = h.service.sync_state_snapshot();
    assert!(state.server_online);
    assert!(state.last_sync.is_some());
}

#[tokio::test]
async fn spec_change_versions_survive_restart() {
    let h = harness().await;
    h.service
        .notify_spec_change("s1", SpecChangeKind::Created)
        .await
        .unwrap();
    h.service
        .notify_spec_change("s1", SpecChangeKind::Updated)
        .await
        .unwrap();
    h.service.dispose().await.unwrap();

    let peer = peer_service(&h).await;
    assert_eq!(peer.sync_state_snapshot().spec_version("s1"), Some(2));
    assert_eq!(
        peer.notify_spec_change("s1", SpecChangeKind::Deleted)
            .await
            .unwrap(),
        3
    );
}

#[tokio::test]
async fn dispose_marks_extension_offline_on_disk() {
    let h = harness().await;
    h.service.dispose().await.unwrap();

    let raw = std::fs::read_to_string(h.dir.path().join(SYNC_STATE_FILE)).unwrap();
    let state: sf_core::SyncState = serde_json::from_str(&raw).unwrap();
    assert!(!state.extension_online);

    let events: Vec<Event> = h.sink.events();
    // Dispose is quiet; no error events were raised along the way.
    assert!(!events.iter().any(|e| matches!(e, Event::SyncError { .. })));
}
