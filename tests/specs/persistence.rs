// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic persistence: crash remnants, backups, checksums.

use sf_core::{FakeClock, OperationQueue, SyncState};
use sf_core::{Clock, StatusCounts};
use sf_store::{list_backups, AtomicStore, LockConfig, StoreConfig, StoreError};
use std::time::Duration;
use tempfile::TempDir;

fn store(clock: &FakeClock) -> AtomicStore<FakeClock> {
    AtomicStore::new(StoreConfig::default(), LockConfig::default(), clock.clone())
}

#[test]
fn write_survives_a_crash_that_left_a_tmp_file() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let store = store(&clock);
    let target = dir.path().join("mcp-operations.json");

    let queue = OperationQueue::empty(clock.now_utc());
    store.write(&target, &queue).unwrap();

    // A later writer died between the temp write and the rename: the temp
    // file holds half a document, the target still holds the old one.
    std::fs::write(
        dir.path().join("mcp-operations.json.tmp"),
        "{\"operations\": [",
    )
    .unwrap();

    let read: OperationQueue = store.read(&target).unwrap();
    assert_eq!(read, queue);

    // Temp remnants are safe to delete and are replaced by the next write.
    store.write(&target, &queue).unwrap();
    let read: OperationQueue = store.read(&target).unwrap();
    assert_eq!(read, queue);
}

#[test]
fn round_trip_preserves_full_documents() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let store = store(&clock);

    let mut state = SyncState::default();
    state.extension_online = true;
    state.bump_spec("s1", clock.now_utc());
    state.performance.average_operation_time_ms = 41.5;

    let target = dir.path().join("specforge-sync.json");
    store.write(&target, &state).unwrap();
    let read: SyncState = store.read(&target).unwrap();
    assert_eq!(read, state);
}

#[test]
fn backups_rotate_and_restore_source_is_newest() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let store = store(&clock);
    let target = dir.path().join("mcp-operations.json");

    for version in 0..8u64 {
        let mut queue = OperationQueue::empty(clock.now_utc());
        queue.version = version;
        store.write(&target, &queue).unwrap();
        clock.advance(Duration::from_secs(1));
    }

    let backups = list_backups(&target, ".backup-");
    assert_eq!(backups.len(), 5);

    // Newest backup is the state right before the last write.
    let newest: OperationQueue =
        serde_json::from_str(&std::fs::read_to_string(&backups[0].1).unwrap()).unwrap();
    assert_eq!(newest.version, 6);

    // Backup filenames parse back to their timestamps, newest first.
    assert!(backups.windows(2).all(|w| w[0].0 > w[1].0));
}

#[test]
fn tampered_document_is_rejected_by_checksum() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let store = store(&clock);
    let target = dir.path().join("mcp-operations.json");

    store
        .write(&target, &OperationQueue::empty(clock.now_utc()))
        .unwrap();

    // Flip the version in place without updating the sidecar.
    let raw = std::fs::read_to_string(&target).unwrap();
    std::fs::write(&target, raw.replace("\"version\": 0", "\"version\": 9")).unwrap();

    let err = store.read::<OperationQueue>(&target).unwrap_err();
    assert!(matches!(err, StoreError::CorruptedData { .. }));
}

#[test]
fn foreign_document_without_sidecar_is_accepted() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let store = store(&clock);
    let target = dir.path().join("mcp-operations.json");

    // The peer agent writes without checksums.
    let peer = AtomicStore::new(
        StoreConfig::default().checksum_validation(false),
        LockConfig::default(),
        clock.clone(),
    );
    peer.write(&target, &OperationQueue::empty(clock.now_utc()))
        .unwrap();

    let read: OperationQueue = store.read(&target).unwrap();
    assert_eq!(read.status_counts(), StatusCounts::default());
}
