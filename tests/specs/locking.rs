// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process lock behaviour, with the peer process simulated by a
//! foreign holder identity.

use sf_core::{Clock, FakeClock};
use sf_store::{
    AtomicStore, FileLock, HolderId, LockConfig, LockDescriptor, LockKind, StoreConfig, StoreError,
};
use std::time::Duration;
use tempfile::TempDir;

fn foreign(clock: &FakeClock, lease: Duration) -> FileLock<FakeClock> {
    FileLock::with_holder(
        LockConfig::default().timeout(lease),
        clock.clone(),
        HolderId::from_string("hld-peer-process"),
    )
}

#[test]
fn two_writers_race_loser_times_out_winner_intact() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let target = dir.path().join("mcp-operations.json");

    // Winner: the peer process takes the write lock and writes.
    let winner_lock = foreign(&clock, Duration::from_secs(60));
    winner_lock.acquire(&target, LockKind::Write).unwrap();
    std::fs::write(&target, "{\n  \"winner\": true\n}").unwrap();

    // Loser: our store cannot get the lock and reports lock_timeout.
    let store = AtomicStore::new(
        StoreConfig::default(),
        LockConfig::default()
            .timeout(Duration::from_millis(80))
            .retry_interval(Duration::from_millis(10)),
        clock.clone(),
    );
    let err = store
        .write(&target, &serde_json::json!({ "loser": true }))
        .unwrap_err();
    assert!(matches!(err, StoreError::LockTimeout { .. }));

    // The winner's bytes are untouched.
    let raw = std::fs::read_to_string(&target).unwrap();
    assert!(raw.contains("winner"));
}

#[test]
fn expired_peer_lock_is_reclaimed() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let target = dir.path().join("mcp-operations.json");

    // Peer takes the lock with a short lease and then dies.
    let peer = foreign(&clock, Duration::from_millis(200));
    peer.acquire(&target, LockKind::Write).unwrap();

    // After the lease lapses, our store writes straight through.
    clock.advance(Duration::from_secs(1));
    let store = AtomicStore::new(StoreConfig::default(), LockConfig::default(), clock.clone());
    store
        .write(&target, &serde_json::json!({ "reclaimed": true }))
        .unwrap();

    let raw = std::fs::read_to_string(&target).unwrap();
    assert!(raw.contains("reclaimed"));
}

#[test]
fn lock_descriptor_carries_holder_and_expiry() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let target = dir.path().join("specforge-sync.json");

    let lock = FileLock::new(LockConfig::default(), clock.clone());
    lock.acquire(&target, LockKind::Read).unwrap();

    let raw = std::fs::read_to_string(lock.lock_path(&target)).unwrap();
    let desc: LockDescriptor = serde_json::from_str(&raw).unwrap();
    assert_eq!(desc.path, target);
    assert_eq!(desc.kind, LockKind::Read);
    assert_eq!(desc.holder_id, *lock.holder_id());
    assert!(desc.expires_at > clock.now_utc());
}

#[test]
fn stale_lock_files_never_block_a_fresh_service() {
    let dir = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let target = dir.path().join("mcp-operations.json");

    // A crashed peer left an expired lock file behind.
    let peer = foreign(&clock, Duration::from_millis(100));
    peer.acquire(&target, LockKind::Write).unwrap();
    clock.advance(Duration::from_secs(600));

    let store = AtomicStore::new(StoreConfig::default(), LockConfig::default(), clock.clone());
    store.write(&target, &serde_json::json!({ "ok": 1 })).unwrap();
    let value: serde_json::Value = store.read(&target).unwrap();
    assert_eq!(value["ok"], 1);
}
