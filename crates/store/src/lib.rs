// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sf-store: atomic JSON persistence for the SpecForge sync core.
//!
//! Two layers: [`FileLock`] implements the cross-process lock protocol
//! (sidecar descriptor files with expiry), and [`AtomicStore`] implements
//! locked, checksummed, backed-up document read/write on top of it.

mod atomic;
mod backup;
mod error;
mod lock;

pub use atomic::{content_checksum, validate_workspace, AtomicStore, StoreConfig};
pub use backup::{
    backup_path, decode_timestamp, encode_timestamp, latest_backup, list_backups, prune_backups,
    BackupRecord,
};
pub use error::StoreError;
pub use lock::{
    process_holder_id, FileLock, HolderId, LockConfig, LockDescriptor, LockGuard, LockId, LockKind,
};
