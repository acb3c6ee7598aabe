// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage error taxonomy.
//!
//! Platform errors are wrapped into a fixed set of kinds; each kind carries
//! a recoverability flag so callers can decide between retry and abort
//! without matching on variants.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced by the lock and store layers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("disk full writing {path}")]
    DiskFull { path: PathBuf },

    #[error("network i/o failed for {path}: {reason}")]
    Network { path: PathBuf, reason: String },

    #[error("concurrent access on {path}: {reason}")]
    ConcurrentAccess { path: PathBuf, reason: String },

    #[error("corrupted data in {path}: {reason}")]
    CorruptedData { path: PathBuf, reason: String },

    #[error("json parse failed for {path}: {source}")]
    JsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("backup failed for {path}: {reason}")]
    BackupFailed { path: PathBuf, reason: String },

    #[error("restore failed for {path}: {reason}")]
    RestoreFailed { path: PathBuf, reason: String },

    #[error("lock timeout on {path} after {waited_ms} ms")]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("workspace invalid: {reason}")]
    WorkspaceInvalid { reason: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Wrap a platform error, classifying by [`io::ErrorKind`].
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => StoreError::FileNotFound { path },
            io::ErrorKind::PermissionDenied => StoreError::PermissionDenied { path },
            io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded => {
                StoreError::DiskFull { path }
            }
            io::ErrorKind::WouldBlock => StoreError::ConcurrentAccess {
                path,
                reason: source.to_string(),
            },
            io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset => StoreError::Network {
                path,
                reason: source.to_string(),
            },
            _ => StoreError::Io { path, source },
        }
    }

    /// Stable snake_case tag, used for sync-error records and logs.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            StoreError::FileNotFound { .. } => "file_not_found",
            StoreError::PermissionDenied { .. } => "permission_denied",
            StoreError::DiskFull { .. } => "disk_full",
            StoreError::Network { .. } => "network_error",
            StoreError::ConcurrentAccess { .. } => "concurrent_access",
            StoreError::CorruptedData { .. } => "corrupted_data",
            StoreError::JsonParse { .. } => "json_parse_error",
            StoreError::BackupFailed { .. } => "backup_failed",
            StoreError::RestoreFailed { .. } => "restore_failed",
            StoreError::LockTimeout { .. } => "lock_timeout",
            StoreError::WorkspaceInvalid { .. } => "workspace_invalid",
            StoreError::Io { .. } => "io_error",
        }
    }

    /// Whether the caller may retry. `restore_failed` and
    /// `workspace_invalid` are fatal; everything else defaults to
    /// recoverable.
    pub fn recoverable(&self) -> bool {
        !matches!(
            self,
            StoreError::RestoreFailed { .. } | StoreError::WorkspaceInvalid { .. }
        )
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
