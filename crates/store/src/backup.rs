// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rolling timestamped backups.
//!
//! A backup of `P` is `P.backup-<ts>` where `<ts>` is the ISO-8601 instant
//! with `:` and `.` replaced by `-` (filesystem-safe on every platform the
//! agents run on). The timestamp embedded in the name orders backups for
//! pruning and picks the newest one for restore.

use crate::error::StoreError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata recorded for each backup taken.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRecord {
    pub original: PathBuf,
    pub backup: PathBuf,
    pub size: u64,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// Encode an instant for embedding in a backup filename.
pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// Reverse [`encode_timestamp`]. The encoded layout is fixed
/// (`YYYY-MM-DDTHH-MM-SS-mmmZ`), so the replaced positions are known.
pub fn decode_timestamp(encoded: &str) -> Option<DateTime<Utc>> {
    let (date, time) = encoded.split_once('T')?;
    let time = time.strip_suffix('Z')?;
    let mut parts = time.split('-');
    let (h, m, s, ms) = (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let restored = format!("{date}T{h}:{m}:{s}.{ms}Z");
    DateTime::parse_from_rfc3339(&restored)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Backup path for `base` at `ts`: `<base><infix><encoded-ts>`.
pub fn backup_path(base: &Path, infix: &str, ts: DateTime<Utc>) -> PathBuf {
    let mut name = base
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(infix);
    name.push(encode_timestamp(ts));
    base.with_file_name(name)
}

/// All backups of `base`, newest first, ordered by the embedded timestamp.
pub fn list_backups(base: &Path, infix: &str) -> Vec<(DateTime<Utc>, PathBuf)> {
    let Some(dir) = base.parent() else {
        return Vec::new();
    };
    let Some(file_name) = base.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };
    let prefix = format!("{file_name}{infix}");

    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut backups: Vec<(DateTime<Utc>, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            let encoded = name.strip_prefix(&prefix)?;
            let ts = decode_timestamp(encoded)?;
            Some((ts, entry.path()))
        })
        .collect();
    backups.sort_by(|a, b| b.0.cmp(&a.0));
    backups
}

/// The most recent backup of `base`, if any.
pub fn latest_backup(base: &Path, infix: &str) -> Option<PathBuf> {
    list_backups(base, infix).into_iter().next().map(|(_, p)| p)
}

/// Keep at most `max` backups of `base`; remove the rest, oldest first.
/// Removal failures are logged and skipped.
pub fn prune_backups(base: &Path, infix: &str, max: usize) {
    for (_, path) in list_backups(base, infix).into_iter().skip(max) {
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to prune backup");
        }
    }
}

/// Copy `base` to a timestamped backup and record its size and checksum.
pub fn take_backup(
    base: &Path,
    infix: &str,
    ts: DateTime<Utc>,
    checksum: &str,
) -> Result<BackupRecord, StoreError> {
    let backup = backup_path(base, infix, ts);
    let size = fs::copy(base, &backup).map_err(|e| StoreError::BackupFailed {
        path: base.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(BackupRecord {
        original: base.to_path_buf(),
        backup,
        size,
        checksum: checksum.to_string(),
        created_at: ts,
    })
}

#[cfg(test)]
#[path = "backup_tests.rs"]
mod tests;
