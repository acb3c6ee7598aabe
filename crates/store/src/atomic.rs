// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic typed JSON persistence.
//!
//! Writes go to a temp file that is renamed over the target, behind the
//! target's file lock, with an optional timestamped backup taken first and
//! restored if the swap fails. Reads verify a checksum sidecar when
//! enabled. The write sequence is the crash-safety story: at every instant
//! the target path holds either the old document or the new one.

use crate::backup::{self, BackupRecord};
use crate::error::StoreError;
use crate::lock::{FileLock, LockConfig, LockGuard, LockKind};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sf_core::Clock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Hex SHA-256 of a serialized document.
pub fn content_checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backup_enabled: bool,
    pub max_backups: usize,
    pub checksum_validation: bool,
    pub tmp_suffix: String,
    pub checksum_suffix: String,
    pub backup_infix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backup_enabled: true,
            max_backups: 5,
            checksum_validation: true,
            tmp_suffix: ".tmp".to_string(),
            checksum_suffix: ".checksum".to_string(),
            backup_infix: ".backup-".to_string(),
        }
    }
}

impl StoreConfig {
    sf_core::setters! {
        into {
            tmp_suffix: String,
            checksum_suffix: String,
            backup_infix: String,
        }
        set {
            backup_enabled: bool,
            max_backups: usize,
            checksum_validation: bool,
        }
    }
}

/// Typed JSON store over one workspace.
pub struct AtomicStore<C: Clock> {
    config: StoreConfig,
    lock: FileLock<C>,
    clock: C,
    /// Most recent backup per target, used for restore on a failed swap.
    last_backups: Mutex<HashMap<PathBuf, BackupRecord>>,
}

impl<C: Clock> AtomicStore<C> {
    pub fn new(config: StoreConfig, lock_config: LockConfig, clock: C) -> Self {
        Self {
            config,
            lock: FileLock::new(lock_config, clock.clone()),
            clock,
            last_backups: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn lock(&self) -> &FileLock<C> {
        &self.lock
    }

    /// Read and decode `path`.
    pub fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<T, StoreError> {
        if !path.exists() {
            return Err(StoreError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let _guard = LockGuard::acquire(&self.lock, path, LockKind::Read)?;

        let bytes = fs::read(path).map_err(|e| StoreError::from_io(path, e))?;
        let text = String::from_utf8(bytes).map_err(|e| StoreError::CorruptedData {
            path: path.to_path_buf(),
            reason: format!("invalid utf-8: {e}"),
        })?;

        let value: T =
            serde_json::from_str(&text).map_err(|e| StoreError::JsonParse {
                path: path.to_path_buf(),
                source: e,
            })?;

        if self.config.checksum_validation {
            self.verify_checksum(path, text.as_bytes())?;
        }

        Ok(value)
    }

    /// Serialize and atomically replace `path` with `value`.
    pub fn write<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let _guard = LockGuard::acquire(&self.lock, path, LockKind::Write)?;

        if path.exists() && self.config.backup_enabled {
            self.backup_existing(path)?;
        }

        let body = serde_json::to_string_pretty(value).map_err(|e| StoreError::CorruptedData {
            path: path.to_path_buf(),
            reason: format!("serialize failed: {e}"),
        })?;

        let tmp = crate::lock::sidecar_path(path, &self.config.tmp_suffix);
        fs::write(&tmp, body.as_bytes()).map_err(|e| StoreError::from_io(&tmp, e))?;

        if path.exists() {
            fs::remove_file(path).map_err(|e| StoreError::from_io(path, e))?;
        }
        if let Err(rename_err) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            self.restore_backup(path)?;
            return Err(StoreError::from_io(path, rename_err));
        }

        self.update_checksum_sidecar(path, body.as_bytes())?;
        backup::prune_backups(path, &self.config.backup_infix, self.config.max_backups);
        Ok(())
    }

    /// Whether the document exists on disk.
    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn backup_existing(&self, path: &Path) -> Result<(), StoreError> {
        let existing = fs::read(path).map_err(|e| StoreError::BackupFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let record = backup::take_backup(
            path,
            &self.config.backup_infix,
            self.clock.now_utc(),
            &content_checksum(&existing),
        )?;
        tracing::debug!(
            path = %path.display(),
            backup = %record.backup.display(),
            size = record.size,
            "backup taken"
        );
        self.last_backups.lock().insert(path.to_path_buf(), record);
        Ok(())
    }

    /// Put the newest backup back in place after a failed swap.
    fn restore_backup(&self, path: &Path) -> Result<(), StoreError> {
        let recorded = self.last_backups.lock().get(path).map(|r| r.backup.clone());
        let source = match recorded {
            Some(p) if p.exists() => Some(p),
            _ => backup::latest_backup(path, &self.config.backup_infix),
        };
        let Some(source) = source else {
            // Nothing to restore; the target never existed.
            return Ok(());
        };
        fs::copy(&source, path)
            .map(|_| ())
            .map_err(|e| StoreError::RestoreFailed {
                path: path.to_path_buf(),
                reason: format!("copy from {} failed: {e}", source.display()),
            })
    }

    fn checksum_path(&self, path: &Path) -> PathBuf {
        crate::lock::sidecar_path(path, &self.config.checksum_suffix)
    }

    fn verify_checksum(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let sidecar = self.checksum_path(path);
        let stored = match fs::read_to_string(&sidecar) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // No sidecar: the document may come from an agent with
                // checksums disabled. Skip rather than reject.
                tracing::debug!(path = %path.display(), "no checksum sidecar, skipping validation");
                return Ok(());
            }
            Err(e) => return Err(StoreError::from_io(&sidecar, e)),
        };
        let actual = content_checksum(bytes);
        if stored.trim() != actual {
            return Err(StoreError::CorruptedData {
                path: path.to_path_buf(),
                reason: format!("checksum mismatch: stored {} actual {actual}", stored.trim()),
            });
        }
        Ok(())
    }

    fn update_checksum_sidecar(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let sidecar = self.checksum_path(path);
        if self.config.checksum_validation {
            fs::write(&sidecar, content_checksum(bytes))
                .map_err(|e| StoreError::from_io(&sidecar, e))
        } else {
            // A stale sidecar would fail future validating readers.
            if sidecar.exists() {
                let _ = fs::remove_file(&sidecar);
            }
            Ok(())
        }
    }
}

/// Check that `dir` is an existing directory this process can write to,
/// via a round-trip probe file.
pub fn validate_workspace(dir: &Path) -> Result<(), StoreError> {
    if !dir.is_dir() {
        return Err(StoreError::WorkspaceInvalid {
            reason: format!("{} is not a directory", dir.display()),
        });
    }
    let probe = dir.join(format!(".sf-probe-{}", nanoid::nanoid!(8)));
    let payload = b"probe";
    let round_trip = (|| -> io::Result<bool> {
        fs::write(&probe, payload)?;
        let read_back = fs::read(&probe)?;
        fs::remove_file(&probe)?;
        Ok(read_back == payload)
    })();
    match round_trip {
        Ok(true) => Ok(()),
        Ok(false) => Err(StoreError::WorkspaceInvalid {
            reason: format!("probe round-trip mismatch in {}", dir.display()),
        }),
        Err(e) => Err(StoreError::WorkspaceInvalid {
            reason: format!("workspace {} is not writable: {e}", dir.display()),
        }),
    }
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
