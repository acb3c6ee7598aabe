// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inter-process advisory file locks.
//!
//! A lock on target path `P` is a sidecar file `P.lock` holding a JSON
//! descriptor with the holder's identity and an expiry instant. There is no
//! OS-level locking: both agents agree on the protocol, and expiry lets
//! either side reclaim a lock whose holder died. Lock scope is a single
//! target file; callers hold at most one lock at a time.

use crate::error::StoreError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sf_core::Clock;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

sf_core::define_id! {
    /// Identifier of one acquisition; proves ownership at release time.
    pub struct LockId("lck-");
}

sf_core::define_id! {
    /// Stable per-process identity embedded in lock descriptors.
    pub struct HolderId("hld-");
}

/// The per-process holder identity. Generated once; embedding the pid keeps
/// collisions diagnosable from the lock file alone.
pub fn process_holder_id() -> &'static HolderId {
    static HOLDER: OnceLock<HolderId> = OnceLock::new();
    HOLDER.get_or_init(|| {
        HolderId::from_string(format!(
            "hld-{}-{}",
            std::process::id(),
            nanoid::nanoid!(10)
        ))
    })
}

/// Requested access mode. Recorded in the descriptor for diagnostics; the
/// acquisition protocol is identical for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    Read,
    Write,
}

sf_core::simple_display! {
    LockKind {
        Read => "read",
        Write => "write",
    }
}

/// On-disk contents of `P.lock`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockDescriptor {
    pub path: PathBuf,
    pub lock_id: LockId,
    pub kind: LockKind,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub holder_id: HolderId,
}

impl LockDescriptor {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Lock configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Acquisition deadline, and the lease duration written into the
    /// descriptor's `expires_at`.
    pub timeout: Duration,
    /// Sleep between acquisition attempts while another holder is live.
    pub retry_interval: Duration,
    /// Retry sleeps allowed before giving up, independent of the deadline.
    pub max_retries: u32,
    /// Suffix appended to the target path for the sidecar file.
    pub suffix: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_interval: Duration::from_secs(1),
            max_retries: 3,
            suffix: ".lock".to_string(),
        }
    }
}

impl LockConfig {
    sf_core::setters! {
        into {
            suffix: String,
        }
        set {
            timeout: Duration,
            retry_interval: Duration,
            max_retries: u32,
        }
    }
}

/// Inter-process lock manager for one process.
///
/// Tracks its own acquisitions so `release` can verify the caller still
/// owns what it is releasing.
pub struct FileLock<C: Clock> {
    config: LockConfig,
    clock: C,
    holder: HolderId,
    held: Mutex<HashMap<PathBuf, LockDescriptor>>,
}

impl<C: Clock> FileLock<C> {
    pub fn new(config: LockConfig, clock: C) -> Self {
        Self::with_holder(config, clock, process_holder_id().clone())
    }

    /// Construct with an explicit holder identity. Lets tests stand in for
    /// a second process; production code uses [`FileLock::new`].
    pub fn with_holder(config: LockConfig, clock: C, holder: HolderId) -> Self {
        Self {
            config,
            clock,
            holder,
            held: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub fn holder_id(&self) -> &HolderId {
        &self.holder
    }

    /// Sidecar path for a target.
    pub fn lock_path(&self, target: &Path) -> PathBuf {
        sidecar_path(target, &self.config.suffix)
    }

    /// Acquire the lock on `target`, waiting up to the configured timeout.
    ///
    /// An expired or unparseable descriptor is reclaimed. Re-acquiring a
    /// path this process already holds extends the lease and returns the
    /// existing id.
    pub fn acquire(&self, target: &Path, kind: LockKind) -> Result<LockId, StoreError> {
        self.acquire_with_timeout(target, kind, self.config.timeout)
    }

    /// [`FileLock::acquire`] with an explicit deadline.
    pub fn acquire_with_timeout(
        &self,
        target: &Path,
        kind: LockKind,
        timeout: Duration,
    ) -> Result<LockId, StoreError> {
        let lock_path = self.lock_path(target);
        let mut waited = Duration::ZERO;
        let mut retries = 0;

        loop {
            match self.try_take(target, &lock_path, kind, timeout)? {
                Some(id) => return Ok(id),
                None => {
                    if waited >= timeout || retries >= self.config.max_retries {
                        return Err(StoreError::LockTimeout {
                            path: target.to_path_buf(),
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    let nap = self.config.retry_interval.min(timeout - waited);
                    std::thread::sleep(nap);
                    waited += nap;
                    retries += 1;
                }
            }
        }
    }

    /// One acquisition attempt. `Ok(None)` means a live foreign holder.
    fn try_take(
        &self,
        target: &Path,
        lock_path: &Path,
        kind: LockKind,
        lease: Duration,
    ) -> Result<Option<LockId>, StoreError> {
        match fs::read_to_string(lock_path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.write_descriptor(target, lock_path, kind, lease)
            }
            Err(e) => Err(StoreError::from_io(lock_path, e)),
            Ok(raw) => match serde_json::from_str::<LockDescriptor>(&raw) {
                Err(e) => {
                    // A corrupted lock file is treated as expired.
                    tracing::warn!(path = %lock_path.display(), error = %e, "reclaiming corrupted lock file");
                    remove_if_exists(lock_path)?;
                    Ok(None)
                }
                Ok(desc) if desc.holder_id == self.holder => {
                    // Re-entry: extend our own lease in place.
                    let mut desc = desc;
                    desc.expires_at = self.clock.now_utc()
                        + ChronoDuration::milliseconds(lease.as_millis() as i64);
                    self.persist_descriptor(lock_path, &desc)?;
                    let id = desc.lock_id.clone();
                    self.held.lock().insert(target.to_path_buf(), desc);
                    Ok(Some(id))
                }
                Ok(desc) if desc.is_expired(self.clock.now_utc()) => {
                    tracing::warn!(
                        path = %lock_path.display(),
                        holder = %desc.holder_id,
                        "reclaiming expired lock"
                    );
                    remove_if_exists(lock_path)?;
                    Ok(None)
                }
                Ok(_) => Ok(None),
            },
        }
    }

    fn write_descriptor(
        &self,
        target: &Path,
        lock_path: &Path,
        kind: LockKind,
        lease: Duration,
    ) -> Result<Option<LockId>, StoreError> {
        let now = self.clock.now_utc();
        let desc = LockDescriptor {
            path: target.to_path_buf(),
            lock_id: LockId::new(),
            kind,
            acquired_at: now,
            expires_at: now + ChronoDuration::milliseconds(lease.as_millis() as i64),
            holder_id: self.holder.clone(),
        };
        let body = serde_json::to_string_pretty(&desc).map_err(|e| StoreError::CorruptedData {
            path: lock_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        // create_new loses the race cleanly when another process slips in
        // between our read and this write.
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(mut file) => {
                use std::io::Write;
                file.write_all(body.as_bytes())
                    .map_err(|e| StoreError::from_io(lock_path, e))?;
                let id = desc.lock_id.clone();
                self.held.lock().insert(target.to_path_buf(), desc);
                Ok(Some(id))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(StoreError::from_io(lock_path, e)),
        }
    }

    fn persist_descriptor(
        &self,
        lock_path: &Path,
        desc: &LockDescriptor,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(desc).map_err(|e| StoreError::CorruptedData {
            path: lock_path.to_path_buf(),
            reason: e.to_string(),
        })?;
        fs::write(lock_path, body).map_err(|e| StoreError::from_io(lock_path, e))
    }

    /// Release the lock iff `lock_id` matches our record for `target`.
    /// Release problems are logged, never propagated.
    pub fn release(&self, target: &Path, lock_id: &LockId) {
        let owned = {
            let mut held = self.held.lock();
            let matches = held
                .get(target)
                .is_some_and(|desc| desc.lock_id == *lock_id);
            if matches {
                held.remove(target);
            }
            matches
        };
        if !owned {
            tracing::warn!(
                path = %target.display(),
                lock = %lock_id,
                "release without a matching lock record ignored"
            );
            return;
        }

        let lock_path = self.lock_path(target);
        if let Err(e) = fs::remove_file(&lock_path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %lock_path.display(),
                    error = %e,
                    "failed to remove lock file on release"
                );
            }
        }
    }

    /// Paths this process currently believes it holds.
    pub fn held_paths(&self) -> Vec<PathBuf> {
        self.held.lock().keys().cloned().collect()
    }
}

/// RAII guard: releases on drop so every exit path unlocks.
pub struct LockGuard<'a, C: Clock> {
    lock: &'a FileLock<C>,
    target: PathBuf,
    id: LockId,
}

impl<'a, C: Clock> LockGuard<'a, C> {
    pub fn acquire(
        lock: &'a FileLock<C>,
        target: &Path,
        kind: LockKind,
    ) -> Result<Self, StoreError> {
        let id = lock.acquire(target, kind)?;
        Ok(Self {
            lock,
            target: target.to_path_buf(),
            id,
        })
    }

    pub fn id(&self) -> &LockId {
        &self.id
    }
}

impl<C: Clock> Drop for LockGuard<'_, C> {
    fn drop(&mut self) {
        self.lock.release(&self.target, &self.id);
    }
}

/// `P` → `P<suffix>` alongside the target.
pub(crate) fn sidecar_path(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    target.with_file_name(name)
}

fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::from_io(path, e)),
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
