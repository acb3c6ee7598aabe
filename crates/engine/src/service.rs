// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sync service: single coordinator over one workspace.
//!
//! Owns the in-memory queue, conflict engine, and sync state; everything
//! on disk goes through the atomic store. Every state-mutating public
//! method persists before returning, so the peer agent always observes a
//! consistent snapshot. Lock order throughout: queue, conflicts, sync
//! state — and no parking_lot guard is ever held across an await.

use crate::config::ServiceConfig;
use crate::conflict::{ConflictEngine, ResolutionOutcome};
use crate::error::EngineError;
use crate::handler::{HandlerError, OperationHandler};
use crate::queue::Queue;
use crate::sink::EventSink;
use parking_lot::Mutex;
use sf_core::{
    Clock, Conflict, ConflictId, Event, Operation, OperationId, OperationKind, OperationPayload,
    OperationQueue, OperationResult, OperationSource, Priority, Resolution, ResolvedBy,
    ResultsLedger, SpecChangeKind, SyncErrorRecord, SyncState,
};
use sf_store::{validate_workspace, AtomicStore, StoreError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Queue document filename.
pub const QUEUE_FILE: &str = "mcp-operations.json";
/// Sync-state document filename.
pub const SYNC_STATE_FILE: &str = "specforge-sync.json";
/// Results ledger filename.
pub const RESULTS_FILE: &str = "mcp-results.json";

/// What one `process()` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// What one `cleanup_old()` call removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub operations_removed: usize,
    pub conflicts_removed: usize,
}

struct Inner<H, S, C: Clock> {
    workspace: PathBuf,
    store: AtomicStore<C>,
    clock: C,
    handler: H,
    sink: S,
    config: ServiceConfig,
    queue: Mutex<Queue>,
    conflicts: Mutex<ConflictEngine>,
    sync_state: Mutex<SyncState>,
}

/// The single entry point for callers.
pub struct SyncService<H, S, C: Clock> {
    inner: Arc<Inner<H, S, C>>,
}

impl<H, S, C: Clock> Clone for SyncService<H, S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H, S, C> SyncService<H, S, C>
where
    H: OperationHandler,
    S: EventSink,
    C: Clock,
{
    /// Validate the workspace, load (or synthesise) the three state
    /// documents, mark the extension online, and persist the sync state.
    ///
    /// Missing files are never an error; unreadable ones fall back to
    /// fresh documents with a warning event.
    pub async fn initialize(
        workspace: &Path,
        config: ServiceConfig,
        handler: H,
        sink: S,
        clock: C,
    ) -> Result<Self, EngineError> {
        validate_workspace(workspace)?;
        let store = AtomicStore::new(config.store.clone(), config.lock.clone(), clock.clone());
        let now = clock.now_utc();
        let mut warnings = Vec::new();

        let queue_doc: OperationQueue = load_or_default(
            &store,
            &workspace.join(QUEUE_FILE),
            &mut warnings,
            || OperationQueue::empty(now),
        )?;
        let state_doc: SyncState = load_or_default(
            &store,
            &workspace.join(SYNC_STATE_FILE),
            &mut warnings,
            SyncState::default,
        )?;
        // Validate the ledger up front so a corrupt one is reported now
        // rather than on the first result write.
        let _: ResultsLedger = load_or_default(
            &store,
            &workspace.join(RESULTS_FILE),
            &mut warnings,
            || ResultsLedger::empty(now),
        )?;

        let conflicts = ConflictEngine::from_table(queue_doc.conflicts.clone());
        let queue = Queue::from_document(&queue_doc, config.queue.clone());

        let mut sync_state = state_doc;
        sync_state.extension_online = true;
        refresh_counters(&mut sync_state, &queue, &conflicts);

        let service = Self {
            inner: Arc::new(Inner {
                workspace: workspace.to_path_buf(),
                store,
                clock,
                handler,
                sink,
                config,
                queue: Mutex::new(queue),
                conflicts: Mutex::new(conflicts),
                sync_state: Mutex::new(sync_state),
            }),
        };
        service.persist_state()?;

        tracing::info!(
            workspace = %workspace.display(),
            version = service.queue_version(),
            "sync service initialized"
        );
        for message in warnings {
            service.emit(Event::SyncWarning { message }).await;
        }
        Ok(service)
    }

    pub fn workspace(&self) -> &Path {
        &self.inner.workspace
    }

    // ── Queueing ────────────────────────────────────────────────────────

    /// Validate and enqueue an operation, persisting the queue and sync
    /// state before returning. Detected conflicts are recorded, announced,
    /// and (when auto-resolvable) scheduled for background resolution.
    pub async fn queue(&self, op: Operation) -> Result<OperationId, EngineError> {
        let result = self.queue_inner(op).await;
        self.report_if_err(result).await
    }

    async fn queue_inner(&self, op: Operation) -> Result<OperationId, EngineError> {
        let now = self.inner.clock.now_utc();
        let queued_event = Event::OperationQueued {
            id: op.id.clone(),
            kind: op.kind(),
            priority: op.priority,
            source: op.source,
        };
        let op_id = op.id.clone();

        let (conflict_events, auto) = {
            let mut queue = self.inner.queue.lock();
            let mut conflicts = self.inner.conflicts.lock();
            let detected = queue.enqueue(op, &mut conflicts, now)?;

            let conflict_events: Vec<Event> = detected
                .iter()
                .filter_map(|cid| conflicts.get(cid))
                .map(|c| Event::ConflictDetected {
                    id: c.id.clone(),
                    kind: c.kind,
                    severity: c.severity,
                    operations: c.operations.clone(),
                })
                .collect();
            let auto: Vec<(ConflictId, Resolution)> = detected
                .iter()
                .filter_map(|cid| conflicts.get(cid))
                .filter(|c| c.auto_resolvable)
                .filter_map(|c| c.default_resolution().map(|r| (c.id.clone(), r)))
                .collect();

            self.persist_queue_locked(&mut queue, &conflicts)?;
            let mut state = self.inner.sync_state.lock();
            refresh_counters(&mut state, &queue, &conflicts);
            self.write_sync_state(&state)?;
            (conflict_events, auto)
        };

        self.emit(queued_event).await;
        for event in conflict_events {
            self.emit(event).await;
        }
        for (cid, resolution) in auto {
            self.schedule_auto_resolve(cid, resolution);
        }
        Ok(op_id)
    }

    // ── Processing ──────────────────────────────────────────────────────

    /// Run eligible operations until the queue is drained or the batch
    /// budget is spent. Handler errors and panics never escape; they are
    /// recorded on the operation and fed into the retry policy.
    pub async fn process(&self) -> Result<ProcessReport, EngineError> {
        let result = self.process_inner().await;
        self.report_if_err(result).await
    }

    async fn process_inner(&self) -> Result<ProcessReport, EngineError> {
        let start_ms = self.inner.clock.epoch_ms();
        let mut report = ProcessReport::default();

        for _ in 0..self.inner.config.queue.max_batch_size {
            let now = self.inner.clock.now_utc();
            let next = {
                let mut queue = self.inner.queue.lock();
                let conflicts = self.inner.conflicts.lock();
                queue.next_eligible(&conflicts, now)
            };
            let Some(id) = next else { break };

            let snapshot = {
                let mut queue = self.inner.queue.lock();
                queue.begin(&id, now)?;
                queue
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| EngineError::UnknownOperation(id.clone()))?
            };
            self.persist_queue()?;
            self.emit(Event::OperationStarted { id: id.clone() }).await;
            report.processed += 1;

            let outcome = self.dispatch(snapshot.clone()).await;
            let finished_at = self.inner.clock.now_utc();
            match outcome {
                Ok(value) => {
                    let duration_ms = {
                        let mut queue = self.inner.queue.lock();
                        queue.complete(&id, finished_at, Some(value.clone()))?
                    };
                    if snapshot.kind() == OperationKind::Heartbeat {
                        let mut state = self.inner.sync_state.lock();
                        state.server_online = true;
                        state.last_sync = Some(finished_at);
                    }
                    self.record_result_entry(OperationResult {
                        operation_id: id.clone(),
                        success: true,
                        message: None,
                        data: Some(value),
                        timestamp: finished_at,
                        retryable: false,
                    })?;
                    self.persist_queue()?;
                    self.emit(Event::OperationCompleted {
                        id: id.clone(),
                        duration_ms,
                    })
                    .await;
                    report.succeeded += 1;
                }
                Err(err) => {
                    let will_retry = {
                        let mut queue = self.inner.queue.lock();
                        queue.fail(
                            &id,
                            finished_at,
                            err.message.clone(),
                            err.recoverable,
                            &self.inner.config.retry,
                        )?
                    };
                    self.record_result_entry(OperationResult {
                        operation_id: id.clone(),
                        success: false,
                        message: Some(err.message.clone()),
                        data: None,
                        timestamp: finished_at,
                        retryable: will_retry,
                    })?;
                    self.persist_queue()?;
                    self.emit(Event::OperationFailed {
                        id: id.clone(),
                        error: err.message,
                        will_retry,
                    })
                    .await;
                    report.failed += 1;
                }
            }
        }

        let elapsed_ms = self.inner.clock.epoch_ms().saturating_sub(start_ms);
        {
            let queue = self.inner.queue.lock();
            let conflicts = self.inner.conflicts.lock();
            let mut state = self.inner.sync_state.lock();
            state.performance.last_processing_duration_ms = elapsed_ms;
            state.performance.average_operation_time_ms = queue.average_duration_ms();
            state.performance.queue_processing_rate =
                report.processed as f64 * 1000.0 / elapsed_ms.max(1) as f64;
            refresh_counters(&mut state, &queue, &conflicts);
            self.write_sync_state(&state)?;
        }
        Ok(report)
    }

    /// Run the handler inside its own task so a panic is contained and
    /// recorded like any other failure.
    async fn dispatch(&self, op: Operation) -> Result<serde_json::Value, HandlerError> {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.handler.handle(&op).await });
        match task.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                Err(HandlerError::recoverable("handler panicked"))
            }
            Err(join_err) => Err(HandlerError::recoverable(format!(
                "handler task failed: {join_err}"
            ))),
        }
    }

    // ── Conflict resolution ─────────────────────────────────────────────

    /// Apply a resolution to a conflict. Used both by the background
    /// auto-resolver (`resolved_by = system`) and by user decisions.
    /// Split products are returned to the caller for explicit enqueue.
    pub async fn resolve_conflict(
        &self,
        id: &ConflictId,
        resolution: Resolution,
        resolved_by: ResolvedBy,
    ) -> Result<ResolutionOutcome, EngineError> {
        let result = self.resolve_conflict_inner(id, resolution, resolved_by).await;
        self.report_if_err(result).await
    }

    async fn resolve_conflict_inner(
        &self,
        id: &ConflictId,
        resolution: Resolution,
        resolved_by: ResolvedBy,
    ) -> Result<ResolutionOutcome, EngineError> {
        let now = self.inner.clock.now_utc();
        let outcome = {
            let mut queue = self.inner.queue.lock();
            let mut conflicts = self.inner.conflicts.lock();
            let outcome =
                conflicts.resolve(id, resolution, resolved_by, queue.operations_mut(), now)?;
            if outcome.applied {
                queue.resort();
                self.persist_queue_locked(&mut queue, &conflicts)?;
                let mut state = self.inner.sync_state.lock();
                refresh_counters(&mut state, &queue, &conflicts);
                self.write_sync_state(&state)?;
            }
            outcome
        };

        if outcome.applied {
            self.emit(Event::ConflictResolved {
                id: id.clone(),
                resolution,
                resolved_by,
            })
            .await;
            for cancelled in &outcome.cancelled {
                self.emit(Event::OperationCancelled {
                    id: cancelled.clone(),
                    reason: format!("conflict {id} resolved with {resolution}"),
                })
                .await;
            }
        }
        Ok(outcome)
    }

    fn schedule_auto_resolve(&self, id: ConflictId, resolution: Resolution) {
        let service = self.clone();
        let delay = self.inner.config.auto_resolve_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = service
                .resolve_conflict(&id, resolution, ResolvedBy::System)
                .await
            {
                tracing::warn!(conflict = %id, error = %e, "auto-resolve failed");
            }
        });
    }

    // ── Maintenance ─────────────────────────────────────────────────────

    /// Drop terminal operations and resolved conflicts older than
    /// `hours`. Pending, in-progress, and retry-eligible work is kept.
    pub async fn cleanup_old(&self, hours: u64) -> Result<CleanupReport, EngineError> {
        let result = self.cleanup_old_inner(hours).await;
        self.report_if_err(result).await
    }

    async fn cleanup_old_inner(&self, hours: u64) -> Result<CleanupReport, EngineError> {
        let now = self.inner.clock.now_utc();
        let max_age = Duration::from_secs(hours.saturating_mul(3600));
        let report = {
            let mut queue = self.inner.queue.lock();
            let mut conflicts = self.inner.conflicts.lock();
            let report = CleanupReport {
                operations_removed: queue.cleanup(max_age, now),
                conflicts_removed: conflicts.cleanup(hours, now),
            };
            self.persist_queue_locked(&mut queue, &conflicts)?;
            let mut state = self.inner.sync_state.lock();
            refresh_counters(&mut state, &queue, &conflicts);
            self.write_sync_state(&state)?;
            report
        };
        tracing::info!(
            operations = report.operations_removed,
            conflicts = report.conflicts_removed,
            "cleanup finished"
        );
        Ok(report)
    }

    /// Enqueue a server heartbeat. Its completion marks the server online
    /// and stamps `last_sync`.
    pub async fn heartbeat(
        &self,
        server_version: &str,
        editor_version: &str,
        workspace: &str,
    ) -> Result<OperationId, EngineError> {
        let op = Operation::new(
            OperationPayload::Heartbeat(sf_core::params::HeartbeatParams {
                server_version: Some(server_version.to_string()),
                editor_version: Some(editor_version.to_string()),
                workspace: Some(workspace.to_string()),
            }),
            OperationSource::Server,
            &self.inner.clock,
        )
        .priority(Priority::Low);
        self.queue(op).await
    }

    /// Record a specification change reported by the editor side. The
    /// per-spec version increments monotonically for every change kind.
    pub async fn notify_spec_change(
        &self,
        spec_id: &str,
        change: SpecChangeKind,
    ) -> Result<u64, EngineError> {
        let result = self.notify_spec_change_inner(spec_id, change).await;
        self.report_if_err(result).await
    }

    async fn notify_spec_change_inner(
        &self,
        spec_id: &str,
        change: SpecChangeKind,
    ) -> Result<u64, EngineError> {
        let now = self.inner.clock.now_utc();
        let version = {
            let mut state = self.inner.sync_state.lock();
            let version = state.bump_spec(spec_id, now);
            self.write_sync_state(&state)?;
            version
        };
        self.emit(Event::SpecChanged {
            spec_id: spec_id.to_string(),
            change,
            version,
        })
        .await;
        Ok(version)
    }

    /// Mark the extension offline and persist. No locks survive a call
    /// boundary, so there is nothing else to release.
    pub async fn dispose(&self) -> Result<(), EngineError> {
        {
            let mut state = self.inner.sync_state.lock();
            state.extension_online = false;
            self.write_sync_state(&state)?;
        }
        tracing::info!(workspace = %self.inner.workspace.display(), "sync service disposed");
        Ok(())
    }

    // ── Results ledger ──────────────────────────────────────────────────

    /// The current results ledger (empty if none exists yet).
    pub fn results(&self) -> Result<ResultsLedger, EngineError> {
        let path = self.results_path();
        match self.inner.store.read::<ResultsLedger>(&path) {
            Ok(ledger) => Ok(ledger),
            Err(StoreError::FileNotFound { .. }) => {
                Ok(ResultsLedger::empty(self.inner.clock.now_utc()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn record_result_entry(&self, result: OperationResult) -> Result<(), EngineError> {
        let path = self.results_path();
        let now = self.inner.clock.now_utc();
        let mut ledger = match self.inner.store.read::<ResultsLedger>(&path) {
            Ok(ledger) => ledger,
            Err(StoreError::FileNotFound { .. }) => ResultsLedger::empty(now),
            Err(e @ (StoreError::JsonParse { .. } | StoreError::CorruptedData { .. })) => {
                tracing::warn!(error = %e, "results ledger unreadable, starting fresh");
                ResultsLedger::empty(now)
            }
            Err(e) => return Err(e.into()),
        };
        ledger.push(result, now);
        self.inner.store.write(&path, &ledger)?;
        Ok(())
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    pub fn sync_state_snapshot(&self) -> SyncState {
        self.inner.sync_state.lock().clone()
    }

    pub fn queue_snapshot(&self) -> OperationQueue {
        let queue = self.inner.queue.lock();
        let conflicts = self.inner.conflicts.lock();
        queue.to_document(conflicts.table())
    }

    pub fn queue_version(&self) -> u64 {
        self.inner.queue.lock().version()
    }

    pub fn conflict(&self, id: &ConflictId) -> Option<Conflict> {
        self.inner.conflicts.lock().get(id).cloned()
    }

    pub fn unresolved_conflicts(&self) -> Vec<Conflict> {
        self.inner.conflicts.lock().unresolved().cloned().collect()
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn queue_path(&self) -> PathBuf {
        self.inner.workspace.join(QUEUE_FILE)
    }

    fn sync_state_path(&self) -> PathBuf {
        self.inner.workspace.join(SYNC_STATE_FILE)
    }

    fn results_path(&self) -> PathBuf {
        self.inner.workspace.join(RESULTS_FILE)
    }

    /// Bump the version and write the queue document. Caller holds the
    /// queue and conflict locks.
    fn persist_queue_locked(
        &self,
        queue: &mut Queue,
        conflicts: &ConflictEngine,
    ) -> Result<(), EngineError> {
        queue.bump_version(self.inner.clock.now_utc());
        let doc = queue.to_document(conflicts.table());
        self.inner.store.write(&self.queue_path(), &doc)?;
        Ok(())
    }

    fn persist_queue(&self) -> Result<(), EngineError> {
        let mut queue = self.inner.queue.lock();
        let conflicts = self.inner.conflicts.lock();
        self.persist_queue_locked(&mut queue, &conflicts)
    }

    fn write_sync_state(&self, state: &SyncState) -> Result<(), EngineError> {
        self.inner.store.write(&self.sync_state_path(), state)?;
        Ok(())
    }

    /// Refresh counters from the live queue and persist the sync state.
    fn persist_state(&self) -> Result<(), EngineError> {
        let queue = self.inner.queue.lock();
        let conflicts = self.inner.conflicts.lock();
        let mut state = self.inner.sync_state.lock();
        refresh_counters(&mut state, &queue, &conflicts);
        self.write_sync_state(&state)
    }

    async fn emit(&self, event: Event) {
        tracing::info!("{}", event.log_summary());
        self.inner.sink.emit(event).await;
    }

    /// Record a failed public call in the sync-error ring and announce it,
    /// then hand the error back.
    async fn report_if_err<T>(&self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if let Err(e) = &result {
            let record = SyncErrorRecord {
                timestamp: self.inner.clock.now_utc(),
                kind: e.kind_tag().to_string(),
                message: e.to_string(),
                recoverable: e.recoverable(),
            };
            {
                let mut state = self.inner.sync_state.lock();
                state.record_error(record);
                // Best effort; the original error is what the caller needs.
                if let Err(persist_err) = self.write_sync_state(&state) {
                    tracing::warn!(error = %persist_err, "failed to persist sync error record");
                }
            }
            self.emit(Event::SyncError {
                kind: e.kind_tag().to_string(),
                message: e.to_string(),
                recoverable: e.recoverable(),
            })
            .await;
        }
        result
    }
}

fn refresh_counters(state: &mut SyncState, queue: &Queue, conflicts: &ConflictEngine) {
    let counts = queue.status_counts();
    state.pending_operations = counts.pending;
    state.in_progress_operations = counts.in_progress;
    state.failed_operations = counts.failed;
    state.completed_operations = counts.completed;
    state.active_conflicts = conflicts.active_count();
}

/// Load a document, synthesising a default when it is missing and falling
/// back (with a warning) when it is unreadable.
fn load_or_default<T, C>(
    store: &AtomicStore<C>,
    path: &Path,
    warnings: &mut Vec<String>,
    default: impl FnOnce() -> T,
) -> Result<T, EngineError>
where
    T: serde::de::DeserializeOwned,
    C: Clock,
{
    match store.read::<T>(path) {
        Ok(value) => Ok(value),
        Err(StoreError::FileNotFound { .. }) => Ok(default()),
        Err(e @ (StoreError::JsonParse { .. } | StoreError::CorruptedData { .. })) => {
            tracing::warn!(path = %path.display(), error = %e, "state file unreadable, starting fresh");
            warnings.push(format!(
                "{} was unreadable and has been reset: {e}",
                path.file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("state file")
            ));
            Ok(default())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
