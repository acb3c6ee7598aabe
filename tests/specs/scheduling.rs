// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority ordering and retry timing, end to end.

use super::common::*;
use chrono::Duration as ChronoDuration;
use sf_core::test_support::*;
use sf_core::{Clock, OperationStatus, Priority};
use std::time::Duration;

#[tokio::test]
async fn processing_follows_priority_regardless_of_insertion_order() {
    let h = harness().await;

    // Three creates at t, t+1, t+2 with ascending priority; descriptions
    // are dissimilar so no duplicate conflict muddies the scenario.
    let low = named_spec_op(
        &h.clock,
        "notifications",
        "long backlog item about delivery of email digests",
        Priority::Low,
    );
    h.clock.advance(Duration::from_secs(1));
    let high = named_spec_op(&h.clock, "zz9", "terse", Priority::High);
    h.clock.advance(Duration::from_secs(1));
    let urgent = named_spec_op(
        &h.clock,
        "incident-hotfix",
        "patch for the outage in the billing export pipeline",
        Priority::Urgent,
    );

    let low_id = low.id.clone();
    let high_id = high.id.clone();
    let urgent_id = urgent.id.clone();

    // Inserted lowest-priority first.
    h.service.queue(low).await.unwrap();
    h.service.queue(high).await.unwrap();
    h.service.queue(urgent).await.unwrap();

    let report = h.service.process().await.unwrap();
    assert_eq!(report.succeeded, 3);
    assert_eq!(h.handler.calls(), vec![urgent_id, high_id, low_id]);
}

#[tokio::test]
async fn retry_with_backoff_completes_on_third_attempt() {
    let h = harness().await;
    h.handler.fail_times(2, "transient backend failure");

    let mut op = editor_op(create_spec_payload("auth"));
    op.max_retries = 2;
    let id = h.service.queue(op).await.unwrap();

    // Attempt 1 fails; delay floor for attempt 0 is 1 s.
    h.service.process().await.unwrap();
    let first_retry_at = {
        let snapshot = h.service.queue_snapshot();
        let op = snapshot.get(&id).unwrap();
        assert_eq!(op.status, OperationStatus::Failed);
        assert_eq!(op.retry_count, 1);
        let retry_at = op.next_retry_at.unwrap();
        let delay = retry_at - op.completed_at.unwrap();
        assert!(delay >= ChronoDuration::seconds(1));
        assert!(delay < ChronoDuration::seconds(30));
        retry_at
    };

    // Attempt 2 fails; delay floor for attempt 1 is 2 s.
    h.clock.advance(Duration::from_secs(3));
    h.service.process().await.unwrap();
    {
        let snapshot = h.service.queue_snapshot();
        let op = snapshot.get(&id).unwrap();
        assert_eq!(op.status, OperationStatus::Failed);
        assert_eq!(op.retry_count, 2);
        let retry_at = op.next_retry_at.unwrap();
        assert!(retry_at > first_retry_at);
        let delay = retry_at - op.completed_at.unwrap();
        assert!(delay >= ChronoDuration::seconds(2));
        assert!(delay < ChronoDuration::seconds(30));
    }

    // Attempt 3 succeeds.
    h.clock.advance(Duration::from_secs(5));
    let report = h.service.process().await.unwrap();
    assert_eq!(report.succeeded, 1);

    let snapshot = h.service.queue_snapshot();
    let op = snapshot.get(&id).unwrap();
    assert_eq!(op.status, OperationStatus::Completed);
    assert_eq!(op.retry_count, 2);
    assert_eq!(h.handler.calls().len(), 3);
}

#[tokio::test]
async fn batch_budget_caps_one_processing_pass() {
    let config = sf_engine::ServiceConfig::default()
        .queue(sf_engine::QueueConfig::default().max_batch_size(2));
    let h = harness_with_config(config).await;

    for payload in [
        sync_status_payload(),
        heartbeat_payload("0.9.1"),
        update_requirements_payload("s-alone", "# only one of its kind"),
    ] {
        let mut op = editor_op(payload);
        op.timestamp = h.clock.now_utc();
        h.service.queue(op).await.unwrap();
        h.clock.advance(Duration::from_secs(90));
    }

    let report = h.service.process().await.unwrap();
    assert_eq!(report.processed, 2);
    let report = h.service.process().await.unwrap();
    assert_eq!(report.processed, 1);
}

#[tokio::test]
async fn dependencies_gate_processing_order() {
    let h = harness().await;

    let base = editor_op(update_requirements_payload("s-base", "# base requirements"));
    let base_id = base.id.clone();
    h.service.queue(base).await.unwrap();

    let mut dependent = editor_op(sync_status_payload());
    dependent.priority = Priority::Urgent;
    dependent.dependencies = vec![base_id.clone()];
    let dependent_id = dependent.id.clone();
    h.service.queue(dependent).await.unwrap();

    h.service.process().await.unwrap();
    // Despite lower priority, the dependency ran first.
    assert_eq!(h.handler.calls(), vec![base_id, dependent_id]);
}
