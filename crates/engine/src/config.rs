// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.

use sf_core::RetryPolicy;
use sf_store::{LockConfig, StoreConfig};
use std::time::Duration;

/// Queue limits and processing cadence.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Hard cap on queue length; enqueue past it fails with `queue_full`.
    pub max_queue_size: usize,
    /// Most operations one `process()` call will run.
    pub max_batch_size: usize,
    /// How often the consumer is expected to call `process()`.
    pub processing_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            max_batch_size: 50,
            processing_interval: Duration::from_secs(2),
        }
    }
}

impl QueueConfig {
    sf_core::setters! {
        set {
            max_queue_size: usize,
            max_batch_size: usize,
            processing_interval: Duration,
        }
    }
}

/// Everything the sync service needs to run over one workspace.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub queue: QueueConfig,
    pub store: StoreConfig,
    pub lock: LockConfig,
    pub retry: RetryPolicy,
    /// Delay before the background resolver applies a default resolution.
    pub auto_resolve_delay: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            store: StoreConfig::default(),
            lock: LockConfig::default(),
            retry: RetryPolicy::default(),
            auto_resolve_delay: Duration::from_millis(100),
        }
    }
}

impl ServiceConfig {
    sf_core::setters! {
        set {
            queue: QueueConfig,
            store: StoreConfig,
            lock: LockConfig,
            retry: RetryPolicy,
            auto_resolve_delay: Duration,
        }
    }
}
