// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry timing: exponential backoff with jitter, capped.

use rand::Rng;
use std::time::Duration;

/// Backoff policy for failed operations.
///
/// `delay(attempt) = min(base * 2^attempt + U(0, jitter * base * 2^attempt), max)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Jitter fraction of the exponential term, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    crate::setters! {
        set {
            base: Duration,
            max: Duration,
            jitter: f64,
        }
    }

    /// Delay before the attempt numbered `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    /// Deterministic variant for tests.
    pub fn delay_with_rng(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let exp_ms = (self.base.as_millis() as u64).saturating_mul(1u64 << attempt.min(32));
        let jitter_ms = if self.jitter > 0.0 {
            rng.gen_range(0.0..=self.jitter.max(0.0)) * exp_ms as f64
        } else {
            0.0
        };
        let total = Duration::from_millis(exp_ms.saturating_add(jitter_ms as u64));
        total.min(self.max)
    }

    /// The deterministic floor of `delay(attempt)` (no jitter, capped).
    pub fn min_delay(&self, attempt: u32) -> Duration {
        let exp_ms = (self.base.as_millis() as u64).saturating_mul(1u64 << attempt.min(32));
        Duration::from_millis(exp_ms).min(self.max)
    }

    /// Whether another attempt fits in the retry budget.
    pub fn should_retry(&self, retry_count: u32, max_retries: u32) -> bool {
        retry_count < max_retries
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
