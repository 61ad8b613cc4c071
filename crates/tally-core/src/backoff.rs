// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Explicit retry/backoff policy.
//!
//! One policy value covers every place the coordination layer retries or
//! re-polls: the job client's empty-queue pull backoff and its metadata
//! lookup ladder. Backends take their cadence from configuration rather
//! than hidden driver defaults.

use std::time::Duration;

use rand::Rng;

/// Bounded retries with exponential delay and random jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts allowed before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each subsequent attempt.
    pub base_delay: Duration,
    /// Upper bound of uniform random noise added to each delay.
    pub jitter: Duration,
}

impl BackoffPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration, jitter: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            jitter,
        }
    }

    /// Delay before the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // Cap the exponent so a large attempt count cannot overflow.
        let delay = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        if self.jitter.is_zero() {
            return delay;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        delay + Duration::from_millis(jitter_ms)
    }

    /// Whether the given zero-based attempt is past the budget.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}
