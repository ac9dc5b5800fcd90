// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry policy with exponential backoff.
//!
//! The scheduler does not loop on a failing fetch. It asks the policy whether
//! another attempt is allowed and how long to back off, then re-enqueues the
//! task.
//!
//! # Example
//!
//! ```
//! use read_layer::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::query();
//! assert_eq!(policy.max_retries, 3);
//!
//! // retry_delay * 2^retry_count, capped at max_delay
//! assert_eq!(policy.delay_for(0), Duration::from_secs(1));
//! assert_eq!(policy.delay_for(1), Duration::from_secs(2));
//! assert_eq!(policy.delay_for(2), Duration::from_secs(4));
//!
//! assert_eq!(policy.delay_for(20), policy.max_delay);
//!
//! assert!(policy.should_retry(2));
//! assert!(!policy.should_retry(3));
//! ```

use std::time::Duration;

/// Retry behavior for failed fetches.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt (total attempts = max + 1)
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier applied per retry
    pub factor: f64,
    /// Upper bound on any single backoff
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::query()
    }
}

impl RetryPolicy {
    /// Dashboard reads: 3 retries at 1s, 2s, 4s.
    #[must_use]
    pub fn query() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Never retry. Useful for reads whose caller has its own fallback.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            factor: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[must_use]
    pub fn test() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            factor: 2.0,
            max_delay: Duration::from_millis(10),
        }
    }

    /// Whether a task that has already been retried `retry_count` times may run again.
    #[must_use]
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Backoff before the retry that follows `retry_count` previous retries,
    /// capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_exponential_backoff() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            factor: 2.0,
            max_delay: Duration::from_secs(1),
        };

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_secs(1));
    }

    #[test]
    fn test_delay_capped_at_huge_retry_counts() {
        let policy = RetryPolicy {
            max_retries: 100,
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
        };

        assert_eq!(policy.delay_for(64), Duration::from_secs(30));
        assert_eq!(policy.delay_for(2000), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_should_retry_boundary() {
        let policy = RetryPolicy::test();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(10));
    }

    #[test]
    fn test_none_never_retries() {
        let policy = RetryPolicy::none();
        assert!(!policy.should_retry(0));
        assert_eq!(policy.delay_for(0), Duration::ZERO);
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryPolicy::default(), RetryPolicy::query());
        assert_eq!(RetryPolicy::test().max_retries, 3);
        assert!(RetryPolicy::test().base_delay < RetryPolicy::query().base_delay);
    }
}
