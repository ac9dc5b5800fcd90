// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the read layer.
//!
//! # Example
//!
//! ```
//! use read_layer::ReadLayerConfig;
//!
//! // Minimal config (uses defaults)
//! let config = ReadLayerConfig::default();
//! assert_eq!(config.max_concurrent, 3);
//! assert_eq!(config.batch_size, 10);
//!
//! // Tuned config
//! let config = ReadLayerConfig {
//!     max_concurrent: 6,
//!     retry_delay_ms: 250,
//!     ..Default::default()
//! };
//! assert_eq!(config.scheduler().max_concurrent, 6);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::query::OptimizerConfig;
use crate::resilience::retry::RetryPolicy;
use crate::scheduler::SchedulerConfig;

/// Configuration for the read layer.
///
/// All fields have sensible defaults matching a dashboard that reads from a
/// metered document store (5 minute entity TTL, 3 concurrent fetches).
#[derive(Debug, Clone, Deserialize)]
pub struct ReadLayerConfig {
    /// Default TTL for cached entities in milliseconds (default: 5 minutes)
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Expired-entry sweep interval in seconds (default: 2 minutes)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Scheduler settings
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Cap on a single retry backoff in milliseconds (default: 30 seconds)
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Largest identifier set a single "IN" read may carry
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// TTL for merged identifier-batch results (default: 2 minutes)
    #[serde(default = "default_batch_ttl_ms")]
    pub batch_ttl_ms: u64,

    /// Aggregate statistics settings
    #[serde(default = "default_stats_ttl_ms")]
    pub stats_ttl_ms: u64,
    #[serde(default = "default_stats_page_size")]
    pub stats_page_size: usize,
    #[serde(default = "default_due_soon_days")]
    pub due_soon_days: i64,

    /// Next-year prefetch settings
    #[serde(default = "default_prefetch_page_size")]
    pub prefetch_page_size: usize,
    #[serde(default = "default_prefetch_ttl_ms")]
    pub prefetch_ttl_ms: u64,

    /// Billing rate used for the cost estimate (USD per 100k document reads)
    #[serde(default = "default_cost_per_100k_reads")]
    pub cost_per_100k_reads: f64,

    /// Periodic metrics report interval in seconds (0 = disabled)
    #[serde(default)]
    pub report_interval_secs: u64,
}

fn default_ttl_ms() -> u64 { 5 * 60 * 1000 }
fn default_cleanup_interval_secs() -> u64 { 120 }
fn default_max_concurrent() -> usize { 3 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 1000 }
fn default_max_retry_delay_ms() -> u64 { 30_000 }
fn default_batch_size() -> usize { 10 }
fn default_batch_ttl_ms() -> u64 { 2 * 60 * 1000 }
fn default_stats_ttl_ms() -> u64 { 5 * 60 * 1000 }
fn default_stats_page_size() -> usize { 1000 }
fn default_due_soon_days() -> i64 { 3 }
fn default_prefetch_page_size() -> usize { 5 }
fn default_prefetch_ttl_ms() -> u64 { 10 * 60 * 1000 }
fn default_cost_per_100k_reads() -> f64 { 0.06 }

impl Default for ReadLayerConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_ttl_ms(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            batch_size: default_batch_size(),
            batch_ttl_ms: default_batch_ttl_ms(),
            stats_ttl_ms: default_stats_ttl_ms(),
            stats_page_size: default_stats_page_size(),
            due_soon_days: default_due_soon_days(),
            prefetch_page_size: default_prefetch_page_size(),
            prefetch_ttl_ms: default_prefetch_ttl_ms(),
            cost_per_100k_reads: default_cost_per_100k_reads(),
            report_interval_secs: 0,
        }
    }
}

impl ReadLayerConfig {
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Interval of the periodic metrics report; zero when disabled.
    #[must_use]
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    /// Scheduler view of this config.
    #[must_use]
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent: self.max_concurrent.max(1),
            default_ttl: self.default_ttl(),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: Duration::from_millis(self.retry_delay_ms),
                factor: 2.0,
                max_delay: Duration::from_millis(self.max_retry_delay_ms),
            },
        }
    }

    /// Optimizer view of this config.
    #[must_use]
    pub fn optimizer(&self) -> OptimizerConfig {
        OptimizerConfig {
            batch_size: self.batch_size.max(1),
            batch_ttl: Duration::from_millis(self.batch_ttl_ms),
            stats_ttl: Duration::from_millis(self.stats_ttl_ms),
            stats_page_size: self.stats_page_size,
            due_soon_days: self.due_soon_days,
            prefetch_page_size: self.prefetch_page_size,
            prefetch_ttl: Duration::from_millis(self.prefetch_ttl_ms),
        }
    }
}
