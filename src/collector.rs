// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Session read metrics.
//!
//! [`ReadMetrics`] counts remote document reads, cache hits and debounced
//! requests for one session and turns them into a summary (hit rate,
//! operations per second, estimated billing cost). It observes the other
//! components and never changes their behavior.
//!
//! # Example
//!
//! ```
//! use read_layer::ReadMetrics;
//!
//! let metrics = ReadMetrics::new(0.06);
//! metrics.log_read("page", 9);
//! metrics.log_cache_hit("page", "payments:company_1");
//! metrics.log_cache_hit("page", "payments:company_1");
//! metrics.log_read("stats", 1);
//!
//! let summary = metrics.summary();
//! assert_eq!(summary.total_reads, 10);
//! assert_eq!(summary.cache_hits, 2);
//! assert_eq!(summary.total_operations, 4);
//! assert!((summary.hit_rate - 0.5).abs() < f64::EPSILON);
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Point-in-time view of the session counters
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub session_duration: Duration,
    /// Documents read from the remote store
    pub total_reads: u64,
    pub cache_hits: u64,
    pub debounce_events: u64,
    /// Read operations plus cache hits
    pub total_operations: u64,
    /// cache_hits / total_operations (0.0 - 1.0)
    pub hit_rate: f64,
    pub operations_per_second: f64,
    /// total_reads priced at the configured per-100k rate
    pub estimated_cost_usd: f64,
    /// What the cache hits would have cost as reads
    pub estimated_savings_usd: f64,
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "duration={:.1}s reads={} cache_hits={} hit_rate={:.1}% debounced={} ops/s={:.2} cost=${:.6}",
            self.session_duration.as_secs_f64(),
            self.total_reads,
            self.cache_hits,
            self.hit_rate * 100.0,
            self.debounce_events,
            self.operations_per_second,
            self.estimated_cost_usd,
        )
    }
}

/// Process-wide read counters for one session
pub struct ReadMetrics {
    started_at: Mutex<Instant>,
    reads: AtomicU64,
    cache_hits: AtomicU64,
    operations: AtomicU64,
    debounce_events: AtomicU64,
    cost_per_100k_reads: f64,
    reporter: Mutex<Option<JoinHandle<()>>>,
}

impl ReadMetrics {
    pub fn new(cost_per_100k_reads: f64) -> Self {
        Self {
            started_at: Mutex::new(Instant::now()),
            reads: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            operations: AtomicU64::new(0),
            debounce_events: AtomicU64::new(0),
            cost_per_100k_reads,
            reporter: Mutex::new(None),
        }
    }

    /// Record `count` documents read by one remote operation.
    pub fn log_read(&self, operation: &str, count: usize) {
        let total = self.reads.fetch_add(count as u64, Ordering::Relaxed) + count as u64;
        self.operations.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_documents_read(operation, count);
        crate::metrics::set_estimated_cost(self.cost_of(total));
        debug!(operation, count, total_reads = total, "Remote read");
    }

    /// Record a read served from cache.
    pub fn log_cache_hit(&self, scope: &str, key: &str) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.operations.fetch_add(1, Ordering::Relaxed);
        debug!(scope, key, "Cache hit");
    }

    /// Record a request that was coalesced away before reaching the store.
    pub fn log_debounce_event(&self, scope: &str) {
        self.debounce_events.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_debounce(scope);
        debug!(scope, "Debounced read");
    }

    pub fn summary(&self) -> MetricsSummary {
        let session_duration = self.started_at.lock().elapsed();
        let total_reads = self.reads.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let total_operations = self.operations.load(Ordering::Relaxed);
        let secs = session_duration.as_secs_f64();

        MetricsSummary {
            session_duration,
            total_reads,
            cache_hits,
            debounce_events: self.debounce_events.load(Ordering::Relaxed),
            total_operations,
            hit_rate: if total_operations > 0 {
                cache_hits as f64 / total_operations as f64
            } else {
                0.0
            },
            operations_per_second: if secs > 0.0 {
                total_operations as f64 / secs
            } else {
                0.0
            },
            estimated_cost_usd: self.cost_of(total_reads),
            estimated_savings_usd: self.cost_of(cache_hits),
        }
    }

    /// Log the current summary at info level.
    pub fn report(&self) -> MetricsSummary {
        let summary = self.summary();
        info!(%summary, "Read layer session report");
        summary
    }

    /// Zero all counters and restart the session clock.
    pub fn reset(&self) {
        *self.started_at.lock() = Instant::now();
        self.reads.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.operations.store(0, Ordering::Relaxed);
        self.debounce_events.store(0, Ordering::Relaxed);
    }

    /// Log a report every `every`. A zero interval disables reporting.
    pub fn start_reporter(self: &Arc<Self>, every: Duration) {
        if every.is_zero() {
            return;
        }

        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(metrics) = weak.upgrade() else {
                    break;
                };
                metrics.report();
            }
        });

        if let Some(previous) = self.reporter.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_reporter(&self) {
        if let Some(handle) = self.reporter.lock().take() {
            handle.abort();
        }
    }

    fn cost_of(&self, reads: u64) -> f64 {
        reads as f64 / 100_000.0 * self.cost_per_100k_reads
    }
}

impl Default for ReadMetrics {
    fn default() -> Self {
        Self::new(0.06)
    }
}

impl Drop for ReadMetrics {
    fn drop(&mut self) {
        if let Some(handle) = self.reporter.get_mut().take() {
            handle.abort();
        }
    }
}
