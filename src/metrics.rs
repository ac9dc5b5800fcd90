// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the read layer.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//! The in-process session summary lives in [`crate::collector`].
//!
//! # Metric Naming Convention
//! - `read_layer_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `cache`: entities, batch, stats, prefetch
//! - `operation`: page, batch, stats, prefetch (remote reads); page,
//!   batch-query, aggregated-stats, prefetch, scheduler (documents read)
//! - `priority`: high, normal, low

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a cache lookup outcome
pub fn record_cache_lookup(cache: &'static str, hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    counter!(
        "read_layer_cache_lookups_total",
        "cache" => cache,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record entries removed by pattern invalidation
pub fn record_cache_invalidation(cache: &'static str, removed: usize) {
    counter!(
        "read_layer_cache_invalidated_total",
        "cache" => cache
    )
    .increment(removed as u64);
}

/// Set current cache entry count
pub fn set_cache_entries(cache: &'static str, count: usize) {
    gauge!(
        "read_layer_cache_entries",
        "cache" => cache
    )
    .set(count as f64);
}

/// Record documents read from the remote store
pub fn record_documents_read(operation: &str, count: usize) {
    counter!(
        "read_layer_documents_read_total",
        "operation" => operation.to_string()
    )
    .increment(count as u64);
}

/// Record one remote read request (independent of how many documents it returned)
pub fn record_remote_read(operation: &'static str, status: &'static str) {
    counter!(
        "read_layer_remote_reads_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// Record remote read latency
pub fn record_latency(operation: &'static str, duration: Duration) {
    histogram!(
        "read_layer_remote_read_seconds",
        "operation" => operation
    )
    .record(duration.as_secs_f64());
}

/// Record a debounced (skipped) read
pub fn record_debounce(scope: &str) {
    counter!(
        "read_layer_debounce_events_total",
        "scope" => scope.to_string()
    )
    .increment(1);
}

/// Record a scheduler task transition (queued, started, succeeded, retried, failed, joined)
pub fn record_task_event(event: &'static str, priority: &'static str) {
    counter!(
        "read_layer_tasks_total",
        "event" => event,
        "priority" => priority
    )
    .increment(1);
}

/// Set scheduler occupancy
pub fn set_scheduler_load(running: usize, queued: usize) {
    gauge!("read_layer_tasks_running").set(running as f64);
    gauge!("read_layer_tasks_queued").set(queued as f64);
}

/// Record a prefetch outcome (completed, failed, skipped)
pub fn record_prefetch(outcome: &'static str) {
    counter!(
        "read_layer_prefetch_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Set the estimated read cost of the current session (USD)
pub fn set_estimated_cost(usd: f64) {
    gauge!("read_layer_estimated_cost_usd").set(usd);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}
