// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The read layer: one explicit instance wiring cache, scheduler, optimizer
//! and metrics together.
//!
//! ```text
//!   consumer ──► FetchScheduler ──► TtlCache ── hit ──► value
//!                     │ miss
//!                     ▼
//!               fetch fn (often a QueryOptimizer read) ──► DocumentStore
//!                     │
//!                     └──► ReadMetrics at every step
//! ```
//!
//! # Example
//!
//! ```
//! use read_layer::{ReadLayer, ReadLayerConfig, LayerState};
//! use read_layer::store::InMemoryStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let layer = ReadLayer::new(ReadLayerConfig::default(), Arc::new(InMemoryStore::new()));
//! assert_eq!(layer.state(), LayerState::Created);
//!
//! layer.start();
//! assert_eq!(layer.state(), LayerState::Running);
//!
//! let summary = layer.shutdown();
//! assert_eq!(summary.total_reads, 0);
//! assert_eq!(layer.state(), LayerState::Stopped);
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::cache::TypedKey;
use crate::collector::{MetricsSummary, ReadMetrics};
use crate::config::ReadLayerConfig;
use crate::query::QueryOptimizer;
use crate::scheduler::{FetchScheduler, LazyData, RequestOptions};
use crate::store::{DocumentStore, StoreError};

/// Lifecycle of a [`ReadLayer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    /// Built, background tasks not started
    Created,
    /// Sweepers (and the reporter, if configured) are running
    Running,
    /// Shut down; caches destroyed
    Stopped,
}

impl fmt::Display for LayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Cache, scheduler, optimizer and metrics for one session
pub struct ReadLayer {
    config: ReadLayerConfig,
    metrics: Arc<ReadMetrics>,
    scheduler: FetchScheduler,
    optimizer: QueryOptimizer,
    state: watch::Sender<LayerState>,
}

impl ReadLayer {
    pub fn new(config: ReadLayerConfig, store: Arc<dyn DocumentStore>) -> Self {
        let metrics = Arc::new(ReadMetrics::new(config.cost_per_100k_reads));
        let scheduler = FetchScheduler::new(config.scheduler(), metrics.clone());
        let optimizer = QueryOptimizer::new(config.optimizer(), store, metrics.clone());
        let (state, _) = watch::channel(LayerState::Created);

        Self {
            config,
            metrics,
            scheduler,
            optimizer,
            state,
        }
    }

    pub fn config(&self) -> &ReadLayerConfig {
        &self.config
    }

    pub fn state(&self) -> LayerState {
        *self.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<LayerState> {
        self.state.subscribe()
    }

    pub fn metrics(&self) -> &Arc<ReadMetrics> {
        &self.metrics
    }

    pub fn scheduler(&self) -> &FetchScheduler {
        &self.scheduler
    }

    pub fn optimizer(&self) -> &QueryOptimizer {
        &self.optimizer
    }

    /// Start cache sweepers and the periodic report. Must run inside a tokio runtime.
    ///
    /// Calling it again while running is a no-op.
    pub fn start(&self) {
        if self.state() == LayerState::Running {
            return;
        }
        let every = self.config.cleanup_interval();
        self.scheduler.start_sweeper(every);
        self.optimizer.start_sweepers(every);
        self.metrics.start_reporter(self.config.report_interval());

        info!(
            cleanup_secs = every.as_secs(),
            report_secs = self.config.report_interval_secs,
            "Read layer started"
        );
        let _ = self.state.send(LayerState::Running);
    }

    /// Stop background tasks, destroy caches and return the final summary.
    pub fn shutdown(&self) -> MetricsSummary {
        self.metrics.stop_reporter();
        self.scheduler.destroy();
        self.optimizer.destroy();
        let summary = self.metrics.report();
        let _ = self.state.send(LayerState::Stopped);
        info!("Read layer stopped");
        summary
    }

    /// Drop every cached value, in the scheduler and the optimizer, whose key matches `pattern`.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        self.scheduler.invalidate_pattern(pattern) + self.optimizer.invalidate_pattern(pattern)
    }

    /// Lazily loaded view of `key` for one consumer.
    pub fn lazy<V, F, Fut>(&self, key: TypedKey<V>, fetch: F, options: RequestOptions) -> LazyData<V>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, StoreError>> + Send + 'static,
    {
        LazyData::spawn(&self.scheduler, key, fetch, options)
    }
}
