// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query optimizer.
//!
//! Turns declared [`Filters`] into the cheapest reads the store can serve:
//!
//! ```text
//!   Filters ──► QueryShape ──► ReadRequest (narrowest index, limit, cursor)
//!
//!   ids[25] ──► dedupe + sort ──► [10] [10] [5] ──► JoinSet ──► merge ──► cache
//!                                   │    │    │
//!                                   ▼    ▼    ▼
//!                              one IN read per batch, concurrently
//! ```
//!
//! Aggregate statistics come from a single bounded read reduced client-side.
//! Near the end of a year, a fire-and-forget read warms the first page of the
//! next year.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::request::{Cursor, ReadRequest};
use super::shape::{Filters, Pagination, QueryShape};
use super::stats::AggregatedStats;
use crate::cache::TtlCache;
use crate::collector::ReadMetrics;
use crate::document::Commitment;
use crate::metrics::{self, LatencyTimer};
use crate::store::{DocumentStore, StoreError};

/// Collection holding commitment documents
pub const COLLECTION: &str = "commitments";

/// First month (one-indexed) in which next-year prefetch kicks in
const PREFETCH_FROM_MONTH: u32 = 11;

/// Optimizer tuning, derived from [`crate::ReadLayerConfig::optimizer`]
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Largest membership set per read
    pub batch_size: usize,
    pub batch_ttl: Duration,
    pub stats_ttl: Duration,
    /// Read cap for whole-set reads (stats and identifier batches)
    pub stats_page_size: usize,
    pub due_soon_days: i64,
    pub prefetch_page_size: usize,
    pub prefetch_ttl: Duration,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_ttl: Duration::from_secs(120),
            stats_ttl: Duration::from_secs(300),
            stats_page_size: 1000,
            due_soon_days: 3,
            prefetch_page_size: 5,
            prefetch_ttl: Duration::from_secs(600),
        }
    }
}

/// One page of results and where the next one starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub records: Vec<Commitment>,
    /// Set when the read came back full; `None` means this was the last page
    pub next_cursor: Option<Cursor>,
}

/// Builds and runs reduced-cost reads against a [`DocumentStore`].
#[derive(Clone)]
pub struct QueryOptimizer {
    config: OptimizerConfig,
    store: Arc<dyn DocumentStore>,
    metrics: Arc<ReadMetrics>,
    batches: Arc<TtlCache<Vec<Commitment>>>,
    stats: Arc<TtlCache<AggregatedStats>>,
    prefetched: Arc<TtlCache<Vec<Commitment>>>,
}

impl QueryOptimizer {
    pub fn new(
        config: OptimizerConfig,
        store: Arc<dyn DocumentStore>,
        metrics: Arc<ReadMetrics>,
    ) -> Self {
        Self {
            batches: Arc::new(TtlCache::new("batch", config.batch_ttl)),
            stats: Arc::new(TtlCache::new("stats", config.stats_ttl)),
            prefetched: Arc::new(TtlCache::new("prefetch", config.prefetch_ttl)),
            config,
            store,
            metrics,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Start periodic sweeps on the optimizer's own caches.
    pub fn start_sweepers(&self, every: Duration) {
        self.batches.start_sweeper(every);
        self.stats.start_sweeper(every);
        self.prefetched.start_sweeper(every);
    }

    /// Drop cached results whose key matches `pattern` (`batch:*`, `stats:*`, `prefetch:*`).
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        self.batches.invalidate_pattern(pattern)
            + self.stats.invalidate_pattern(pattern)
            + self.prefetched.invalidate_pattern(pattern)
    }

    /// Drop cached batches, stats and prefetched pages.
    pub fn clear_caches(&self) {
        self.batches.clear();
        self.stats.clear();
        self.prefetched.clear();
    }

    /// Stop sweepers and drop every cached result.
    pub fn destroy(&self) {
        self.batches.destroy();
        self.stats.destroy();
        self.prefetched.destroy();
    }

    /// Narrowest bounded, ordered read for these filters.
    ///
    /// Search text is not part of the read; [`fetch_page`](Self::fetch_page)
    /// applies it to the returned page.
    pub fn build_query(&self, filters: &Filters, pagination: &Pagination) -> ReadRequest {
        QueryShape::from_filters(filters).into_request(COLLECTION, pagination)
    }

    /// Read one page.
    #[tracing::instrument(skip(self, filters, pagination), fields(tenant = ?filters.tenant_id, page_size = pagination.page_size))]
    pub async fn fetch_page(
        &self,
        filters: &Filters,
        pagination: &Pagination,
    ) -> Result<Page, StoreError> {
        let request = self.build_query(filters, pagination);
        let docs = self.read("page", &request).await?;
        self.metrics.log_read("page", docs.len());

        // Cursor follows the raw read so paging continues past filtered rows
        let next_cursor = match docs.last() {
            Some(last) if docs.len() >= pagination.page_size => Some(Cursor::after(last)),
            _ => None,
        };
        let records = match filters.search.as_deref() {
            Some(needle) => docs.into_iter().filter(|d| d.matches_text(needle)).collect(),
            None => docs,
        };

        Ok(Page { records, next_cursor })
    }

    /// Commitments for many tenants at once.
    ///
    /// Ids are deduplicated, split into batches of `batch_size` and read
    /// concurrently with one membership clause per batch. The merged result
    /// is cached for `batch_ttl`. Any failed batch fails the whole call.
    #[tracing::instrument(skip(self, ids, filters), fields(ids = ids.len()))]
    pub async fn query_by_identifiers(
        &self,
        ids: &[String],
        filters: &Filters,
    ) -> Result<Vec<Commitment>, StoreError> {
        let mut unique: Vec<String> = ids.to_vec();
        unique.sort();
        unique.dedup();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        let key = batch_cache_key(&unique, filters);
        if let Some(cached) = self.batches.get(&key) {
            self.metrics.log_cache_hit("batch-query", &key);
            return Ok(cached);
        }

        let batch_size = self.config.batch_size.min(self.store.max_membership()).max(1);
        let mut join_set: JoinSet<(usize, Result<Vec<Commitment>, StoreError>)> = JoinSet::new();
        for (index, chunk) in unique.chunks(batch_size).enumerate() {
            let request = QueryShape::for_batch(filters, chunk.to_vec())
                .into_request(COLLECTION, &Pagination::new(self.config.stats_page_size));
            let optimizer = self.clone();
            join_set.spawn(async move { (index, optimizer.read("batch", &request).await) });
        }

        let mut results: Vec<Option<Vec<Commitment>>> = vec![None; join_set.len()];
        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, Ok(docs))) => results[index] = Some(docs),
                Ok((index, Err(e))) => {
                    warn!(batch = index, error = %e, "Identifier batch failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(StoreError::Backend(format!("batch task: {e}")));
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let mut seen = HashSet::new();
        let merged: Vec<Commitment> = results
            .into_iter()
            .flatten()
            .flatten()
            .filter(|doc| seen.insert(doc.id.clone()))
            .collect();

        self.metrics.log_read("batch-query", merged.len());
        debug!(batches = unique.len().div_ceil(batch_size), records = merged.len(), "Identifier batches merged");
        self.batches.set(key, merged.clone());
        Ok(merged)
    }

    /// Dashboard counters for the filtered set, from one bounded read.
    pub async fn aggregated_stats(&self, filters: &Filters) -> Result<AggregatedStats, StoreError> {
        self.aggregated_stats_at(filters, Utc::now()).await
    }

    /// [`aggregated_stats`](Self::aggregated_stats) evaluated at a fixed instant.
    #[tracing::instrument(skip(self, filters), fields(tenant = ?filters.tenant_id))]
    pub async fn aggregated_stats_at(
        &self,
        filters: &Filters,
        now: DateTime<Utc>,
    ) -> Result<AggregatedStats, StoreError> {
        let key = format!("stats:{}", filters.cache_fragment());
        if let Some(cached) = self.stats.get(&key) {
            self.metrics.log_cache_hit("aggregated-stats", &key);
            return Ok(cached);
        }

        let request = self.build_query(filters, &Pagination::new(self.config.stats_page_size));
        let docs = self.read("stats", &request).await?;
        self.metrics.log_read("aggregated-stats", docs.len());

        let stats = AggregatedStats::compute(&docs, now, self.config.due_soon_days);
        self.stats.set(key, stats.clone());
        Ok(stats)
    }

    /// Warm the next year's first page when the year is nearly over.
    ///
    /// Returns the background task, or `None` when nothing was scheduled.
    /// Failures are logged and dropped.
    pub fn prefetch(&self, filters: &Filters) -> Option<JoinHandle<()>> {
        self.prefetch_at(filters, Utc::now())
    }

    /// [`prefetch`](Self::prefetch) with an explicit clock.
    pub fn prefetch_at(&self, filters: &Filters, now: DateTime<Utc>) -> Option<JoinHandle<()>> {
        let next = next_year_filters(filters)?;
        if now.month() < PREFETCH_FROM_MONTH {
            metrics::record_prefetch("skipped");
            return None;
        }

        let optimizer = self.clone();
        Some(tokio::spawn(async move {
            let key = format!("prefetch:{}", next.cache_fragment());
            let request = optimizer.build_query(&next, &Pagination::new(optimizer.config.prefetch_page_size));
            match optimizer.read("prefetch", &request).await {
                Ok(docs) => {
                    optimizer.metrics.log_read("prefetch", docs.len());
                    metrics::record_prefetch("completed");
                    info!(key = %key, records = docs.len(), "Next-year prefetch completed");
                    optimizer.prefetched.set(key, docs);
                }
                Err(e) => {
                    metrics::record_prefetch("failed");
                    warn!(key = %key, error = %e, "Prefetch failed, ignoring");
                }
            }
        }))
    }

    /// Page warmed by a prefetch for exactly these filters, if still live.
    pub fn cached_prefetch(&self, filters: &Filters) -> Option<Vec<Commitment>> {
        let key = format!("prefetch:{}", filters.cache_fragment());
        let docs = self.prefetched.get(&key)?;
        self.metrics.log_cache_hit("prefetch", &key);
        Some(docs)
    }

    async fn read(
        &self,
        operation: &'static str,
        request: &ReadRequest,
    ) -> Result<Vec<Commitment>, StoreError> {
        let _timer = LatencyTimer::new(operation);
        let result = self.store.read(request).await;
        metrics::record_remote_read(operation, if result.is_ok() { "ok" } else { "error" });
        result
    }
}

/// Same filters one calendar year later; `None` unless tenant and year are set.
fn next_year_filters(filters: &Filters) -> Option<Filters> {
    filters.tenant_id.as_ref()?;
    let year = filters.year?.checked_add(1)?;
    Some(Filters {
        year: Some(year),
        date_range: None,
        ..filters.clone()
    })
}

/// `batch:{sha256}` over the sorted ids and the filter fragment.
fn batch_cache_key(sorted_ids: &[String], filters: &Filters) -> String {
    let mut hasher = Sha256::new();
    for id in sorted_ids {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(filters.cache_fragment().as_bytes());
    format!("batch:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Field, FieldOperator, FilterValue, IndexPath};
    use crate::store::InMemoryStore;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn setup(store: InMemoryStore) -> (QueryOptimizer, Arc<InMemoryStore>, Arc<ReadMetrics>) {
        let store = Arc::new(store);
        let metrics = Arc::new(ReadMetrics::default());
        let optimizer = QueryOptimizer::new(OptimizerConfig::default(), store.clone(), metrics.clone());
        (optimizer, store, metrics)
    }

    fn tenant_ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("company_{i:02}")).collect()
    }

    #[test]
    fn test_build_query_picks_narrowest_index() {
        let (optimizer, _, _) = setup(InMemoryStore::new());
        let request = optimizer.build_query(&Filters::new().tenant("c1").year(2025), &Pagination::default());

        assert_eq!(request.index, IndexPath::TenantAndDateRange);
        assert_eq!(request.limit, Pagination::DEFAULT_PAGE_SIZE);
        assert_eq!(request.collection, COLLECTION);
        assert!(request.filters.iter().any(|f| f.field == Field::TenantId
            && f.operator == FieldOperator::Equals
            && f.value == FilterValue::Text("c1".into())));
    }

    #[tokio::test]
    async fn test_fetch_page_paginates_with_cursor() {
        let store = InMemoryStore::new();
        store.extend((1..=5).map(|d| Commitment::new(format!("c{d}"), "t1", at(2025, 1, d), 1.0)));
        let (optimizer, _, _) = setup(store);
        let filters = Filters::new().tenant("t1");

        let first = optimizer.fetch_page(&filters, &Pagination::new(3)).await.unwrap();
        assert_eq!(first.records.len(), 3);
        let cursor = first.next_cursor.clone().unwrap();

        let second = optimizer.fetch_page(&filters, &Pagination::new(3).after(cursor)).await.unwrap();
        let ids: Vec<_> = second.records.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c4", "c5"]);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_fetch_page_applies_search_client_side() {
        let store = InMemoryStore::new();
        store.insert(Commitment::new("a", "t1", at(2025, 2, 1), 1.0).titled("Office rent"));
        store.insert(Commitment::new("b", "t1", at(2025, 2, 2), 1.0).titled("Payroll"));
        let (optimizer, store, metrics) = setup(store);

        let page = optimizer
            .fetch_page(&Filters::new().tenant("t1").search("rent"), &Pagination::new(9))
            .await
            .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].id, "a");
        // Both documents were billed as reads
        assert_eq!(metrics.summary().total_reads, 2);
        assert_eq!(store.read_log()[0].index, IndexPath::Tenant);
    }

    #[tokio::test]
    async fn test_twenty_five_ids_read_in_three_batches() {
        let store = InMemoryStore::new();
        for (i, tenant) in tenant_ids(25).iter().enumerate() {
            store.insert(Commitment::new(format!("doc-{i}"), tenant.clone(), at(2025, 3, 1), 1.0));
        }
        let (optimizer, store, _) = setup(store);

        let mut ids = tenant_ids(25);
        ids.push("company_03".into());
        let docs = optimizer.query_by_identifiers(&ids, &Filters::new()).await.unwrap();

        let mut sizes: Vec<_> = store.read_log().iter().map(ReadRequest::membership_len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![5, 10, 10]);
        assert_eq!(docs.len(), 25);
        let unique: HashSet<_> = docs.iter().map(|d| d.id.clone()).collect();
        assert_eq!(unique.len(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_run_concurrently() {
        let store = InMemoryStore::new().with_latency(Duration::from_millis(100));
        let (optimizer, store, _) = setup(store);

        optimizer.query_by_identifiers(&tenant_ids(30), &Filters::new()).await.unwrap();
        assert_eq!(store.peak_concurrency(), 3);
    }

    #[tokio::test]
    async fn test_batch_result_is_cached() {
        let (optimizer, store, metrics) = setup(InMemoryStore::new());
        let ids = tenant_ids(12);

        optimizer.query_by_identifiers(&ids, &Filters::new().year(2025)).await.unwrap();
        let mut reversed = ids.clone();
        reversed.reverse();
        optimizer.query_by_identifiers(&reversed, &Filters::new().year(2025)).await.unwrap();

        assert_eq!(store.reads(), 2);
        assert_eq!(metrics.summary().cache_hits, 1);

        // Different filters miss
        optimizer.query_by_identifiers(&ids, &Filters::new().year(2024)).await.unwrap();
        assert_eq!(store.reads(), 4);
    }

    #[tokio::test]
    async fn test_batch_failure_fails_call_and_skips_cache() {
        let (optimizer, store, _) = setup(InMemoryStore::new());
        store.fail_next(StoreError::Throttled);

        let result = optimizer.query_by_identifiers(&tenant_ids(15), &Filters::new()).await;
        assert_eq!(result, Err(StoreError::Throttled));

        optimizer.query_by_identifiers(&tenant_ids(15), &Filters::new()).await.unwrap();
        assert_eq!(store.reads(), 4);
    }

    #[tokio::test]
    async fn test_empty_identifiers_skip_store() {
        let (optimizer, store, _) = setup(InMemoryStore::new());
        let docs = optimizer.query_by_identifiers(&[], &Filters::new()).await.unwrap();
        assert!(docs.is_empty());
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn test_aggregated_stats_one_read_then_cached() {
        let now = at(2025, 6, 15);
        let store = InMemoryStore::new();
        for i in 0..6 {
            store.insert(Commitment::new(format!("p{i}"), "t1", at(2025, 6, 1 + i), 100.0).paid());
        }
        store.insert(Commitment::new("u1", "t1", at(2025, 6, 13), 10.0));
        store.insert(Commitment::new("u2", "t1", at(2025, 6, 14), 10.0));
        store.insert(Commitment::new("u3", "t1", at(2025, 6, 25), 10.0));
        store.insert(Commitment::new("u4", "t1", at(2025, 7, 5), 10.0));
        let (optimizer, store, metrics) = setup(store);
        let filters = Filters::new().tenant("t1").year(2025);

        let stats = optimizer.aggregated_stats_at(&filters, now).await.unwrap();
        assert_eq!((stats.total, stats.paid, stats.pending), (10, 6, 4));
        assert_eq!((stats.overdue, stats.due_soon), (2, 0));
        assert!((stats.paid_amount - 600.0).abs() < f64::EPSILON);

        let again = optimizer.aggregated_stats_at(&filters, now).await.unwrap();
        assert_eq!(again, stats);
        assert_eq!(store.reads(), 1);
        assert_eq!(store.read_log()[0].limit, 1000);
        assert_eq!(metrics.summary().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_prefetch_only_late_in_year_with_tenant_and_year() {
        let (optimizer, store, _) = setup(InMemoryStore::new());
        let filters = Filters::new().tenant("t1").year(2025);

        assert!(optimizer.prefetch_at(&filters, at(2025, 10, 31)).is_none());
        assert!(optimizer.prefetch_at(&Filters::new().year(2025), at(2025, 11, 2)).is_none());
        assert!(optimizer.prefetch_at(&Filters::new().tenant("t1"), at(2025, 12, 2)).is_none());
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn test_prefetch_warms_next_year() {
        let store = InMemoryStore::new();
        for d in 1..=8 {
            store.insert(Commitment::new(format!("n{d}"), "t1", at(2026, 1, d), 1.0));
        }
        store.insert(Commitment::new("old", "t1", at(2025, 12, 20), 1.0));
        let (optimizer, store, _) = setup(store);

        let handle = optimizer
            .prefetch_at(&Filters::new().tenant("t1").year(2025), at(2025, 11, 20))
            .unwrap();
        handle.await.unwrap();

        assert_eq!(store.read_log()[0].limit, 5);
        let warmed = optimizer.cached_prefetch(&Filters::new().tenant("t1").year(2026)).unwrap();
        assert_eq!(warmed.len(), 5);
        assert!(warmed.iter().all(|d| d.due_date.year() == 2026));
    }

    #[tokio::test]
    async fn test_prefetch_failure_is_swallowed() {
        let (optimizer, store, _) = setup(InMemoryStore::new());
        store.fail_next(StoreError::Backend("offline".into()));

        let handle = optimizer
            .prefetch_at(&Filters::new().tenant("t1").year(2025), at(2025, 12, 1))
            .unwrap();
        assert!(handle.await.is_ok());
        assert!(optimizer.cached_prefetch(&Filters::new().tenant("t1").year(2026)).is_none());
    }

    #[test]
    fn test_batch_key_depends_on_ids_and_filters() {
        let ids = tenant_ids(3);
        let a = batch_cache_key(&ids, &Filters::new());
        assert!(a.starts_with("batch:"));
        assert_eq!(a.len(), "batch:".len() + 64);
        assert_ne!(a, batch_cache_key(&ids[..2], &Filters::new()));
        assert_ne!(a, batch_cache_key(&ids, &Filters::new().year(2025)));
    }
}
