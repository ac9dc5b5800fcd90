// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! TTL Cache
//!
//! In-memory key/value cache where every entry carries its own expiry.
//!
//! # Lifecycle of an entry
//!
//! ```text
//! set(key, value, ttl)        expires_at = now + ttl
//!       │
//!       ├─→ get() before expires_at   → hit, value returned
//!       ├─→ get() at/after expires_at → miss, entry deleted
//!       ├─→ invalidate_pattern()      → deleted if key matches
//!       └─→ cleanup() (sweeper)       → deleted once expired
//! ```
//!
//! The cache never fails and does no I/O. The optional sweeper is a tokio
//! task holding only a weak reference, so dropping the last `Arc` stops it.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::pattern::GlobPattern;

/// Stand-in expiry for TTLs too long to add to the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A cached value with its timestamps
#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Number of live lookups
    pub hits: u64,
    /// Number of lookups that found nothing or an expired entry
    pub misses: u64,
    /// Hit rate (0.0 - 1.0), 0.0 before the first lookup
    pub hit_rate: f64,
    /// Entries currently stored (expired ones included until swept)
    pub size: usize,
}

/// Key/value cache with per-entry TTL and glob invalidation
pub struct TtlCache<V> {
    /// Label used for metrics and logs
    name: &'static str,
    entries: DashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Periodic cleanup task, if started
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache whose `set` uses `default_ttl`.
    pub fn new(name: &'static str, default_ttl: Duration) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a live value.
    ///
    /// An expired entry is removed as part of the failed lookup.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_cache_lookup(self.name, true);
                return Some(entry.value.clone());
            }
        }

        // Re-check under the shard write lock so a concurrent fresh `set` survives
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        self.misses.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_cache_lookup(self.name, false);
        None
    }

    /// Age of a live entry, without touching hit/miss counters.
    pub fn age(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| now.saturating_duration_since(entry.created_at))
    }

    /// Insert with the default TTL, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Insert with an explicit TTL, replacing any previous entry.
    ///
    /// A TTL past the clock's range (e.g. `Duration::MAX`) never expires in practice.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                created_at: now,
                expires_at,
            },
        );
    }

    /// Remove one key. Returns true if something was stored under it.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Delete every key matching a `*` glob. Returns the number removed.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let glob = GlobPattern::compile(pattern);

        let removed = if glob.is_exact() {
            usize::from(self.remove(pattern))
        } else {
            let before = self.entries.len();
            self.entries.retain(|key, _| !glob.matches(key));
            before.saturating_sub(self.entries.len())
        };

        debug!(cache = self.name, pattern, removed, "Invalidated cache entries");
        crate::metrics::record_cache_invalidation(self.name, removed);
        removed
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let cleaned = before.saturating_sub(self.entries.len());

        if cleaned > 0 {
            debug!(cache = self.name, cleaned, "Swept expired cache entries");
        }
        crate::metrics::set_cache_entries(self.name, self.entries.len());
        cleaned
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            size: self.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries and reset the counters.
    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Stop the sweeper and clear all state.
    pub fn destroy(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.clear();
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Run [`cleanup`](Self::cleanup) every `every` on the current tokio runtime.
    ///
    /// Replaces a previously started sweeper. A zero interval disables sweeping.
    pub fn start_sweeper(self: &Arc<Self>, every: Duration) {
        if every.is_zero() {
            return;
        }

        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                cache.cleanup();
            }
        });

        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
    }
}

impl<V> Drop for TtlCache<V> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> TtlCache<String> {
        TtlCache::new("test", Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_before_expiry() {
        let cache = cache();
        cache.set_with_ttl("k", "v".to_string(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("k"), Some("v".to_string()));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_expiry_removes_entry() {
        let cache = cache();
        cache.set_with_ttl("k", "v".to_string(), Duration::from_secs(10));
        assert_eq!(cache.stats().size, 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get("k"), None);

        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_ttl_is_kept() {
        let cache = cache();
        cache.set_with_ttl("forever", "v".to_string(), Duration::MAX);

        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert_eq!(cache.get("forever"), Some("v".to_string()));
        assert_eq!(cache.cleanup(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_refreshes_expiry() {
        let cache = cache();
        cache.set_with_ttl("k", "v1".to_string(), Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set_with_ttl("k", "v2".to_string(), Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;

        // 16s after the first set, 8s after the second
        assert_eq!(cache.get("k"), Some("v2".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ttl() {
        let cache = cache();
        cache.set("k", "v".to_string());
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("k").is_some());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_invalidate_pattern_exact_set() {
        let cache = cache();
        cache.set("company_123_payments", "a".into());
        cache.set("company_123_stats", "b".into());
        cache.set("company_1234_payments", "c".into());
        cache.set("stats_company_123_x", "d".into());

        let removed = cache.invalidate_pattern("company_123_*");
        assert_eq!(removed, 2);
        assert!(cache.get("company_1234_payments").is_some());
        assert!(cache.get("stats_company_123_x").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalidate_pattern_no_match() {
        let cache = cache();
        cache.set("a", "1".into());
        assert_eq!(cache.invalidate_pattern("zzz*"), 0);
        assert_eq!(cache.invalidate_pattern("missing"), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_exact_key() {
        let cache = cache();
        cache.set("a", "1".into());
        cache.set("ab", "2".into());
        assert_eq!(cache.invalidate_pattern("a"), 1);
        assert!(cache.get("ab").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_only_expired() {
        let cache = cache();
        cache.set_with_ttl("short", "1".into(), Duration::from_secs(1));
        cache.set_with_ttl("long", "2".into(), Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("long").is_some());
    }

    #[test]
    fn test_hit_rate() {
        let cache = cache();
        assert_eq!(cache.stats().hit_rate, 0.0);

        cache.set("k", "v".into());
        cache.get("k");
        cache.get("k");
        cache.get("k");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.75).abs() < 0.01);
    }

    #[test]
    fn test_clear_resets_counters() {
        let cache = cache();
        cache.set("k", "v".into());
        cache.get("k");
        cache.clear();

        let stats = cache.stats();
        assert_eq!(stats, CacheStats { hits: 0, misses: 0, hit_rate: 0.0, size: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_age() {
        let cache = cache();
        cache.set("k", "v".into());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.age("k"), Some(Duration::from_secs(5)));
        assert_eq!(cache.age("missing"), None);
        // age() does not count as a lookup
        assert_eq!(cache.stats().hits + cache.stats().misses, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_periodically() {
        let cache = Arc::new(cache());
        cache.set_with_ttl("k", "v".into(), Duration::from_secs(1));
        cache.start_sweeper(Duration::from_secs(120));
        assert!(cache.is_sweeping());

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_stops_sweeper() {
        let cache = Arc::new(cache());
        cache.start_sweeper(Duration::from_secs(1));
        cache.set("k", "v".into());

        cache.destroy();
        tokio::task::yield_now().await;
        assert!(!cache.is_sweeping());
        assert!(cache.is_empty());
    }
}
