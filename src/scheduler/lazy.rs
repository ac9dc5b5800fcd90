// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Lazily loaded values for consumers.
//!
//! A [`LazyData`] owns one key's view for a screen: the last value, whether a
//! load is running and the last error, published through a `watch` channel.
//! The first load waits a lane-dependent startup delay so critical data
//! reaches the queue ahead of secondary widgets.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::error::FetchError;
use super::fetch_scheduler::{FetchScheduler, RequestOptions};
use crate::cache::TypedKey;
use crate::store::StoreError;

/// What a consumer renders
#[derive(Debug, Clone, PartialEq)]
pub struct LoadState<V> {
    pub data: Option<V>,
    pub loading: bool,
    pub error: Option<FetchError>,
}

impl<V> Default for LoadState<V> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
        }
    }
}

/// One key's data, loaded through the scheduler after a startup delay.
///
/// Dropping it cancels a pending startup load but never a fetch that is
/// already queued or running.
pub struct LazyData<V> {
    scheduler: FetchScheduler,
    key: TypedKey<V>,
    state: Arc<watch::Sender<LoadState<V>>>,
    startup: JoinHandle<()>,
}

impl<V> LazyData<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Register `fetch` for `key` and schedule the first load.
    ///
    /// The load is issued after [`Priority::startup_delay`](super::Priority::startup_delay)
    /// of the requested lane. A key fetched recently is served from the cache.
    pub fn spawn<F, Fut>(scheduler: &FetchScheduler, key: TypedKey<V>, fetch: F, options: RequestOptions) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, StoreError>> + Send + 'static,
    {
        scheduler.register(&key, fetch, &options);
        let state = Arc::new(watch::Sender::new(LoadState::default()));
        let delay = options.priority.startup_delay();

        let startup = {
            let scheduler = scheduler.clone();
            let key = key.clone();
            let state = state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                debug!(key = %key, stale = scheduler.is_stale(key.as_str()), "Lazy load starting");
                let _ = load(&state, scheduler.request_registered(&key, options.force_refetch)).await;
            })
        };

        Self {
            scheduler: scheduler.clone(),
            key,
            state,
            startup,
        }
    }

    pub fn key(&self) -> &TypedKey<V> {
        &self.key
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> LoadState<V> {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<LoadState<V>> {
        self.state.subscribe()
    }

    /// Bypass the cache and load again.
    pub async fn refetch(&self) -> Result<V, FetchError> {
        load(&self.state, self.scheduler.refetch(&self.key)).await
    }

    /// Drop the cached value and this view's data.
    pub fn clear_cache(&self) {
        self.scheduler.clear_cache(self.key.as_str());
        self.state.send_modify(|state| state.data = None);
    }

    pub fn is_stale(&self) -> bool {
        self.scheduler.is_stale(self.key.as_str())
    }
}

impl<V> Drop for LazyData<V> {
    fn drop(&mut self) {
        self.startup.abort();
    }
}

/// Publish loading, await `pending`, publish the outcome.
async fn load<V, P>(state: &watch::Sender<LoadState<V>>, pending: P) -> Result<V, FetchError>
where
    V: Clone,
    P: Future<Output = Result<V, FetchError>>,
{
    state.send_modify(|s| {
        s.loading = true;
        s.error = None;
    });
    let outcome = pending.await;
    state.send_modify(|s| {
        s.loading = false;
        match &outcome {
            Ok(value) => s.data = Some(value.clone()),
            Err(e) => s.error = Some(e.clone()),
        }
    });
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Namespace;
    use crate::collector::ReadMetrics;
    use crate::resilience::RetryPolicy;
    use crate::scheduler::{Priority, SchedulerConfig};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const LABELS: Namespace<String> = Namespace::new("labels");

    fn scheduler() -> FetchScheduler {
        let config = SchedulerConfig {
            retry: RetryPolicy::test(),
            ..SchedulerConfig::default()
        };
        FetchScheduler::new(config, Arc::new(ReadMetrics::default()))
    }

    fn counting(calls: &Arc<AtomicU32>) -> impl Fn() -> std::future::Ready<Result<String, StoreError>> + Send + Sync + 'static {
        let calls = calls.clone();
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(Ok::<_, StoreError>(format!("v{n}")))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_delay_per_lane() {
        let scheduler = scheduler();
        let calls = Arc::new(AtomicU32::new(0));
        let lazy = LazyData::spawn(&scheduler, LABELS.key("low"), counting(&calls), RequestOptions::new(Priority::Low));
        let mut rx = lazy.subscribe();

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(lazy.state(), LoadState::default());

        rx.wait_for(|s| s.data.is_some()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let state = lazy.state();
        assert_eq!(state.data.as_deref(), Some("v1"));
        assert!(!state.loading);
        assert!(!lazy.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_key_served_from_cache() {
        let scheduler = scheduler();
        let calls = Arc::new(AtomicU32::new(0));
        let key = LABELS.key("shared");
        scheduler.request(&key, counting(&calls), RequestOptions::default()).await.unwrap();

        let lazy = LazyData::spawn(&scheduler, key, counting(&calls), RequestOptions::new(Priority::High));
        lazy.subscribe().wait_for(|s| s.data.is_some()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.state().data.as_deref(), Some("v1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_and_clear_cache() {
        let scheduler = scheduler();
        let calls = Arc::new(AtomicU32::new(0));
        let lazy = LazyData::spawn(&scheduler, LABELS.key("x"), counting(&calls), RequestOptions::new(Priority::High));
        lazy.subscribe().wait_for(|s| s.data.is_some()).await.unwrap();

        assert_eq!(lazy.refetch().await, Ok("v2".to_string()));
        assert_eq!(lazy.state().data.as_deref(), Some("v2"));

        lazy.clear_cache();
        assert!(lazy.is_stale());
        assert_eq!(lazy.state().data, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_is_published() {
        let scheduler = scheduler();
        let fetch = || std::future::ready(Err::<String, _>(StoreError::PermissionDenied("labels".into())));
        let lazy = LazyData::spawn(&scheduler, LABELS.key("denied"), fetch, RequestOptions::new(Priority::High));

        let state = lazy.subscribe().wait_for(|s| s.error.is_some()).await.unwrap().clone();
        assert!(matches!(state.error, Some(FetchError::Exhausted { attempts: 4, .. })));
        assert!(!state.loading);
        assert!(state.data.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_startup() {
        let scheduler = scheduler();
        let calls = Arc::new(AtomicU32::new(0));
        let lazy = LazyData::spawn(&scheduler, LABELS.key("gone"), counting(&calls), RequestOptions::new(Priority::Normal));
        drop(lazy);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.status("labels:gone"), None);
    }
}
