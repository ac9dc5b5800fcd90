// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Priority fetch scheduler.
//!
//! Every read a consumer wants goes through [`FetchScheduler::request`]:
//!
//! ```text
//!   request(key, fetch, opts)
//!        │
//!        ├─ live cache entry ──────────────► value (no task)
//!        ├─ task in flight for key ────────► join its waiters
//!        └─ new task ──► lane tail ──► pump
//!
//!   pump:  while running < max_concurrent
//!             take head of High, else Normal, else Low ──► spawn fetch
//!
//!   fetch done:
//!        Ok    ──► cache.set(ttl) ──► resolve waiters
//!        Err   ──► retries left? backoff, then lane FRONT
//!                  else resolve waiters with FetchError::Exhausted
//! ```
//!
//! All queue mutation happens under one mutex and never across an `.await`.
//! Fetch functions run in their own tokio tasks, outside the lock.
//!
//! # Example
//!
//! ```
//! use read_layer::cache::Namespace;
//! use read_layer::scheduler::{FetchScheduler, Priority, RequestOptions, SchedulerConfig};
//! use read_layer::{ReadMetrics, StoreError};
//! use std::sync::Arc;
//!
//! const TOTALS: Namespace<u64> = Namespace::new("totals");
//!
//! # #[tokio::main]
//! # async fn main() {
//! let scheduler = FetchScheduler::new(SchedulerConfig::default(), Arc::new(ReadMetrics::default()));
//! let key = TOTALS.key("company_1");
//!
//! let total = scheduler
//!     .request(&key, || async { Ok::<_, StoreError>(42) }, RequestOptions::new(Priority::High))
//!     .await
//!     .unwrap();
//! assert_eq!(total, 42);
//! assert!(!scheduler.is_stale(key.as_str()));
//! # }
//! ```

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::error::FetchError;
use super::task::{erase, AnyValue, ErasedFetch, FetchTask, Priority, TaskId, TaskState};
use crate::cache::{CacheStats, GlobPattern, TtlCache, TypedKey};
use crate::collector::ReadMetrics;
use crate::metrics;
use crate::resilience::RetryPolicy;
use crate::store::StoreError;

/// Scheduler tuning, derived from [`crate::ReadLayerConfig::scheduler`]
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Fetches running at once, across every lane and data kind
    pub max_concurrent: usize,
    /// TTL for results when a request does not set one
    pub default_ttl: Duration,
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            default_ttl: Duration::from_secs(300),
            retry: RetryPolicy::query(),
        }
    }
}

/// Per-request options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub priority: Priority,
    /// Cache TTL for the result; `None` uses the scheduler default
    pub ttl: Option<Duration>,
    /// Skip the cache and fetch again
    pub force_refetch: bool,
}

impl RequestOptions {
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn forced(mut self) -> Self {
        self.force_refetch = true;
        self
    }
}

/// Last fetch function, lane and TTL seen for a key
struct Registration {
    fetch: ErasedFetch,
    priority: Priority,
    ttl: Duration,
}

#[derive(Default)]
struct SchedulerState {
    /// Indexed by [`Priority::lane`]
    lanes: [VecDeque<TaskId>; 3],
    tasks: HashMap<TaskId, FetchTask>,
    /// Key to the task currently fetching it
    in_flight: HashMap<String, TaskId>,
    running: usize,
    registry: HashMap<String, Registration>,
    /// Completion time and TTL of the last successful fetch
    last_fetched: HashMap<String, (Instant, Duration)>,
}

impl SchedulerState {
    fn queued(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    /// Forget the in-flight mapping unless a newer task took the key over.
    fn release_key(&mut self, key: &str, id: TaskId) {
        if self.in_flight.get(key) == Some(&id) {
            self.in_flight.remove(key);
        }
    }
}

struct Launch {
    id: TaskId,
    fetch: ErasedFetch,
}

enum Submitted {
    Ready(AnyValue),
    Pending(oneshot::Receiver<Result<AnyValue, FetchError>>),
}

struct Inner {
    config: SchedulerConfig,
    cache: Arc<TtlCache<AnyValue>>,
    metrics: Arc<ReadMetrics>,
    state: Mutex<SchedulerState>,
}

/// Cache-first, priority-ordered, concurrency-bounded fetch queue.
///
/// Cloning is cheap and every clone drives the same queue.
#[derive(Clone)]
pub struct FetchScheduler {
    inner: Arc<Inner>,
}

impl FetchScheduler {
    pub fn new(config: SchedulerConfig, metrics: Arc<ReadMetrics>) -> Self {
        let cache = Arc::new(TtlCache::new("entities", config.default_ttl));
        info!(
            max_concurrent = config.max_concurrent,
            max_retries = config.retry.max_retries,
            "Fetch scheduler created"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                cache,
                metrics,
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Get the value for `key`, from cache or by scheduling `fetch`.
    ///
    /// The request is queued before this returns; the future only waits for
    /// the outcome. Dropping the future does not cancel the fetch.
    pub fn request<V, F, Fut>(
        &self,
        key: &TypedKey<V>,
        fetch: F,
        options: RequestOptions,
    ) -> impl Future<Output = Result<V, FetchError>> + Send + 'static
    where
        V: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, StoreError>> + Send + 'static,
    {
        let submitted = self.submit(key.as_str(), erase(fetch), options);
        resolve::<V>(submitted, key.as_str().to_owned())
    }

    /// Remember `fetch` for `key` without running it.
    ///
    /// Lets [`refetch`](Self::refetch) work before the first request.
    pub fn register<V, F, Fut>(&self, key: &TypedKey<V>, fetch: F, options: &RequestOptions)
    where
        V: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, StoreError>> + Send + 'static,
    {
        let registration = Registration {
            fetch: erase(fetch),
            priority: options.priority,
            ttl: options.ttl.unwrap_or(self.inner.config.default_ttl),
        };
        self.inner
            .state
            .lock()
            .registry
            .insert(key.as_str().to_owned(), registration);
    }

    /// Fetch `key` again with the function, lane and TTL it was last requested with.
    ///
    /// Fails with [`FetchError::UnknownKey`] if the key was never requested.
    pub fn refetch<V>(&self, key: &TypedKey<V>) -> impl Future<Output = Result<V, FetchError>> + Send + 'static
    where
        V: Clone + Send + Sync + 'static,
    {
        self.request_registered(key, true)
    }

    /// Request `key` with its registered fetch function.
    pub(crate) fn request_registered<V>(
        &self,
        key: &TypedKey<V>,
        force_refetch: bool,
    ) -> impl Future<Output = Result<V, FetchError>> + Send + 'static
    where
        V: Clone + Send + Sync + 'static,
    {
        let key = key.as_str().to_owned();
        let registered = self.inner.state.lock().registry.get(&key).map(|r| {
            let options = RequestOptions {
                priority: r.priority,
                ttl: Some(r.ttl),
                force_refetch,
            };
            (r.fetch.clone(), options)
        });
        let submitted = registered.map(|(fetch, options)| self.submit(&key, fetch, options));

        async move {
            let submitted = submitted.ok_or_else(|| FetchError::UnknownKey(key.clone()))?;
            resolve::<V>(submitted, key).await
        }
    }

    /// Drop the cached value and fetch time for `key`. Returns true if a value was cached.
    pub fn clear_cache(&self, key: &str) -> bool {
        self.inner.state.lock().last_fetched.remove(key);
        self.inner.cache.remove(key)
    }

    /// Drop every cached value whose key matches `pattern`.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let glob = GlobPattern::compile(pattern);
        self.inner
            .state
            .lock()
            .last_fetched
            .retain(|key, _| !glob.matches(key));
        self.inner.cache.invalidate_pattern(pattern)
    }

    /// True if `key` was never fetched or its last fetch is older than its TTL.
    pub fn is_stale(&self, key: &str) -> bool {
        match self.inner.state.lock().last_fetched.get(key) {
            Some((fetched_at, ttl)) => fetched_at.elapsed() > *ttl,
            None => true,
        }
    }

    /// Current task state for `key`.
    ///
    /// `Done` once a fetch has completed and not been cleared since;
    /// `None` when the scheduler knows nothing about the key.
    pub fn status(&self, key: &str) -> Option<TaskState> {
        let state = self.inner.state.lock();
        if let Some(task) = state.in_flight.get(key).and_then(|id| state.tasks.get(id)) {
            return Some(task.state);
        }
        state.last_fetched.contains_key(key).then_some(TaskState::Done)
    }

    /// Fetches currently running (backing-off tasks excluded).
    pub fn running(&self) -> usize {
        self.inner.state.lock().running
    }

    /// Tasks waiting in a lane.
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queued()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    /// Sweep expired results every `every`.
    pub fn start_sweeper(&self, every: Duration) {
        self.inner.cache.start_sweeper(every);
    }

    /// Stop the sweeper and drop every cached result, fetch time and
    /// registered fetch function.
    ///
    /// Keys must be requested again before [`refetch`](Self::refetch) works.
    pub fn destroy(&self) {
        let mut state = self.inner.state.lock();
        state.last_fetched.clear();
        state.registry.clear();
        drop(state);
        self.inner.cache.destroy();
    }

    fn submit(&self, key: &str, fetch: ErasedFetch, options: RequestOptions) -> Submitted {
        let ttl = options.ttl.unwrap_or(self.inner.config.default_ttl);
        let priority = options.priority;

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.registry.insert(
            key.to_owned(),
            Registration {
                fetch: fetch.clone(),
                priority,
                ttl,
            },
        );

        if !options.force_refetch {
            if let Some(value) = self.inner.cache.get(key) {
                self.inner.metrics.log_cache_hit("scheduler", key);
                return Submitted::Ready(value);
            }
        }

        let (tx, rx) = oneshot::channel();

        if let Some(id) = state.in_flight.get(key).copied() {
            if let Some(task) = state.tasks.get_mut(&id) {
                // A forced request only joins work that has not started yet
                if !options.force_refetch || matches!(task.state, TaskState::Queued(_)) {
                    task.waiters.push(tx);
                    metrics::record_task_event("joined", task.priority.as_str());
                    self.inner.metrics.log_debounce_event("scheduler");
                    debug!(key, task_id = %id, "Joined in-flight fetch");
                    return Submitted::Pending(rx);
                }
            }
        }

        let mut task = FetchTask::new(key.to_owned(), fetch, priority, ttl);
        task.waiters.push(tx);
        let id = task.id;
        state.lanes[priority.lane()].push_back(id);
        state.in_flight.insert(key.to_owned(), id);
        state.tasks.insert(id, task);
        metrics::record_task_event("queued", priority.as_str());
        debug!(key, task_id = %id, priority = %priority, "Fetch queued");

        let launches = self.pump(state);
        drop(guard);
        self.launch(launches);
        Submitted::Pending(rx)
    }

    /// Move lane heads to running until the concurrency bound is reached.
    fn pump(&self, state: &mut SchedulerState) -> Vec<Launch> {
        let mut launches = Vec::new();
        while state.running < self.inner.config.max_concurrent {
            let Some(id) = state.lanes.iter_mut().find_map(VecDeque::pop_front) else {
                break;
            };
            let Some(task) = state.tasks.get_mut(&id) else {
                continue;
            };
            task.state = TaskState::Running;
            state.running += 1;
            metrics::record_task_event("started", task.priority.as_str());
            debug!(key = %task.key, task_id = %id, attempt = task.retry_count, "Fetch started");
            launches.push(Launch {
                id,
                fetch: task.fetch.clone(),
            });
        }
        metrics::set_scheduler_load(state.running, state.queued());
        launches
    }

    /// Run each fetch in its own task; a panic is completed as a backend failure.
    fn launch(&self, launches: Vec<Launch>) {
        for Launch { id, fetch } in launches {
            let scheduler = self.clone();
            tokio::spawn(async move {
                let outcome = match tokio::spawn(async move { fetch().await }).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(task_id = %id, error = %e, "Fetch task panicked");
                        Err(StoreError::Backend(format!("fetch task: {e}")))
                    }
                };
                scheduler.complete(id, outcome);
            });
        }
    }

    fn complete(&self, id: TaskId, outcome: Result<AnyValue, StoreError>) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let Some(mut task) = state.tasks.remove(&id) else {
            return;
        };
        state.running = state.running.saturating_sub(1);
        let retry = &self.inner.config.retry;

        match outcome {
            Ok(value) => {
                self.inner
                    .cache
                    .set_with_ttl(task.key.clone(), value.clone(), task.ttl);
                state
                    .last_fetched
                    .insert(task.key.clone(), (Instant::now(), task.ttl));
                state.release_key(&task.key, id);
                self.inner.metrics.log_read("scheduler", 1);
                metrics::record_task_event("succeeded", task.priority.as_str());
                debug!(key = %task.key, task_id = %id, waiters = task.waiters.len(), "Fetch succeeded");
                task.state = TaskState::Done;
                task.resolve(Ok(value));
            }
            Err(e) if retry.should_retry(task.retry_count) => {
                let delay = retry.delay_for(task.retry_count);
                task.retry_count += 1;
                task.state = TaskState::Retrying {
                    attempt: task.retry_count,
                    delay,
                };
                warn!(
                    key = %task.key,
                    attempt = task.retry_count,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Fetch failed, retrying"
                );
                metrics::record_task_event("retried", task.priority.as_str());
                state.tasks.insert(id, task);

                let scheduler = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    scheduler.requeue(id);
                });
            }
            Err(e) => {
                let attempts = task.retry_count + 1;
                error!(key = %task.key, attempts, error = %e, "Fetch failed, retries exhausted");
                metrics::record_task_event("failed", task.priority.as_str());
                state.release_key(&task.key, id);
                let failure = FetchError::Exhausted {
                    key: task.key.clone(),
                    attempts,
                    source: e,
                };
                task.resolve(Err(failure));
            }
        }

        let launches = self.pump(state);
        drop(guard);
        self.launch(launches);
    }

    /// Put a backed-off task at the front of its lane.
    fn requeue(&self, id: TaskId) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if let Some(task) = state.tasks.get_mut(&id) {
            task.state = TaskState::Queued(task.priority);
            state.lanes[task.priority.lane()].push_front(id);
        }
        let launches = self.pump(state);
        drop(guard);
        self.launch(launches);
    }
}

/// Wait for the outcome and restore the value type.
async fn resolve<V>(submitted: Submitted, key: String) -> Result<V, FetchError>
where
    V: Clone + Send + Sync + 'static,
{
    let value = match submitted {
        Submitted::Ready(value) => value,
        Submitted::Pending(rx) => rx.await.map_err(|_| FetchError::Abandoned(key.clone()))??,
    };
    value
        .downcast::<V>()
        .map(|typed| Arc::try_unwrap(typed).unwrap_or_else(|shared| (*shared).clone()))
        .map_err(|_| FetchError::TypeMismatch(key))
}
