// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::error::FetchError;
use crate::store::StoreError;

/// Scheduling lane. Lanes are served in strict order: High, Normal, Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Lanes in service order
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }

    /// Delay before a lazily loaded value issues its first request.
    pub fn startup_delay(&self) -> Duration {
        match self {
            Self::High => Duration::ZERO,
            Self::Normal => Duration::from_millis(100),
            Self::Low => Duration::from_millis(500),
        }
    }

    pub(crate) fn lane(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a task is in its life.
///
/// ```text
///   Queued ──► Running ──► Done
///     ▲           │
///     │           ▼ (failure, retries left)
///     └─────── Retrying { attempt, delay }
/// ```
///
/// A failure with no retries left resolves every waiter with
/// [`FetchError::Exhausted`] and forgets the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued(Priority),
    Running,
    /// Backing off before re-entering the front of its lane
    Retrying { attempt: u32, delay: Duration },
    Done,
}

/// Unique id of one scheduled fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl TaskId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Cached values are stored type-erased; [`crate::cache::TypedKey`] restores the type.
pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

pub(crate) type FetchFuture = Pin<Box<dyn Future<Output = Result<AnyValue, StoreError>> + Send>>;

/// A caller's fetch function with its result type erased
pub(crate) type ErasedFetch = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

pub(crate) type Waiter = oneshot::Sender<Result<AnyValue, FetchError>>;

/// Erase the result type of a fetch function.
pub(crate) fn erase<V, F, Fut>(fetch: F) -> ErasedFetch
where
    V: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, StoreError>> + Send + 'static,
{
    Arc::new(move || {
        let fut = fetch();
        Box::pin(async move { fut.await.map(|value| Arc::new(value) as AnyValue) })
    })
}

/// One unit of scheduled work, owned by the scheduler from enqueue to completion
pub(crate) struct FetchTask {
    pub id: TaskId,
    pub key: String,
    pub fetch: ErasedFetch,
    pub priority: Priority,
    pub retry_count: u32,
    pub state: TaskState,
    pub ttl: Duration,
    /// Every caller awaiting this key
    pub waiters: Vec<Waiter>,
}

impl FetchTask {
    pub fn new(key: String, fetch: ErasedFetch, priority: Priority, ttl: Duration) -> Self {
        Self {
            id: TaskId::new(),
            key,
            fetch,
            priority,
            retry_count: 0,
            state: TaskState::Queued(priority),
            ttl,
            waiters: Vec::new(),
        }
    }

    /// Deliver one outcome to every waiter. Dropped receivers are ignored.
    pub fn resolve(&mut self, outcome: Result<AnyValue, FetchError>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
    }
}
