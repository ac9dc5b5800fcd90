// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Priority-ordered, concurrency-bounded fetching.
//!
//! - [`FetchScheduler`]: cache-first request queue with retry and backoff
//! - [`LazyData`]: one consumer's view of a key, loaded after a startup delay
//! - [`TaskState`] / [`Priority`]: task lifecycle and scheduling lanes

mod error;
mod fetch_scheduler;
mod lazy;
mod task;

pub use error::FetchError;
pub use fetch_scheduler::{FetchScheduler, RequestOptions, SchedulerConfig};
pub use lazy::{LazyData, LoadState};
pub use task::{Priority, TaskId, TaskState};
