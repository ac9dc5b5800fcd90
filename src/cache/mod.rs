// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caching primitives.
//!
//! - [`TtlCache`]: per-entry TTL, glob invalidation, periodic sweep
//! - [`GlobPattern`]: tokenized `*` matcher used for invalidation
//! - [`Namespace`] / [`TypedKey`]: compile-time value types for cache keys

mod namespace;
mod pattern;
mod ttl_cache;

pub use namespace::{Namespace, TypedKey};
pub use pattern::{pattern_matches, GlobPattern};
pub use ttl_cache::{CacheStats, TtlCache};
