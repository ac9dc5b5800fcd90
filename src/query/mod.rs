// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query shaping and reduced-cost reads.
//!
//! - [`request`]: store-agnostic read descriptors
//! - [`shape`]: declared filters and the index path they select
//! - [`stats`]: client-side aggregation
//! - [`optimizer`]: batching, caching and prefetch around the store

pub mod optimizer;
pub mod request;
pub mod shape;
pub mod stats;

pub use optimizer::{OptimizerConfig, Page, QueryOptimizer, COLLECTION};
pub use request::{Cursor, Field, FieldFilter, FieldOperator, FilterValue, IndexPath, ReadRequest};
pub use shape::{DateRange, Filters, Pagination, QueryShape};
pub use stats::AggregatedStats;
