//! # Read Layer
//!
//! Client-side read reduction for dashboards backed by a metered remote
//! document store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Consumers                            │
//! │  • Screens and background refreshers                       │
//! │  • LazyData: startup delay per lane, watch-based state     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Fetch Scheduler                         │
//! │  • Cache-first, joins duplicate in-flight requests         │
//! │  • High / Normal / Low lanes, strict priority              │
//! │  • max_concurrent fetches, exponential backoff retries     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               (hit)  TtlCache  (miss: run fetch fn)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Query Optimizer                         │
//! │  • Narrowest composite index, bounded + cursor paginated   │
//! │  • Identifier batches of 10, read concurrently             │
//! │  • One-read aggregate stats, next-year prefetch            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  DocumentStore (remote)                     │
//! └─────────────────────────────────────────────────────────────┘
//!
//!        ReadMetrics observes every step: reads, hits, cost
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use read_layer::cache::Namespace;
//! use read_layer::query::{Filters, Pagination};
//! use read_layer::scheduler::{Priority, RequestOptions};
//! use read_layer::store::InMemoryStore;
//! use read_layer::{Commitment, ReadLayer, ReadLayerConfig, StoreError};
//! use chrono::{TimeZone, Utc};
//! use std::sync::Arc;
//!
//! const PAYMENTS: Namespace<Vec<Commitment>> = Namespace::new("payments");
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(InMemoryStore::new());
//!     let due = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
//!     store.insert(Commitment::new("c-1", "company_1", due, 120.0));
//!
//!     let layer = ReadLayer::new(ReadLayerConfig::default(), store);
//!     layer.start();
//!
//!     let optimizer = layer.optimizer().clone();
//!     let fetch = move || {
//!         let optimizer = optimizer.clone();
//!         async move {
//!             let filters = Filters::new().tenant("company_1").year(2025);
//!             let page = optimizer.fetch_page(&filters, &Pagination::default()).await?;
//!             Ok::<_, StoreError>(page.records)
//!         }
//!     };
//!
//!     let key = PAYMENTS.key("company_1");
//!     let records = layer
//!         .scheduler()
//!         .request(&key, fetch, RequestOptions::new(Priority::High))
//!         .await
//!         .unwrap();
//!     assert_eq!(records.len(), 1);
//!
//!     println!("{}", layer.shutdown());
//! }
//! ```
//!
//! ## Features
//!
//! - **TTL Cache**: per-entry expiry, glob invalidation, periodic sweep
//! - **Typed Keys**: namespaces bind cache keys to their value type
//! - **Query Shaping**: narrowest index path, page limits, resume cursors
//! - **Batched Lookups**: membership reads split to the store's limit
//! - **Priority Scheduling**: strict lanes with a process-wide concurrency bound
//! - **Retry Logic**: exponential backoff, retries jump the lane
//! - **Read Metrics**: hit rate, operations per second, estimated cost
//!
//! ## Configuration
//!
//! See [`ReadLayerConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`layer`]: The [`ReadLayer`] wiring everything together
//! - [`cache`]: TTL cache, glob patterns, typed namespaces
//! - [`query`]: Read descriptors, query shapes, the optimizer
//! - [`scheduler`]: Fetch scheduler and lazily loaded data
//! - [`store`]: Document store trait and the in-memory store
//! - [`collector`]: Session read metrics
//! - [`resilience`]: Retry policy

pub mod cache;
pub mod collector;
pub mod config;
pub mod document;
pub mod layer;
pub mod metrics;
pub mod query;
pub mod resilience;
pub mod scheduler;
pub mod store;

pub use collector::{MetricsSummary, ReadMetrics};
pub use config::ReadLayerConfig;
pub use document::Commitment;
pub use layer::{LayerState, ReadLayer};
pub use metrics::LatencyTimer;
pub use resilience::RetryPolicy;
pub use scheduler::{FetchError, FetchScheduler, LazyData, Priority, RequestOptions};
pub use store::{DocumentStore, StoreError};
