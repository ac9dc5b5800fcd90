// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::traits::{DocumentStore, StoreError};
use crate::document::Commitment;
use crate::query::ReadRequest;

/// Local stand-in for the remote store.
///
/// Serves reads with [`ReadRequest::apply`], enforces the membership limit
/// like the real store, and can inject latency and failures.
pub struct InMemoryStore {
    data: DashMap<String, Commitment>,
    max_membership: usize,
    latency: Option<Duration>,
    /// Every request served, in arrival order
    read_log: Mutex<Vec<ReadRequest>>,
    /// Errors returned by the next reads, one per read
    failures: Mutex<VecDeque<StoreError>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            max_membership: 10,
            latency: None,
            read_log: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Builder: simulated network latency per read
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Builder: membership limit per request
    #[must_use]
    pub fn with_max_membership(mut self, max: usize) -> Self {
        self.max_membership = max;
        self
    }

    pub fn insert(&self, doc: Commitment) {
        self.data.insert(doc.id.clone(), doc);
    }

    pub fn extend(&self, docs: impl IntoIterator<Item = Commitment>) {
        for doc in docs {
            self.insert(doc);
        }
    }

    /// Fail the next read with `err`. Calls queue up.
    pub fn fail_next(&self, err: StoreError) {
        self.failures.lock().push_back(err);
    }

    /// Number of reads served (failed ones included)
    #[must_use]
    pub fn reads(&self) -> usize {
        self.read_log.lock().len()
    }

    /// Copy of every request received so far
    #[must_use]
    pub fn read_log(&self) -> Vec<ReadRequest> {
        self.read_log.lock().clone()
    }

    /// Highest number of reads observed running at the same time
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn read(&self, request: &ReadRequest) -> Result<Vec<Commitment>, StoreError> {
        self.read_log.lock().push(request.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        if request.membership_len() > self.max_membership {
            return Err(StoreError::InvalidQuery(format!(
                "membership clause has {} values, limit is {}",
                request.membership_len(),
                self.max_membership
            )));
        }

        let snapshot: Vec<Commitment> = self.data.iter().map(|r| r.value().clone()).collect();
        Ok(request.apply(snapshot))
    }

    fn max_membership(&self) -> usize {
        self.max_membership
    }
}
