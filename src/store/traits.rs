// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;

use crate::document::Commitment;
use crate::query::ReadRequest;

/// Failures reported by the remote document store.
///
/// Cloneable so one failed fetch can be delivered to every waiter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Document not found")]
    NotFound,
    #[error("Store backend error: {0}")]
    Backend(String),
    #[error("Store throttled the request")]
    Throttled,
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Read side of the remote document store.
///
/// Implementations must honour every clause of the request: filters,
/// ascending order on [`ReadRequest::ORDER_FIELD`] (ties by id), the resume
/// cursor and the limit.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, request: &ReadRequest) -> Result<Vec<Commitment>, StoreError>;

    /// Largest membership set a single request may carry.
    fn max_membership(&self) -> usize {
        10
    }
}
