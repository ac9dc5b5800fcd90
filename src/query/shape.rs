// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Declared filters and the query shape derived from them.
//!
//! [`Filters`] is what a screen asks for. [`QueryShape`] is the in-memory
//! description the optimizer builds from it for one read: which of tenant,
//! date range and identifier batch are present. The shape decides the index
//! path and produces the final [`ReadRequest`].
//!
//! # Example
//!
//! ```
//! use read_layer::query::{Filters, IndexPath, Pagination, QueryShape};
//!
//! let filters = Filters::new().tenant("company_1").year(2025);
//! let shape = QueryShape::from_filters(&filters);
//! assert_eq!(shape.index_path(), IndexPath::TenantAndDateRange);
//!
//! let request = shape.into_request("commitments", &Pagination::new(9));
//! assert_eq!(request.limit, 9);
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::request::{Cursor, Field, FieldFilter, IndexPath, ReadRequest};

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Calendar year in UTC: Jan 1 00:00 up to (excluding) Jan 1 of the next year.
    pub fn year(year: i32) -> Option<Self> {
        let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()?;
        let end = Utc.with_ymd_and_hms(year.checked_add(1)?, 1, 1, 0, 0, 0).single()?;
        Some(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Filters a consumer declares for a read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Explicit window; takes precedence over `year`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Free-text search, applied client-side after the read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    #[must_use]
    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    #[must_use]
    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.date_range = Some(DateRange::new(start, end));
        self
    }

    #[must_use]
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    /// The time window these filters select, if any.
    pub fn effective_range(&self) -> Option<DateRange> {
        self.date_range.or_else(|| self.year.and_then(DateRange::year))
    }

    /// Stable string form used inside cache keys.
    pub fn cache_fragment(&self) -> String {
        // Field order is fixed by the struct, so equal filters give equal strings
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Page size and resume point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub page_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

impl Pagination {
    /// Default page size of the payments grid
    pub const DEFAULT_PAGE_SIZE: usize = 9;

    pub fn new(page_size: usize) -> Self {
        Self { page_size, cursor: None }
    }

    #[must_use]
    pub fn after(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PAGE_SIZE)
    }
}

/// What one read will constrain on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryShape {
    pub tenant_id: Option<String>,
    pub range: Option<DateRange>,
    /// Tenant ids tested with a membership clause; at most one batch
    pub identifiers: Vec<String>,
}

impl QueryShape {
    pub fn from_filters(filters: &Filters) -> Self {
        Self {
            tenant_id: filters.tenant_id.clone(),
            range: filters.effective_range(),
            identifiers: Vec::new(),
        }
    }

    /// Shape for one identifier batch; the batch replaces any tenant equality.
    pub fn for_batch(filters: &Filters, identifiers: Vec<String>) -> Self {
        Self {
            tenant_id: None,
            range: filters.effective_range(),
            identifiers,
        }
    }

    /// Narrowest composite index available for this shape.
    pub fn index_path(&self) -> IndexPath {
        let has_tenant = self.tenant_id.is_some() || !self.identifiers.is_empty();
        match (has_tenant, self.range.is_some()) {
            (true, true) => IndexPath::TenantAndDateRange,
            (true, false) => IndexPath::Tenant,
            (false, true) => IndexPath::DateRange,
            (false, false) => IndexPath::OrderedOnly,
        }
    }

    /// Build the bounded, ordered read.
    pub fn into_request(self, collection: &str, pagination: &Pagination) -> ReadRequest {
        let mut request = ReadRequest::new(collection, self.index_path())
            .limit(pagination.page_size)
            .start_after(pagination.cursor.clone());

        if let Some(tenant_id) = self.tenant_id {
            request = request.filter(FieldFilter::equals(Field::TenantId, tenant_id));
        }
        if !self.identifiers.is_empty() {
            request = request.filter(FieldFilter::is_in(Field::TenantId, self.identifiers));
        }
        if let Some(range) = self.range {
            request = request
                .filter(FieldFilter::at_or_after(ReadRequest::ORDER_FIELD, range.start))
                .filter(FieldFilter::before(ReadRequest::ORDER_FIELD, range.end));
        }
        request
    }
}
