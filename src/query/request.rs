// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read descriptors - what one bounded remote read looks like.
//!
//! A [`ReadRequest`] is the concrete, store-agnostic description of a single
//! read: equality/range/membership filters, an ascending order on a
//! monotonic field, a page-size cap and an optional resume cursor. Store
//! adapters translate it into their native query; [`ReadRequest::apply`] is
//! the reference evaluation used by the in-memory store.
//!
//! # Example
//!
//! ```
//! use read_layer::query::{Field, FieldFilter, IndexPath, ReadRequest};
//!
//! let request = ReadRequest::new("commitments", IndexPath::Tenant)
//!     .filter(FieldFilter::equals(Field::TenantId, "company_1"))
//!     .limit(9);
//!
//! assert_eq!(request.limit, 9);
//! assert_eq!(ReadRequest::ORDER_FIELD, Field::DueDate);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::document::Commitment;

/// Queryable document fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Id,
    TenantId,
    DueDate,
    Paid,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::TenantId => "tenant_id",
            Self::DueDate => "due_date",
            Self::Paid => "paid",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOperator {
    /// field == value
    Equals,
    /// field >= value
    GreaterOrEqual,
    /// field < value
    LessThan,
    /// field in [values] (bounded by the store's batch size)
    In,
}

/// Filter value type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Text(String),
    Timestamp(DateTime<Utc>),
    Bool(bool),
    /// Membership set for [`FieldOperator::In`]
    List(Vec<String>),
}

/// One filter clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: Field,
    pub operator: FieldOperator,
    pub value: FilterValue,
}

impl FieldFilter {
    pub fn equals(field: Field, value: impl Into<String>) -> Self {
        Self {
            field,
            operator: FieldOperator::Equals,
            value: FilterValue::Text(value.into()),
        }
    }

    pub fn is_in(field: Field, values: Vec<String>) -> Self {
        Self {
            field,
            operator: FieldOperator::In,
            value: FilterValue::List(values),
        }
    }

    pub fn at_or_after(field: Field, at: DateTime<Utc>) -> Self {
        Self {
            field,
            operator: FieldOperator::GreaterOrEqual,
            value: FilterValue::Timestamp(at),
        }
    }

    pub fn before(field: Field, at: DateTime<Utc>) -> Self {
        Self {
            field,
            operator: FieldOperator::LessThan,
            value: FilterValue::Timestamp(at),
        }
    }

    /// Evaluate against a document. Mismatched value types never match.
    pub fn matches(&self, doc: &Commitment) -> bool {
        match (self.field, self.operator, &self.value) {
            (Field::Id, FieldOperator::Equals, FilterValue::Text(v)) => doc.id == *v,
            (Field::Id, FieldOperator::In, FilterValue::List(vs)) => vs.contains(&doc.id),
            (Field::TenantId, FieldOperator::Equals, FilterValue::Text(v)) => doc.tenant_id == *v,
            (Field::TenantId, FieldOperator::In, FilterValue::List(vs)) => {
                vs.contains(&doc.tenant_id)
            }
            (Field::DueDate, FieldOperator::Equals, FilterValue::Timestamp(t)) => doc.due_date == *t,
            (Field::DueDate, FieldOperator::GreaterOrEqual, FilterValue::Timestamp(t)) => {
                doc.due_date >= *t
            }
            (Field::DueDate, FieldOperator::LessThan, FilterValue::Timestamp(t)) => {
                doc.due_date < *t
            }
            (Field::Paid, FieldOperator::Equals, FilterValue::Bool(b)) => doc.paid == *b,
            _ => false,
        }
    }

    /// Number of values a membership clause carries (0 for other clauses).
    pub fn membership_len(&self) -> usize {
        match (&self.operator, &self.value) {
            (FieldOperator::In, FilterValue::List(vs)) => vs.len(),
            _ => 0,
        }
    }
}

/// Resume point for forward pagination: strictly after `(due_date, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub due_date: DateTime<Utc>,
    pub id: String,
}

impl Cursor {
    /// Cursor positioned on a document; the next page starts after it.
    pub fn after(doc: &Commitment) -> Self {
        Self {
            due_date: doc.due_date,
            id: doc.id.clone(),
        }
    }

    fn is_before(&self, doc: &Commitment) -> bool {
        sort_key_cmp((&self.due_date, &self.id), (&doc.due_date, &doc.id)) == Ordering::Less
    }
}

/// Composite index used to serve a read, most selective first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexPath {
    /// (tenant_id, due_date) with a range on due_date
    TenantAndDateRange,
    /// (tenant_id, due_date)
    Tenant,
    /// (due_date) with a range
    DateRange,
    /// Full collection ordered by due_date
    OrderedOnly,
}

impl IndexPath {
    /// Higher is narrower.
    pub fn selectivity(&self) -> u8 {
        match self {
            Self::TenantAndDateRange => 3,
            Self::Tenant => 2,
            Self::DateRange => 1,
            Self::OrderedOnly => 0,
        }
    }
}

/// One bounded, ordered remote read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub collection: String,
    pub index: IndexPath,
    pub filters: Vec<FieldFilter>,
    pub limit: usize,
    pub start_after: Option<Cursor>,
}

impl ReadRequest {
    /// Every read is ordered ascending on this field, ties broken by document id.
    pub const ORDER_FIELD: Field = Field::DueDate;

    pub fn new(collection: impl Into<String>, index: IndexPath) -> Self {
        Self {
            collection: collection.into(),
            index,
            filters: Vec::new(),
            limit: 0,
            start_after: None,
        }
    }

    /// Add a filter clause
    #[must_use]
    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Cap the number of returned documents
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Resume strictly after a cursor
    #[must_use]
    pub fn start_after(mut self, cursor: Option<Cursor>) -> Self {
        self.start_after = cursor;
        self
    }

    /// Largest membership set in this request.
    pub fn membership_len(&self) -> usize {
        self.filters.iter().map(FieldFilter::membership_len).max().unwrap_or(0)
    }

    /// True if the document passes every filter and lies after the cursor.
    pub fn matches(&self, doc: &Commitment) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
            && self.start_after.as_ref().map_or(true, |c| c.is_before(doc))
    }

    /// Reference evaluation: filter, sort ascending, resume, cap.
    pub fn apply<I>(&self, docs: I) -> Vec<Commitment>
    where
        I: IntoIterator<Item = Commitment>,
    {
        let mut selected: Vec<Commitment> = docs.into_iter().filter(|d| self.matches(d)).collect();
        selected.sort_by(|a, b| sort_key_cmp((&a.due_date, &a.id), (&b.due_date, &b.id)));
        selected.truncate(self.limit);
        selected
    }
}

fn sort_key_cmp(a: (&DateTime<Utc>, &String), b: (&DateTime<Utc>, &String)) -> Ordering {
    a.0.cmp(b.0).then_with(|| a.1.cmp(b.1))
}
