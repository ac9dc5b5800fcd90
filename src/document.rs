// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Documents served by the remote store.
//!
//! The dashboard's payment screens read [`Commitment`] documents: one
//! scheduled payment obligation of a tenant (company), with a due date, an
//! amount and a paid flag. Everything the screens need beyond those fields
//! travels untouched in `content`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A scheduled payment obligation.
///
/// # Example
///
/// ```
/// use read_layer::Commitment;
/// use chrono::{TimeZone, Utc};
///
/// let due = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
/// let c = Commitment::new("c-1", "company_1", due, 120.0).paid();
///
/// assert!(c.paid);
/// assert_eq!(c.tenant_id, "company_1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commitment {
    /// Document id, unique within the collection
    pub id: String,
    /// Owning tenant (company)
    pub tenant_id: String,
    #[serde(default)]
    pub title: String,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub paid: bool,
    /// Remaining document fields, opaque to the read layer
    #[serde(default)]
    pub content: Value,
}

impl Commitment {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        due_date: DateTime<Utc>,
        amount: f64,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            title: String::new(),
            due_date,
            amount,
            paid: false,
            content: Value::Null,
        }
    }

    /// Builder: mark as paid
    #[must_use]
    pub fn paid(mut self) -> Self {
        self.paid = true;
        self
    }

    /// Builder: set the title
    #[must_use]
    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Case-insensitive match of `needle` against title and tenant.
    #[must_use]
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        needle.is_empty()
            || self.title.to_lowercase().contains(&needle)
            || self.tenant_id.to_lowercase().contains(&needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn due() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_builders() {
        let c = Commitment::new("c-1", "company_1", due(), 50.0)
            .titled("Office rent")
            .paid();
        assert_eq!(c.title, "Office rent");
        assert!(c.paid);
        assert_eq!(c.content, Value::Null);
    }

    #[test]
    fn test_matches_text() {
        let c = Commitment::new("c-1", "Acme_SAS", due(), 50.0).titled("Office Rent");
        assert!(c.matches_text("rent"));
        assert!(c.matches_text("acme"));
        assert!(c.matches_text("  "));
        assert!(!c.matches_text("payroll"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let c: Commitment = serde_json::from_value(json!({
            "id": "c-9",
            "tenant_id": "company_2",
            "due_date": "2025-01-31T00:00:00Z",
            "content": {"beneficiary": "Utility Co"}
        }))
        .unwrap();
        assert_eq!(c.amount, 0.0);
        assert!(!c.paid);
        assert_eq!(c.content["beneficiary"], "Utility Co");
    }
}
