// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Client-side aggregation over one bounded read.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Commitment;

/// Dashboard counters for a set of commitments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedStats {
    pub total: usize,
    pub paid: usize,
    pub pending: usize,
    /// Unpaid with due date strictly before now
    pub overdue: usize,
    /// Unpaid and due within the due-soon window (after now, inclusive end)
    pub due_soon: usize,
    pub total_amount: f64,
    pub paid_amount: f64,
}

impl AggregatedStats {
    /// Reduce `docs` in one pass.
    pub fn compute(docs: &[Commitment], now: DateTime<Utc>, due_soon_days: i64) -> Self {
        // None when the window runs off the calendar; a positive one then covers every future date
        let due_soon_until = Duration::try_days(due_soon_days).and_then(|d| now.checked_add_signed(d));
        let in_window = |due: DateTime<Utc>| due_soon_until.map_or(due_soon_days > 0, |until| due <= until);

        docs.iter().fold(Self::default(), |mut stats, doc| {
            stats.total += 1;
            stats.total_amount += doc.amount;
            if doc.paid {
                stats.paid += 1;
                stats.paid_amount += doc.amount;
            } else {
                stats.pending += 1;
                if doc.due_date < now {
                    stats.overdue += 1;
                } else if doc.due_date > now && in_window(doc.due_date) {
                    stats.due_soon += 1;
                }
            }
            stats
        })
    }
}
