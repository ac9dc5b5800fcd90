//! Property-based tests for the read layer's pure building blocks.
//!
//! Uses proptest to check the glob matcher against a reference matcher, the
//! TTL cache's overwrite and invalidation rules, and request evaluation
//! invariants.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::HashSet;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use proptest::prelude::*;

use read_layer::cache::{pattern_matches, TtlCache};
use read_layer::query::{Cursor, IndexPath, ReadRequest};
use read_layer::Commitment;

// =============================================================================
// Strategies and reference implementations
// =============================================================================

/// Keys over a tiny alphabet so patterns actually hit
fn key_strategy() -> impl Strategy<Value = String> {
    "[ab:_]{0,8}"
}

/// Patterns over the same alphabet plus wildcards
fn pattern_strategy() -> impl Strategy<Value = String> {
    "[ab:_*]{0,6}"
}

/// Textbook backtracking glob match, used as the oracle
fn reference_match(pattern: &[char], key: &[char]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some(('*', rest)) => (0..=key.len()).any(|skip| reference_match(rest, &key[skip..])),
        Some((c, rest)) => key.first() == Some(c) && reference_match(rest, &key[1..]),
    }
}

fn commitment_strategy() -> impl Strategy<Value = Commitment> {
    ("[a-z]{1,6}", "t[0-3]", 0i64..60, any::<bool>()).prop_map(|(id, tenant, day, paid)| {
        let due = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::days(day);
        let doc = Commitment::new(id, tenant, due, 1.0);
        if paid {
            doc.paid()
        } else {
            doc
        }
    })
}

// =============================================================================
// Glob matching
// =============================================================================

proptest! {
    /// Tokenized matching agrees with the backtracking oracle
    #[test]
    fn glob_matches_reference(pattern in pattern_strategy(), key in key_strategy()) {
        let p: Vec<char> = pattern.chars().collect();
        let k: Vec<char> = key.chars().collect();
        prop_assert_eq!(pattern_matches(&pattern, &key), reference_match(&p, &k));
    }

    /// A pattern without wildcards matches only itself
    #[test]
    fn glob_exact_pattern_is_equality(a in "[ab:_]{0,6}", b in "[ab:_]{0,6}") {
        prop_assert_eq!(pattern_matches(&a, &b), a == b);
    }

    /// Prefix patterns match every extension of the prefix
    #[test]
    fn glob_prefix_matches_extensions(prefix in "[ab:_]{0,5}", suffix in "[ab:_]{0,5}") {
        let pattern = format!("{prefix}*");
        let key = format!("{prefix}{suffix}");
        prop_assert!(pattern_matches(&pattern, &key));
    }

    /// Arbitrary text never panics the matcher
    #[test]
    fn fuzz_glob_never_panics(pattern in ".{0,20}", key in ".{0,40}") {
        let _ = pattern_matches(&pattern, &key);
    }
}

// =============================================================================
// TTL cache
// =============================================================================

proptest! {
    /// The last write wins, however many writes precede it
    #[test]
    fn cache_overwrite_keeps_last_value(values in prop::collection::vec(any::<u32>(), 1..20)) {
        let cache: TtlCache<u32> = TtlCache::new("prop", Duration::from_secs(60));
        for v in &values {
            cache.set("k", *v);
        }
        prop_assert_eq!(cache.get("k"), values.last().copied());
        prop_assert_eq!(cache.len(), 1);
    }

    /// A zero TTL is expired on arrival and the miss deletes it
    #[test]
    fn cache_zero_ttl_never_served(key in key_strategy(), value in any::<u32>()) {
        let cache: TtlCache<u32> = TtlCache::new("prop", Duration::from_secs(60));
        cache.set_with_ttl(key.clone(), value, Duration::ZERO);
        prop_assert_eq!(cache.get(&key), None);
        prop_assert!(cache.is_empty());
        prop_assert_eq!(cache.stats().misses, 1);
    }

    /// Invalidation removes exactly the matching keys
    #[test]
    fn cache_invalidate_removes_exactly_matches(
        keys in prop::collection::hash_set(key_strategy(), 0..20),
        pattern in pattern_strategy(),
    ) {
        let cache: TtlCache<usize> = TtlCache::new("prop", Duration::from_secs(60));
        for (i, key) in keys.iter().enumerate() {
            cache.set(key.clone(), i);
        }

        let expected: HashSet<&String> = keys.iter().filter(|k| pattern_matches(&pattern, k)).collect();
        let removed = cache.invalidate_pattern(&pattern);

        prop_assert_eq!(removed, expected.len());
        for key in &keys {
            prop_assert_eq!(cache.get(key).is_some(), !expected.contains(key));
        }
    }

    /// Hit rate stays within [0, 1] and is consistent with the counters
    #[test]
    fn cache_hit_rate_bounded(lookups in prop::collection::vec(any::<bool>(), 0..50)) {
        let cache: TtlCache<u8> = TtlCache::new("prop", Duration::from_secs(60));
        cache.set("present", 1);
        for hit in &lookups {
            let _ = cache.get(if *hit { "present" } else { "absent" });
        }

        let stats = cache.stats();
        prop_assert_eq!(stats.hits + stats.misses, lookups.len() as u64);
        prop_assert!((0.0..=1.0).contains(&stats.hit_rate));
    }
}

// =============================================================================
// Request evaluation
// =============================================================================

proptest! {
    /// Results are ordered, capped, and all lie after the cursor
    #[test]
    fn apply_respects_order_limit_cursor(
        docs in prop::collection::vec(commitment_strategy(), 0..40),
        limit in 0usize..15,
        cursor_at in prop::option::of(0usize..40),
    ) {
        let cursor = cursor_at.and_then(|i| docs.get(i)).map(Cursor::after);
        let request = ReadRequest::new("commitments", IndexPath::OrderedOnly)
            .limit(limit)
            .start_after(cursor.clone());

        let out = request.apply(docs.clone());
        prop_assert!(out.len() <= limit);
        for pair in out.windows(2) {
            prop_assert!((pair[0].due_date, &pair[0].id) <= (pair[1].due_date, &pair[1].id));
        }
        if let Some(c) = cursor {
            for doc in &out {
                prop_assert!((doc.due_date, &doc.id) > (c.due_date, &c.id));
            }
        }
    }

    /// Paging to exhaustion visits every document exactly once
    #[test]
    fn cursor_paging_is_exhaustive(docs in prop::collection::hash_map("[a-z]{1,6}", 0i64..30, 0..30), page in 1usize..7) {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let all: Vec<Commitment> = docs
            .iter()
            .map(|(id, day)| Commitment::new(id.clone(), "t", base + ChronoDuration::days(*day), 1.0))
            .collect();

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let request = ReadRequest::new("commitments", IndexPath::OrderedOnly)
                .limit(page)
                .start_after(cursor.clone());
            let batch = request.apply(all.clone());
            if batch.is_empty() {
                break;
            }
            cursor = batch.last().map(Cursor::after);
            seen.extend(batch.into_iter().map(|d| d.id));
        }

        prop_assert_eq!(seen.len(), all.len());
        let unique: HashSet<_> = seen.iter().collect();
        prop_assert_eq!(unique.len(), all.len());
    }
}
