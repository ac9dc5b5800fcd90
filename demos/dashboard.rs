// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Dashboard session example.
//!
//! Demonstrates:
//! 1. Seeding an in-memory document store with simulated latency
//! 2. Lazy views loading in priority order (table, stats, labels)
//! 3. Repeat visits served from cache
//! 4. Identifier batches across many tenants
//! 5. Next-year prefetch
//! 6. Session summary and `metrics` counters
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=read_layer=debug cargo run --example dashboard
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Datelike, TimeZone, Utc};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use tracing_subscriber::EnvFilter;

use read_layer::cache::Namespace;
use read_layer::query::{AggregatedStats, Filters, Pagination};
use read_layer::store::InMemoryStore;
use read_layer::{Commitment, Priority, ReadLayer, ReadLayerConfig, RequestOptions, StoreError};

const PAYMENTS: Namespace<Vec<Commitment>> = Namespace::new("payments");
const STATS: Namespace<AggregatedStats> = Namespace::new("stats");
const LABELS: Namespace<Vec<String>> = Namespace::new("labels");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           read-layer: Dashboard Session Example               ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Seed the store
    // ─────────────────────────────────────────────────────────────────────────
    let year = Utc::now().year();
    let store = Arc::new(InMemoryStore::new().with_latency(Duration::from_millis(40)));
    for tenant in 0..25 {
        for month in 1..=12u32 {
            let due = Utc.with_ymd_and_hms(year, month, 10, 0, 0, 0).unwrap();
            let doc = Commitment::new(format!("c-{tenant:02}-{month:02}"), format!("company_{tenant}"), due, 250.0)
                .titled(format!("Invoice {month}/{year}"));
            store.insert(if month <= 3 { doc.paid() } else { doc });
        }
        let next = Utc.with_ymd_and_hms(year + 1, 1, 10, 0, 0, 0).unwrap();
        store.insert(Commitment::new(format!("c-{tenant:02}-next"), format!("company_{tenant}"), next, 250.0));
    }
    println!("📦 Seeded {} commitments (40ms simulated latency per read)", store.len());

    let layer = ReadLayer::new(ReadLayerConfig::default(), store.clone());
    layer.start();
    println!("   State: {}", layer.state());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Lazy views, critical first
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🖥️  Opening the dashboard for company_1...");
    let filters = Filters::new().tenant("company_1").year(year);

    let table = {
        let optimizer = layer.optimizer().clone();
        let filters = filters.clone();
        layer.lazy(
            PAYMENTS.key("company_1"),
            move || {
                let optimizer = optimizer.clone();
                let filters = filters.clone();
                async move {
                    let page = optimizer.fetch_page(&filters, &Pagination::default()).await?;
                    Ok::<_, StoreError>(page.records)
                }
            },
            RequestOptions::new(Priority::High),
        )
    };
    let stats = {
        let optimizer = layer.optimizer().clone();
        let filters = filters.clone();
        layer.lazy(
            STATS.key("company_1"),
            move || {
                let optimizer = optimizer.clone();
                let filters = filters.clone();
                async move { optimizer.aggregated_stats(&filters).await }
            },
            RequestOptions::new(Priority::Normal),
        )
    };
    let labels = layer.lazy(
        LABELS.key("company_1"),
        || async { Ok::<_, StoreError>(vec!["rent".to_string(), "utilities".to_string()]) },
        RequestOptions::new(Priority::Low).ttl(Duration::from_secs(3600)),
    );

    let start = Instant::now();
    let rows = table.subscribe().wait_for(|s| s.data.is_some()).await?.data.clone().unwrap_or_default();
    println!("   └─ Table ready: {} rows ({:?})", rows.len(), start.elapsed());
    let totals = stats.subscribe().wait_for(|s| s.data.is_some()).await?.data.clone().unwrap_or_default();
    println!(
        "   └─ Stats ready: total={} paid={} pending={} overdue={} ({:?})",
        totals.total, totals.paid, totals.pending, totals.overdue, start.elapsed()
    );
    labels.subscribe().wait_for(|s| s.data.is_some()).await?;
    println!("   └─ Labels ready ({:?})", start.elapsed());

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Navigate away and back
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔁 Revisiting the dashboard...");
    let reads_before = store.reads();
    let start = Instant::now();
    table.refetch().await?;
    let optimizer = layer.optimizer().clone();
    let again = layer
        .scheduler()
        .request(
            &STATS.key("company_1"),
            move || {
                let optimizer = optimizer.clone();
                let filters = filters.clone();
                async move { optimizer.aggregated_stats(&filters).await }
            },
            RequestOptions::new(Priority::Normal),
        )
        .await?;
    println!(
        "   └─ Table refetched, stats from cache (total={}) in {:?}, {} new remote read(s)",
        again.total,
        start.elapsed(),
        store.reads() - reads_before
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Portfolio view across tenants
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Loading the portfolio view for 25 companies...");
    let ids: Vec<String> = (0..25).map(|t| format!("company_{t}")).collect();
    let start = Instant::now();
    let portfolio = layer
        .optimizer()
        .query_by_identifiers(&ids, &Filters::new().year(year))
        .await?;
    println!(
        "   └─ {} commitments in {:?} (3 concurrent batches)",
        portfolio.len(),
        start.elapsed()
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Prefetch next year
    // ─────────────────────────────────────────────────────────────────────────
    let november = Utc.with_ymd_and_hms(year, 11, 15, 0, 0, 0).unwrap();
    if let Some(handle) = layer
        .optimizer()
        .prefetch_at(&Filters::new().tenant("company_1").year(year), november)
    {
        handle.await?;
        let warmed = layer
            .optimizer()
            .cached_prefetch(&Filters::new().tenant("company_1").year(year + 1))
            .unwrap_or_default();
        println!("\n🔮 Prefetched {} commitment(s) for {}", warmed.len(), year + 1);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Summary and metrics
    // ─────────────────────────────────────────────────────────────────────────
    drop((table, stats, labels));
    let summary = layer.shutdown();
    println!("\n📈 Session summary");
    println!("   {summary}");
    println!("   Saved ≈ ${:.6} through cache hits", summary.estimated_savings_usd);

    dump_metrics(&snapshotter);
    println!("\n✅ Done. State: {}", layer.state());
    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<(String, String, u64)> = vec![];
    let mut gauges: Vec<(String, String, f64)> = vec![];
    let mut histograms: Vec<(String, String, usize, f64)> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let avg = if count > 0 {
                    samples.iter().map(|v| v.into_inner()).sum::<f64>() / count as f64
                } else {
                    0.0
                };
                histograms.push((name, label_str, count, avg));
            }
        }
    }

    counters.sort();
    gauges.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
    histograms.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

    println!("\n📉 Counters");
    for (name, labels, value) in counters {
        println!("   {name}{labels} = {value}");
    }
    println!("\n📏 Gauges");
    for (name, labels, value) in gauges {
        println!("   {name}{labels} = {value:.6}");
    }
    println!("\n⏱️  Histograms");
    for (name, labels, count, avg) in histograms {
        println!("   {name}{labels} count={count} avg={avg:.4}s");
    }
}
