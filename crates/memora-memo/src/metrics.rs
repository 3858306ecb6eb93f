//! Memoizer metrics collection and reporting.
//!
//! Provides observability into cache behaviour with support for
//! Prometheus and JSON export formats.
//!
//! ## Example
//!
//! ```rust
//! use memora_memo::classify::Table;
//! use memora_memo::metrics::MemoMetrics;
//!
//! let metrics = MemoMetrics::new();
//!
//! metrics.record_miss();
//! metrics.record_store();
//! metrics.record_hit(Table::Canonical);
//!
//! println!("{}", metrics.export_prometheus());
//! println!("{}", metrics.export_json());
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::classify::Table;

/// Thread-safe memoizer metrics collector.
///
/// All operations are lock-free.
#[derive(Debug)]
pub struct MemoMetrics {
    /// Hits served from the identity table
    identity_hits: AtomicU64,
    /// Hits served from the canonical table
    canonical_hits: AtomicU64,
    /// Lookups that had to invoke the wrapped callable
    misses: AtomicU64,
    /// Results written to either table
    stores: AtomicU64,
    /// Wrapped-callable invocations that returned an error
    failures: AtomicU64,
    /// Calls that blocked behind another caller's computation
    flight_waits: AtomicU64,
    /// Identity entries dropped because their key instance was gone
    reclaimed: AtomicU64,
    /// Creation time for uptime calculation
    created_at: Instant,
}

impl MemoMetrics {
    /// Create a new metrics collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            identity_hits: AtomicU64::new(0),
            canonical_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            flight_waits: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    /// Record a hit in the given table.
    pub fn record_hit(&self, table: Table) {
        let counter = match table {
            Table::Identity => &self.identity_hits,
            Table::Canonical => &self.canonical_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store(&self) {
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flight_wait(&self) {
        self.flight_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reclaimed(&self, entries: u64) {
        self.reclaimed.fetch_add(entries, Ordering::Relaxed);
    }

    /// Get the current snapshot of metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let identity_hits = self.identity_hits.load(Ordering::Relaxed);
        let canonical_hits = self.canonical_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        MetricsSnapshot {
            identity_hits,
            canonical_hits,
            misses,
            stores: self.stores.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            flight_waits: self.flight_waits.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
            hit_rate: hit_rate(identity_hits + canonical_hits, misses),
            uptime_secs: self.created_at.elapsed().as_secs_f64(),
        }
    }

    /// Get the hit rate (0.0 to 1.0).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits(), self.misses())
    }

    /// Total hits across both tables.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.identity_hits.load(Ordering::Relaxed) + self.canonical_hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Export metrics in Prometheus format.
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let snapshot = self.snapshot();

        format!(
            r#"# HELP memora_memo_hits_total Total number of cache hits by table
# TYPE memora_memo_hits_total counter
memora_memo_hits_total{{table="identity"}} {}
memora_memo_hits_total{{table="canonical"}} {}

# HELP memora_memo_misses_total Total number of cache misses
# TYPE memora_memo_misses_total counter
memora_memo_misses_total {}

# HELP memora_memo_stores_total Total number of results stored
# TYPE memora_memo_stores_total counter
memora_memo_stores_total {}

# HELP memora_memo_failures_total Total number of failed computations
# TYPE memora_memo_failures_total counter
memora_memo_failures_total {}

# HELP memora_memo_flight_waits_total Total number of calls that waited on an in-flight computation
# TYPE memora_memo_flight_waits_total counter
memora_memo_flight_waits_total {}

# HELP memora_memo_reclaimed_total Total number of unreachable identity entries dropped
# TYPE memora_memo_reclaimed_total counter
memora_memo_reclaimed_total {}

# HELP memora_memo_hit_rate Cache hit rate
# TYPE memora_memo_hit_rate gauge
memora_memo_hit_rate {:.4}

# HELP memora_memo_uptime_seconds Memoizer uptime in seconds
# TYPE memora_memo_uptime_seconds gauge
memora_memo_uptime_seconds {:.1}
"#,
            snapshot.identity_hits,
            snapshot.canonical_hits,
            snapshot.misses,
            snapshot.stores,
            snapshot.failures,
            snapshot.flight_waits,
            snapshot.reclaimed,
            snapshot.hit_rate,
            snapshot.uptime_secs,
        )
    }

    /// Export metrics in JSON format.
    #[must_use]
    pub fn export_json(&self) -> String {
        let snapshot = self.snapshot();
        serde_json::to_string_pretty(&snapshot).unwrap_or_else(|_| "{}".to_string())
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.identity_hits.store(0, Ordering::Relaxed);
        self.canonical_hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.stores.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.flight_waits.store(0, Ordering::Relaxed);
        self.reclaimed.store(0, Ordering::Relaxed);
    }
}

impl Default for MemoMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total > 0 {
        hits as f64 / total as f64
    } else {
        0.0
    }
}

/// A point-in-time snapshot of memoizer metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub identity_hits: u64,
    pub canonical_hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub failures: u64,
    pub flight_waits: u64,
    pub reclaimed: u64,
    /// Hit rate (0.0 to 1.0)
    pub hit_rate: f64,
    pub uptime_secs: f64,
}

impl MetricsSnapshot {
    /// Total hits across both tables.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.identity_hits + self.canonical_hits
    }

    /// Get the hit rate as a percentage string.
    #[must_use]
    pub fn hit_rate_percent(&self) -> String {
        format!("{:.1}%", self.hit_rate * 100.0)
    }
}
