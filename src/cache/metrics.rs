//! Cache Metrics Module
//!
//! Process-wide hit/miss/latency counters, aggregated globally and per
//! category. All updates are lock-free atomics.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::cache::CacheCategory;

static GLOBAL: OnceLock<Arc<CacheMetrics>> = OnceLock::new();

// == Counters ==
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    hit_latency_us: AtomicU64,
    miss_latency_us: AtomicU64,
    current_items: AtomicI64,
    expirations: AtomicU64,
    evictions: AtomicU64,
    last_update_ms: AtomicI64,
}

impl Counters {
    fn touch(&self, now: i64) {
        self.last_update_ms.fetch_max(now, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CounterSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CounterSnapshot {
            total_requests: hits + misses,
            hits,
            misses,
            total_hit_latency_ms: self.hit_latency_us.load(Ordering::Relaxed) as f64 / 1000.0,
            total_miss_latency_ms: self.miss_latency_us.load(Ordering::Relaxed) as f64 / 1000.0,
            current_items: self.current_items.load(Ordering::Relaxed).max(0) as u64,
            expirations: self.expirations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

// == Cache Metrics ==
/// Metrics collector shared by every cache operation.
#[derive(Debug)]
pub struct CacheMetrics {
    overall: Counters,
    categories: [Counters; CacheCategory::COUNT],
    start_time: DateTime<Utc>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        let now = Utc::now();
        let metrics = Self {
            overall: Counters::default(),
            categories: std::array::from_fn(|_| Counters::default()),
            start_time: now,
        };
        metrics
            .overall
            .last_update_ms
            .store(now.timestamp_millis(), Ordering::Relaxed);
        metrics
    }

    /// The process-wide collector, created on first use.
    pub fn global() -> Arc<CacheMetrics> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(CacheMetrics::new())))
    }

    fn update(&self, category: CacheCategory, f: impl Fn(&Counters)) {
        let now = Utc::now().timestamp_millis();
        for counters in [&self.overall, &self.categories[category.index()]] {
            f(counters);
            counters.touch(now);
        }
    }

    // == Reads ==
    pub fn record_hit(&self, category: CacheCategory, elapsed: Duration) {
        let us = elapsed.as_micros() as u64;
        self.update(category, |c| {
            c.hits.fetch_add(1, Ordering::Relaxed);
            c.hit_latency_us.fetch_add(us, Ordering::Relaxed);
        });
    }

    pub fn record_miss(&self, category: CacheCategory, elapsed: Duration) {
        let us = elapsed.as_micros() as u64;
        self.update(category, |c| {
            c.misses.fetch_add(1, Ordering::Relaxed);
            c.miss_latency_us.fetch_add(us, Ordering::Relaxed);
        });
    }

    // == Writes ==
    pub fn record_item_added(&self, category: CacheCategory) {
        self.update(category, |c| {
            c.current_items.fetch_add(1, Ordering::Relaxed);
        });
    }

    pub fn record_item_removed(&self, category: CacheCategory) {
        self.update(category, |c| {
            c.current_items.fetch_sub(1, Ordering::Relaxed);
        });
    }

    pub fn record_expiration(&self, category: CacheCategory) {
        self.update(category, |c| {
            c.expirations.fetch_add(1, Ordering::Relaxed);
            c.current_items.fetch_sub(1, Ordering::Relaxed);
        });
    }

    pub fn record_eviction(&self, category: CacheCategory) {
        self.update(category, |c| {
            c.evictions.fetch_add(1, Ordering::Relaxed);
            c.current_items.fetch_sub(1, Ordering::Relaxed);
        });
    }

    /// Zeroes every item gauge after a namespace clear.
    pub fn reset_items(&self) {
        let now = Utc::now().timestamp_millis();
        for counters in std::iter::once(&self.overall).chain(self.categories.iter()) {
            counters.current_items.store(0, Ordering::Relaxed);
            counters.touch(now);
        }
    }

    // == Summary ==
    /// Point-in-time copy of all counters.
    pub fn summary(&self) -> MetricsSnapshot {
        let categories = CacheCategory::ALL
            .iter()
            .map(|category| {
                let counters = &self.categories[category.index()];
                (
                    category.as_str().to_string(),
                    CategorySnapshot {
                        counters: counters.snapshot(),
                        last_update_time: millis_to_utc(
                            counters.last_update_ms.load(Ordering::Relaxed),
                        ),
                    },
                )
            })
            .filter(|(_, snapshot)| snapshot.last_update_time.is_some())
            .collect();

        MetricsSnapshot {
            counters: self.overall.snapshot(),
            start_time: self.start_time,
            last_update_time: millis_to_utc(self.overall.last_update_ms.load(Ordering::Relaxed))
                .unwrap_or(self.start_time),
            categories,
        }
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    if ms == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(ms).single()
}

// == Snapshots ==
/// Counter values at one instant. Derived rates are computed on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CounterSnapshot {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub total_hit_latency_ms: f64,
    pub total_miss_latency_ms: f64,
    pub current_items: u64,
    pub expirations: u64,
    pub evictions: u64,
}

impl CounterSnapshot {
    /// Hit rate as a percentage, 0 when nothing was requested.
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64 * 100.0
        }
    }

    pub fn avg_hit_latency_ms(&self) -> f64 {
        if self.hits == 0 {
            0.0
        } else {
            self.total_hit_latency_ms / self.hits as f64
        }
    }

    pub fn avg_miss_latency_ms(&self) -> f64 {
        if self.misses == 0 {
            0.0
        } else {
            self.total_miss_latency_ms / self.misses as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySnapshot {
    #[serde(flatten)]
    pub counters: CounterSnapshot,
    pub last_update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    #[serde(flatten)]
    pub counters: CounterSnapshot,
    pub start_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    /// Only categories that have seen activity
    pub categories: BTreeMap<String, CategorySnapshot>,
}

impl MetricsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        self.counters.hit_rate()
    }

    pub fn category(&self, category: CacheCategory) -> Option<&CategorySnapshot> {
        self.categories.get(category.as_str())
    }
}
