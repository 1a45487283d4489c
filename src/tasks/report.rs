//! Metrics Reporter Task
//!
//! Polls the metrics summary and logs it.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::CacheService;

/// Spawns a task logging the metrics summary every `interval_secs`.
pub fn spawn_metrics_reporter(cache: CacheService, interval_secs: u64) -> JoinHandle<()> {
    let period = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let summary = cache.summary();
            info!(
                requests = summary.counters.total_requests,
                hit_rate = %format!("{:.1}", summary.hit_rate()),
                avg_hit_ms = %format!("{:.3}", summary.counters.avg_hit_latency_ms()),
                avg_miss_ms = %format!("{:.3}", summary.counters.avg_miss_latency_ms()),
                items = summary.counters.current_items,
                evictions = summary.counters.evictions,
                expirations = summary.counters.expirations,
                "cache metrics"
            );
            for (category, snapshot) in &summary.categories {
                info!(
                    category = %category,
                    requests = snapshot.counters.total_requests,
                    hit_rate = %format!("{:.1}", snapshot.counters.hit_rate()),
                    items = snapshot.counters.current_items,
                    "cache metrics by category"
                );
            }
        }
    })
}
