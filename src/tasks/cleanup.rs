//! Expiry Cleanup Task
//!
//! Background task that periodically removes expired cache entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheService;

/// Spawns a background task that periodically purges expired entries.
///
/// Lazy expiration already hides stale entries from readers; this task
/// reclaims the memory of entries nobody reads again. Providers with native
/// expiry report nothing to purge.
///
/// # Arguments
/// * `cache` - The cache service to purge
/// * `cleanup_interval_secs` - Interval in seconds between cleanup runs
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_cleanup_task(cache: CacheService, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry cleanup task with interval of {} seconds",
            cleanup_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.purge_expired().await;

            if removed > 0 {
                info!("Expiry cleanup: removed {} expired entries", removed);
            } else {
                debug!("Expiry cleanup: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheCategory, PolicyResolver};

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let cache = CacheService::local(PolicyResolver::new());
        cache
            .set_with_ttl(
                "expire_soon",
                &"value",
                CacheCategory::Default,
                Duration::from_millis(200),
            )
            .await
            .unwrap();

        let handle = spawn_cleanup_task(cache.clone(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let summary = cache.summary();
        assert_eq!(summary.counters.expirations, 1);
        assert_eq!(summary.counters.current_items, 0);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let cache = CacheService::local(PolicyResolver::new());
        cache
            .set("long_lived", &"value", CacheCategory::Default)
            .await
            .unwrap();

        let handle = spawn_cleanup_task(cache.clone(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let value: Option<String> = cache.get("long_lived").await.unwrap();
        assert_eq!(value.as_deref(), Some("value"));
        assert_eq!(cache.summary().counters.expirations, 0);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let cache = CacheService::local(PolicyResolver::new());

        let handle = spawn_cleanup_task(cache, 1);

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
