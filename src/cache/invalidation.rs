//! Cache invalidation with pattern matching support.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::cache::codec::peek_category;
use crate::cache::provider::CacheProvider;
use crate::cache::{CacheMetrics, GlobPattern};
use crate::error::Result;

/// Deletes issued concurrently during one invalidation.
const DELETE_CONCURRENCY: usize = 16;

/// Outcome of one pattern invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationResult {
    pub pattern: String,
    /// Keys that matched the full pattern
    pub matched: usize,
    /// Keys actually deleted
    pub removed: usize,
    /// Deletes that failed
    pub failed: usize,
}

/// Removes keys matching glob patterns.
#[derive(Clone)]
pub struct InvalidationEngine {
    provider: Arc<dyn CacheProvider>,
    metrics: Arc<CacheMetrics>,
}

impl InvalidationEngine {
    pub fn new(provider: Arc<dyn CacheProvider>, metrics: Arc<CacheMetrics>) -> Self {
        Self { provider, metrics }
    }

    /// Removes every key matching `pattern`.
    ///
    /// Candidates come from a prefix scan on the pattern's literal prefix
    /// and are then tested against the whole pattern. Failed deletes are
    /// logged and skipped; only a failed scan is an error.
    pub async fn invalidate(&self, pattern: &GlobPattern) -> Result<InvalidationResult> {
        let candidates = if pattern.is_literal() {
            vec![pattern.as_str().to_string()]
        } else {
            self.provider.raw_scan_prefix(pattern.literal_prefix()).await?
        };

        let matches: Vec<String> = candidates
            .into_iter()
            .filter(|key| pattern.matches(key))
            .collect();
        let matched = matches.len();

        let outcomes: Vec<_> = stream::iter(matches)
            .map(|key| async move {
                let outcome = self.provider.raw_delete(&key).await;
                (key, outcome)
            })
            .buffer_unordered(DELETE_CONCURRENCY)
            .collect()
            .await;

        let mut removed = 0;
        let mut failed = 0;
        for (key, outcome) in outcomes {
            match outcome {
                Ok(Some(bytes)) => {
                    self.metrics.record_item_removed(peek_category(&bytes));
                    removed += 1;
                }
                // Gone between scan and delete
                Ok(None) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "invalidation delete failed");
                    failed += 1;
                }
            }
        }

        if removed > 0 {
            info!(pattern = %pattern, removed, failed, "Cache entries invalidated by pattern");
        } else {
            debug!(pattern = %pattern, "no cache entries matched pattern");
        }

        Ok(InvalidationResult {
            pattern: pattern.to_string(),
            matched,
            removed,
            failed,
        })
    }
}
