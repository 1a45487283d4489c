//! Cache Service Module
//!
//! The public cache API. Resolves category policies, encodes values,
//! dispatches to the configured provider and records metrics for every
//! operation.
//!
//! Backend failures never reach the caller: they are logged and reported
//! as a miss, `false`, `0` or `-2`. Serialization, decode and argument
//! errors are returned as-is.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::codec::{self, DecodedValue};
use crate::cache::entry::current_timestamp_ms;
use crate::cache::invalidation::InvalidationEngine;
use crate::cache::keys::InvalidationEvent;
use crate::cache::provider::{
    CacheProvider, DistributedProvider, LocalProvider, TtlState,
};
use crate::cache::single_flight::{FlightError, FlightResult, SingleFlight};
use crate::cache::{
    CacheCategory, CacheMetrics, GlobPattern, MetricsSnapshot, PolicyResolver, ProviderKind,
    MAX_KEY_LENGTH,
};
use crate::config::Config;
use crate::error::{CacheError, Result};

/// Sentinel TTL for a key that does not exist.
pub const TTL_MISSING: i64 = -2;
/// Sentinel TTL for a key without expiration.
pub const TTL_PERSISTENT: i64 = -1;

struct Inner {
    provider: Arc<dyn CacheProvider>,
    policies: PolicyResolver,
    metrics: Arc<CacheMetrics>,
    invalidation: InvalidationEngine,
    flights: SingleFlight,
}

// == Cache Service ==
/// Cheap to clone; clones share provider, metrics and in-flight registry.
#[derive(Clone)]
pub struct CacheService {
    inner: Arc<Inner>,
}

impl CacheService {
    // == Constructors ==
    pub fn new(
        provider: Arc<dyn CacheProvider>,
        policies: PolicyResolver,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        let policies = policies.pin_provider(provider.kind());
        let invalidation = InvalidationEngine::new(Arc::clone(&provider), Arc::clone(&metrics));
        Self {
            inner: Arc::new(Inner {
                provider,
                policies,
                metrics,
                invalidation,
                flights: SingleFlight::new(),
            }),
        }
    }

    /// Unbounded local cache with its own metrics collector.
    pub fn local(policies: PolicyResolver) -> Self {
        let metrics = Arc::new(CacheMetrics::new());
        let provider = Arc::new(LocalProvider::new(Arc::clone(&metrics)));
        Self::new(provider, policies, metrics)
    }

    /// Builds the provider selected by configuration, reporting into the
    /// process-wide metrics collector.
    pub fn from_config(config: &Config) -> Result<Self> {
        let metrics = CacheMetrics::global();
        let provider: Arc<dyn CacheProvider> = match config.provider {
            ProviderKind::Local => Arc::new(
                LocalProvider::new(Arc::clone(&metrics))
                    .with_capacity(config.max_entries, config.eviction),
            ),
            ProviderKind::Distributed => Arc::new(DistributedProvider::connect(
                &config.distributed,
                config.namespace.clone(),
            )?),
        };
        Ok(Self::new(provider, config.policies.clone(), metrics))
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.inner.provider.kind()
    }

    pub fn policies(&self) -> &PolicyResolver {
        &self.inner.policies
    }

    /// Point-in-time metrics snapshot.
    pub fn summary(&self) -> MetricsSnapshot {
        self.inner.metrics.summary()
    }

    // == Get ==
    /// Returns the value stored under `key`, or None on miss or expiry.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;
        let start = Instant::now();

        match self.lookup(key).await? {
            Some(decoded) => {
                let value = decoded.deserialize::<T>()?;
                self.inner
                    .metrics
                    .record_hit(decoded.category, start.elapsed());
                debug!(key = %key, category = %decoded.category, "cache hit");
                Ok(Some(value))
            }
            None => {
                self.inner
                    .metrics
                    .record_miss(CacheCategory::Default, start.elapsed());
                debug!(key = %key, "cache miss");
                Ok(None)
            }
        }
    }

    /// Reads and decodes an entry, applying passive expiration against the
    /// absolute deadline and refreshing the sliding window.
    async fn lookup(&self, key: &str) -> Result<Option<DecodedValue>> {
        let provider = &self.inner.provider;
        let Some(bytes) = degrade("get", key, provider.raw_get(key).await, None)? else {
            return Ok(None);
        };
        let decoded = codec::decode(&bytes)?;

        let now = current_timestamp_ms();
        if let Some(deadline) = decoded.absolute_deadline {
            if now >= deadline {
                if let Ok(Some(_)) = provider.raw_delete(key).await {
                    self.inner.metrics.record_expiration(decoded.category);
                }
                return Ok(None);
            }
        }

        let policy = self.inner.policies.resolve(decoded.category);
        if let Some(sliding) = policy.sliding_ttl {
            let ttl = match decoded.absolute_deadline {
                Some(deadline) => sliding.min(Duration::from_millis(deadline - now)),
                None => sliding,
            };
            if let Err(e) = provider.raw_expire(key, ttl).await {
                warn!(key = %key, error = %e, "sliding expiration refresh failed");
            }
        }

        Ok(Some(decoded))
    }

    // == Set ==
    /// Stores `value` under `key` with the TTL of `category`.
    ///
    /// Returns false when the backend is unavailable.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        category: CacheCategory,
    ) -> Result<bool> {
        validate_key(key)?;
        let payload = codec::to_payload(value)?;
        self.store(key, &payload, category, None).await
    }

    /// Like [`CacheService::set`] with an explicit absolute lifetime.
    pub async fn set_with_ttl<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        category: CacheCategory,
        ttl: Duration,
    ) -> Result<bool> {
        validate_key(key)?;
        if ttl.is_zero() {
            return Err(CacheError::InvalidArgument(
                "TTL must be greater than zero".to_string(),
            ));
        }
        let payload = codec::to_payload(value)?;
        self.store(key, &payload, category, Some(ttl)).await
    }

    async fn store(
        &self,
        key: &str,
        payload: &[u8],
        category: CacheCategory,
        ttl_override: Option<Duration>,
    ) -> Result<bool> {
        let policy = self.inner.policies.resolve(category);
        let now = current_timestamp_ms();
        let lifetime = ttl_override.or(policy.absolute_ttl);
        let ttl = match ttl_override {
            Some(ttl) => Some(policy.sliding_ttl.map_or(ttl, |s| s.min(ttl))),
            None => policy.initial_ttl(),
        };
        let deadline =
            lifetime.map(|l| now.saturating_add(l.as_millis().min(u64::MAX as u128) as u64));

        let bytes = codec::encode(category, deadline, payload, policy)?;
        let written = self.inner.provider.raw_set(key, bytes, ttl).await;
        match degrade("set", key, written.map(Some), None)? {
            Some(previous) => {
                self.track_replaced(category, previous.as_deref());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Moves the item from the replaced entry's category to the new one.
    fn track_replaced(&self, category: CacheCategory, previous: Option<&[u8]>) {
        let metrics = &self.inner.metrics;
        match previous.map(codec::peek_category) {
            Some(old) if old == category => {}
            Some(old) => {
                metrics.record_item_removed(old);
                metrics.record_item_added(category);
            }
            None => metrics.record_item_added(category),
        }
    }

    // == Remove ==
    /// True iff the key existed and was deleted.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let removed = degrade("remove", key, self.inner.provider.raw_delete(key).await, None)?;
        match removed {
            Some(bytes) => {
                self.inner
                    .metrics
                    .record_item_removed(codec::peek_category(&bytes));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        degrade("exists", key, self.inner.provider.raw_exists(key).await, false)
    }

    // == Get Or Set ==
    /// Returns the cached value, or computes, stores and returns it.
    ///
    /// Concurrent callers for the same key share a single factory run. The
    /// run continues even if every caller stops waiting, so the entry still
    /// gets populated.
    pub async fn get_or_set<T, F, Fut, E>(
        &self,
        key: &str,
        category: CacheCategory,
        factory: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        if let Some(value) = self.get::<T>(key).await? {
            return Ok(value);
        }

        let this = self.clone();
        let owned_key = key.to_string();
        let work = async move { this.populate(owned_key, category, factory).await };

        let payload = self.inner.flights.run(key, work).await?;
        Ok(serde_json::from_slice(&payload)?)
    }

    async fn populate<T, F, Fut, E>(
        &self,
        key: String,
        category: CacheCategory,
        factory: F,
    ) -> FlightResult
    where
        T: Serialize + Send,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        // A flight that just finished may have filled the entry
        if let Ok(Some(decoded)) = self.lookup(&key).await {
            return Ok(Arc::new(decoded.payload));
        }

        let value = factory()
            .await
            .map_err(|e| FlightError::Factory(e.to_string()))?;
        let payload =
            codec::to_payload(&value).map_err(|e| FlightError::Serialization(e.to_string()))?;

        if let Err(e) = self.store(&key, &payload, category, None).await {
            warn!(key = %key, error = %e, "computed value could not be cached");
        }
        Ok(Arc::new(payload))
    }

    // == Counters ==
    /// Atomically adds `delta`, starting from 0 for a missing key.
    ///
    /// Returns None when the backend is unavailable.
    pub async fn increment(&self, key: &str, delta: i64) -> Result<Option<i64>> {
        validate_key(key)?;
        let outcome = self.inner.provider.raw_increment(key, delta).await;
        let Some((value, created)) = degrade("increment", key, outcome.map(Some), None)? else {
            return Ok(None);
        };
        if created {
            // Counters are untagged and count under the default category
            self.inner.metrics.record_item_added(CacheCategory::Default);
        }
        Ok(Some(value))
    }

    pub async fn decrement(&self, key: &str, delta: i64) -> Result<Option<i64>> {
        let negated = delta.checked_neg().ok_or_else(|| {
            CacheError::InvalidArgument(format!("Cannot decrement by {}", delta))
        })?;
        self.increment(key, negated).await
    }

    // == Expiration ==
    /// Re-applies the category TTL to an existing key, keeping its value.
    pub async fn refresh_expiration(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let provider = &self.inner.provider;
        let Some(bytes) = degrade("refresh", key, provider.raw_get(key).await, None)? else {
            return Ok(false);
        };
        let decoded = codec::decode(&bytes)?;
        let policy = self.inner.policies.resolve(decoded.category);

        if !codec::is_envelope(&bytes) {
            return match policy.initial_ttl() {
                Some(ttl) => degrade("refresh", key, provider.raw_expire(key, ttl).await, false),
                None => Ok(true),
            };
        }

        // The absolute deadline lives in the envelope, so rewrite it
        self.store(key, &decoded.payload, decoded.category, None)
            .await
    }

    /// Seconds until `key` expires, rounded up; -1 without expiration, -2
    /// when the key does not exist.
    pub async fn time_to_live(&self, key: &str) -> Result<i64> {
        validate_key(key)?;
        let state = degrade(
            "ttl",
            key,
            self.inner.provider.raw_ttl(key).await,
            TtlState::Missing,
        )?;
        Ok(match state {
            TtlState::Missing => TTL_MISSING,
            TtlState::Persistent => TTL_PERSISTENT,
            TtlState::Expires(remaining) => remaining.as_millis().div_ceil(1000) as i64,
        })
    }

    // == Invalidation ==
    /// Removes every key matching a glob pattern (`*` = any run).
    pub async fn remove_by_pattern(&self, pattern: &str) -> Result<usize> {
        let pattern = GlobPattern::new(pattern)?;
        match self.inner.invalidation.invalidate(&pattern).await {
            Ok(result) => Ok(result.removed),
            Err(e) if e.is_transient() => {
                warn!(pattern = %pattern, error = %e, "cache backend unavailable, nothing invalidated");
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Applies every pattern of a domain event.
    pub async fn invalidate(&self, event: &InvalidationEvent) -> Result<usize> {
        let mut removed = 0;
        for pattern in event.patterns() {
            removed += self.remove_by_pattern(&pattern).await?;
        }
        Ok(removed)
    }

    /// Removes every key of this cache's namespace.
    pub async fn clear(&self) -> Result<bool> {
        match self.inner.provider.raw_clear_namespace().await {
            Ok(removed) => {
                self.inner.metrics.reset_items();
                info!(removed, "cache cleared");
                Ok(true)
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "cache backend unavailable, clear skipped");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Drops expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        match self.inner.provider.purge_expired().await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "expired entry purge failed");
                0
            }
        }
    }
}

// == Helpers ==
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidArgument(
            "Key must not be empty".to_string(),
        ));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidArgument(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

/// Turns a backend failure into `fallback`, logging it.
fn degrade<T>(operation: &str, key: &str, result: Result<T>, fallback: T) -> Result<T> {
    match result {
        Err(e) if e.is_transient() => {
            warn!(operation, key = %key, error = %e, "cache backend unavailable, degrading");
            Ok(fallback)
        }
        other => other,
    }
}
