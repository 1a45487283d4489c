//! Configuration Module
//!
//! Loads cache configuration from environment variables once at startup.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{
    default_policy, CacheCategory, CachePolicy, DistributedConfig, EvictionPolicy,
    PolicyResolver, ProviderKind,
};
use crate::error::{CacheError, Result};

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Provider backing every category
    pub provider: ProviderKind,
    /// Key prefix isolating this cache in a shared store
    pub namespace: String,
    /// Local entry bound, 0 = unbounded
    pub max_entries: usize,
    /// Victim selection when the local bound is hit
    pub eviction: EvictionPolicy,
    /// Background expired-entry purge interval in seconds
    pub cleanup_interval: u64,
    /// Metrics summary log interval in seconds
    pub metrics_interval: u64,
    pub distributed: DistributedConfig,
    pub policies: PolicyResolver,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_PROVIDER` - `local` or `distributed` (default: local)
    /// - `CACHE_NAMESPACE` - Key namespace (default: identity)
    /// - `CACHE_MAX_ENTRIES` - Local entry bound, 0 = unbounded (default: 0)
    /// - `CACHE_EVICTION` - `lru` or `soonest-expiring` (default: lru)
    /// - `CACHE_CLEANUP_INTERVAL` - Purge frequency in seconds (default: 60)
    /// - `CACHE_METRICS_INTERVAL` - Metrics log frequency in seconds (default: 300)
    /// - `REDIS_HOST`, `REDIS_PORT`, `REDIS_USERNAME`, `REDIS_PASSWORD`,
    ///   `REDIS_TLS`, `REDIS_DB` - Distributed store connection
    /// - `CACHE_<CATEGORY>_TTL_MINUTES`, `CACHE_<CATEGORY>_SLIDING_MINUTES`,
    ///   `CACHE_<CATEGORY>_COMPRESSION`, `CACHE_<CATEGORY>_COMPRESSION_THRESHOLD`,
    ///   `CACHE_<CATEGORY>_PROVIDER` - Per-category policy overrides
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let mut policies = PolicyResolver::new();
        for category in CacheCategory::ALL {
            policies = policies.with_policy(category, policy_from_env(category)?);
        }

        Ok(Self {
            provider: env_parse("CACHE_PROVIDER", defaults.provider)?,
            namespace: env::var("CACHE_NAMESPACE").unwrap_or(defaults.namespace),
            max_entries: env_parse("CACHE_MAX_ENTRIES", defaults.max_entries)?,
            eviction: env_parse("CACHE_EVICTION", defaults.eviction)?,
            cleanup_interval: env_parse("CACHE_CLEANUP_INTERVAL", defaults.cleanup_interval)?,
            metrics_interval: env_parse("CACHE_METRICS_INTERVAL", defaults.metrics_interval)?,
            distributed: DistributedConfig {
                host: env::var("REDIS_HOST").unwrap_or(defaults.distributed.host),
                port: env_parse("REDIS_PORT", defaults.distributed.port)?,
                username: env::var("REDIS_USERNAME").ok().filter(|v| !v.is_empty()),
                password: env::var("REDIS_PASSWORD").ok().filter(|v| !v.is_empty()),
                tls: env_parse("REDIS_TLS", defaults.distributed.tls)?,
                database: env_parse("REDIS_DB", defaults.distributed.database)?,
            },
            policies,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Local,
            namespace: "identity".to_string(),
            max_entries: 0,
            eviction: EvictionPolicy::LeastRecentlyUsed,
            cleanup_interval: 60,
            metrics_interval: 300,
            distributed: DistributedConfig::default(),
            policies: PolicyResolver::new(),
        }
    }
}

// == Helpers ==
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| CacheError::Config(format!("{}={}: {}", name, raw, e))),
        _ => Ok(default),
    }
}

fn policy_from_env(category: CacheCategory) -> Result<CachePolicy> {
    let base = default_policy(category);
    let var = |suffix: &str| format!("CACHE_{}_{}", category.env_name(), suffix);

    let absolute = env_minutes(&var("TTL_MINUTES"), base.absolute_ttl)?;
    let sliding = env_minutes(&var("SLIDING_MINUTES"), base.sliding_ttl)?;

    Ok(CachePolicy {
        provider: env_parse(&var("PROVIDER"), base.provider)?,
        absolute_ttl: absolute,
        sliding_ttl: sliding,
        compression_enabled: env_parse(&var("COMPRESSION"), base.compression_enabled)?,
        compression_threshold_bytes: env_parse(
            &var("COMPRESSION_THRESHOLD"),
            base.compression_threshold_bytes,
        )?,
    })
}

/// Reads a minute count; 0 disables the TTL, negatives are rejected.
fn env_minutes(name: &str, default: Option<Duration>) -> Result<Option<Duration>> {
    let Ok(raw) = env::var(name) else {
        return Ok(default);
    };
    let minutes: i64 = raw
        .trim()
        .parse()
        .map_err(|e| CacheError::Config(format!("{}={}: {}", name, raw, e)))?;
    match minutes {
        m if m < 0 => Err(CacheError::Config(format!(
            "{} must not be negative, got {}",
            name, m
        ))),
        0 => Ok(None),
        m => (m as u64)
            .checked_mul(60)
            .map(|secs| Some(Duration::from_secs(secs)))
            .ok_or_else(|| CacheError::Config(format!("{}={} is out of range", name, m))),
    }
}
