//! Expiration Policy Module
//!
//! Maps each cache category to its expiration and compression policy.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::cache::CacheCategory;
use crate::error::CacheError;

/// Default size above which payloads are compressed.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;

// == Provider Kind ==
/// Which provider variant backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// In-process concurrent map
    #[default]
    Local,
    /// Shared network key-value store
    Distributed,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Local => f.write_str("local"),
            ProviderKind::Distributed => f.write_str("distributed"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "memory" => Ok(ProviderKind::Local),
            "distributed" | "redis" => Ok(ProviderKind::Distributed),
            other => Err(CacheError::Config(format!("Unknown cache provider: {}", other))),
        }
    }
}

// == Cache Policy ==
/// Expiration and compression settings for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub provider: ProviderKind,
    /// Lifetime measured from write time, None = never expires
    pub absolute_ttl: Option<Duration>,
    /// Idle window reset on every read
    pub sliding_ttl: Option<Duration>,
    pub compression_enabled: bool,
    pub compression_threshold_bytes: usize,
}

impl CachePolicy {
    /// Creates a policy with an absolute TTL in minutes and compression on.
    pub fn minutes(absolute: u64) -> Self {
        Self {
            provider: ProviderKind::Local,
            absolute_ttl: Some(Duration::from_secs(absolute.saturating_mul(60))),
            sliding_ttl: None,
            compression_enabled: true,
            compression_threshold_bytes: DEFAULT_COMPRESSION_THRESHOLD,
        }
    }

    pub fn with_sliding_minutes(mut self, sliding: u64) -> Self {
        self.sliding_ttl = Some(Duration::from_secs(sliding.saturating_mul(60)));
        self
    }

    /// TTL handed to the provider on write.
    ///
    /// With a sliding window the entry first lives for the window, capped by
    /// the absolute lifetime.
    pub fn initial_ttl(&self) -> Option<Duration> {
        match (self.absolute_ttl, self.sliding_ttl) {
            (Some(absolute), Some(sliding)) => Some(absolute.min(sliding)),
            (None, Some(sliding)) => Some(sliding),
            (absolute, None) => absolute,
        }
    }

    /// Whether a payload of `size` bytes should be compressed.
    pub fn should_compress(&self, size: usize) -> bool {
        self.compression_enabled && size > self.compression_threshold_bytes
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::minutes(30)
    }
}

// == Policy Resolver ==
/// Resolves a category to its shared, immutable policy.
#[derive(Debug, Clone)]
pub struct PolicyResolver {
    policies: [Arc<CachePolicy>; CacheCategory::COUNT],
}

impl PolicyResolver {
    /// Creates a resolver with the built-in per-category defaults.
    pub fn new() -> Self {
        Self {
            policies: std::array::from_fn(|i| {
                Arc::new(default_policy(CacheCategory::from_index(i)))
            }),
        }
    }

    /// Replaces the policy of one category.
    pub fn with_policy(mut self, category: CacheCategory, policy: CachePolicy) -> Self {
        self.policies[category.index()] = Arc::new(policy);
        self
    }

    /// Returns the policy for a category.
    pub fn resolve(&self, category: CacheCategory) -> &Arc<CachePolicy> {
        &self.policies[category.index()]
    }

    /// Forces every category onto one provider.
    ///
    /// Key-addressed operations carry no category, so a key must live in
    /// exactly one store.
    pub fn pin_provider(mut self, provider: ProviderKind) -> Self {
        for slot in self.policies.iter_mut() {
            if slot.provider != provider {
                let mut policy = (**slot).clone();
                policy.provider = provider;
                *slot = Arc::new(policy);
            }
        }
        self
    }
}

impl Default for PolicyResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Built-in policy for a category.
pub fn default_policy(category: CacheCategory) -> CachePolicy {
    match category {
        CacheCategory::Directory => CachePolicy::minutes(30).with_sliding_minutes(10),
        CacheCategory::Configuration => CachePolicy::minutes(60),
        CacheCategory::Principal => CachePolicy::minutes(15).with_sliding_minutes(5),
        CacheCategory::Role => CachePolicy::minutes(30),
        CacheCategory::Permission => CachePolicy::minutes(60),
        CacheCategory::Default => CachePolicy::minutes(30),
    }
}
