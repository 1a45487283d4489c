//! Local Provider
//!
//! In-process provider backed by a sharded concurrent map. Expired entries
//! are dropped lazily on access and actively by the cleanup task.
//!
//! When bounded, a write of a new key into a full map first purges expired
//! entries, then evicts one entry chosen by the [`EvictionPolicy`]. The bound
//! is approximate while several writers race on a full map.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::cache::codec::peek_category;
use crate::cache::entry::{current_timestamp_ms, CacheEntry};
use crate::cache::provider::{CacheProvider, TtlState};
use crate::cache::{CacheMetrics, ProviderKind};
use crate::error::{CacheError, Result};

// == Eviction Policy ==
/// How a bounded local provider picks a victim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Oldest last access goes first
    #[default]
    LeastRecentlyUsed,
    /// Nearest expiration goes first, persistent entries last
    SoonestExpiring,
}

impl FromStr for EvictionPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" | "least-recently-used" => Ok(EvictionPolicy::LeastRecentlyUsed),
            "soonest-expiring" | "ttl" => Ok(EvictionPolicy::SoonestExpiring),
            other => Err(CacheError::Config(format!("Unknown eviction policy: {}", other))),
        }
    }
}

// == Local Provider ==
#[derive(Debug)]
pub struct LocalProvider {
    entries: DashMap<String, CacheEntry>,
    /// None = unbounded
    max_entries: Option<usize>,
    eviction: EvictionPolicy,
    metrics: Arc<CacheMetrics>,
}

impl LocalProvider {
    /// Creates an unbounded provider.
    pub fn new(metrics: Arc<CacheMetrics>) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: None,
            eviction: EvictionPolicy::default(),
            metrics,
        }
    }

    /// Bounds the number of entries. Zero means unbounded.
    pub fn with_capacity(mut self, max_entries: usize, eviction: EvictionPolicy) -> Self {
        self.max_entries = (max_entries > 0).then_some(max_entries);
        self.eviction = eviction;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Expiration ==
    /// Removes `key` if it is expired, recording the expiration.
    fn expire_if_stale(&self, key: &str) {
        let now = current_timestamp_ms();
        if let Some((_, entry)) = self.entries.remove_if(key, |_, e| e.is_expired_at(now)) {
            self.metrics.record_expiration(peek_category(&entry.value));
        }
    }

    fn purge_expired_entries(&self) -> usize {
        let now = current_timestamp_ms();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired_at(now))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if let Some((_, entry)) = self.entries.remove_if(&key, |_, e| e.is_expired_at(now)) {
                self.metrics.record_expiration(peek_category(&entry.value));
                removed += 1;
            }
        }
        removed
    }

    // == Eviction ==
    /// Makes room for `key` when the map is full. Must not be called while
    /// holding a map guard.
    fn make_room_for(&self, key: &str) {
        let Some(max) = self.max_entries else {
            return;
        };
        if self.entries.contains_key(key) {
            return;
        }

        while self.entries.len() >= max {
            if self.purge_expired_entries() > 0 {
                continue;
            }

            let victim = match self.eviction {
                EvictionPolicy::LeastRecentlyUsed => self
                    .entries
                    .iter()
                    .min_by_key(|e| e.value().last_accessed_at())
                    .map(|e| e.key().clone()),
                EvictionPolicy::SoonestExpiring => self
                    .entries
                    .iter()
                    .min_by_key(|e| e.value().expires_at.unwrap_or(u64::MAX))
                    .map(|e| e.key().clone()),
            };

            let Some(victim) = victim else {
                break;
            };
            if let Some((_, entry)) = self.entries.remove(&victim) {
                debug!(key = %victim, "local cache eviction");
                self.metrics.record_eviction(peek_category(&entry.value));
            }
        }
    }
}

fn parse_counter(value: &[u8]) -> Result<i64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| CacheError::Decode("value is not an integer or out of range".to_string()))
}

#[async_trait]
impl CacheProvider for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn raw_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                entry.touch();
                Ok(Some(entry.value.clone()))
            }
            Some(entry) => {
                drop(entry);
                self.expire_if_stale(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn raw_set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<Option<Vec<u8>>> {
        self.make_room_for(key);

        let previous = self.entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        match previous {
            Some(old) if old.is_expired() => {
                self.metrics.record_expiration(peek_category(&old.value));
                Ok(None)
            }
            Some(old) => Ok(Some(old.value)),
            None => Ok(None),
        }
    }

    async fn raw_delete(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entries.remove(key) {
            Some((_, entry)) if entry.is_expired() => {
                self.metrics.record_expiration(peek_category(&entry.value));
                Ok(None)
            }
            Some((_, entry)) => Ok(Some(entry.value)),
            None => Ok(None),
        }
    }

    async fn raw_exists(&self, key: &str) -> Result<bool> {
        let live = match self.entries.get(key) {
            Some(entry) => !entry.is_expired(),
            None => return Ok(false),
        };
        if !live {
            self.expire_if_stale(key);
        }
        Ok(live)
    }

    async fn raw_increment(&self, key: &str, delta: i64) -> Result<(i64, bool)> {
        self.make_room_for(key);

        let mut created = false;
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| {
            created = true;
            CacheEntry::new(b"0".to_vec(), None)
        });

        if entry.is_expired() {
            self.metrics.record_expiration(peek_category(&entry.value));
            *entry = CacheEntry::new(b"0".to_vec(), None);
            created = true;
        }

        let next = parse_counter(&entry.value)?
            .checked_add(delta)
            .ok_or_else(|| CacheError::Decode("increment or decrement would overflow".to_string()))?;
        entry.value = next.to_string().into_bytes();
        entry.touch();
        Ok((next, created))
    }

    async fn raw_expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let applied = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.expire_in(ttl);
                true
            }
            Some(_) => false,
            None => return Ok(false),
        };
        if !applied {
            self.expire_if_stale(key);
        }
        Ok(applied)
    }

    async fn raw_ttl(&self, key: &str) -> Result<TtlState> {
        let state = match self.entries.get(key) {
            Some(entry) if entry.is_expired() => None,
            Some(entry) => Some(match entry.ttl_remaining_ms() {
                Some(ms) => TtlState::Expires(Duration::from_millis(ms)),
                None => TtlState::Persistent,
            }),
            None => return Ok(TtlState::Missing),
        };
        match state {
            Some(state) => Ok(state),
            None => {
                self.expire_if_stale(key);
                Ok(TtlState::Missing)
            }
        }
    }

    async fn raw_scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let now = current_timestamp_ms();
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && !e.value().is_expired_at(now))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn raw_clear_namespace(&self) -> Result<usize> {
        let count = self.entries.len();
        self.entries.clear();
        Ok(count)
    }

    async fn purge_expired(&self) -> Result<usize> {
        Ok(self.purge_expired_entries())
    }
}
