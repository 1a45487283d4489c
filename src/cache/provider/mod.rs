//! Cache Provider Module
//!
//! The low-level storage contract shared by the local and distributed
//! variants. The service depends on this trait only.

mod distributed;
mod local;

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::ProviderKind;
use crate::error::Result;

pub use distributed::{DistributedConfig, DistributedProvider};
pub use local::{EvictionPolicy, LocalProvider};

// == TTL State ==
/// Remaining lifetime of a key as seen by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlState {
    Missing,
    Persistent,
    Expires(Duration),
}

// == Cache Provider ==
/// Raw byte-level operations on one cache namespace.
///
/// Keys are passed without namespace; providers that share a store apply
/// their own prefix.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn raw_get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes a value, replacing any prior entry and its TTL.
    ///
    /// Returns the live value that was replaced, if any.
    async fn raw_set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<Option<Vec<u8>>>;

    /// Removes a key, returning the bytes it held.
    async fn raw_delete(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn raw_exists(&self, key: &str) -> Result<bool>;

    /// Atomically adds `delta`, starting from 0 for a missing key.
    ///
    /// Returns the new value and whether the key was created.
    async fn raw_increment(&self, key: &str, delta: i64) -> Result<(i64, bool)>;

    /// Re-applies a TTL. False when the key does not exist.
    async fn raw_expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    async fn raw_ttl(&self, key: &str) -> Result<TtlState>;

    /// Keys starting with `prefix`, snapshotted at scan start.
    async fn raw_scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Removes every key of the namespace, returning how many were removed.
    async fn raw_clear_namespace(&self) -> Result<usize>;

    /// Drops expired entries. Stores with native expiry have nothing to do.
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }
}
