//! Distributed Provider
//!
//! Redis-backed provider shared across processes. Every key is stored as
//! `{namespace}:{key}` so several caches can share one store.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool, Runtime};
use tracing::debug;

use crate::cache::provider::{CacheProvider, TtlState};
use crate::cache::ProviderKind;
use crate::error::{CacheError, Result};

/// Keys requested per SCAN round-trip.
const SCAN_BATCH: usize = 500;

// == Distributed Config ==
/// Connection settings for the distributed store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: bool,
    pub database: u8,
}

impl DistributedConfig {
    /// Renders the connection URL.
    pub fn url(&self) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("{}:{}@", user, pass),
            (None, Some(pass)) => format!(":{}@", pass),
            (Some(user), None) => format!("{}@", user),
            (None, None) => String::new(),
        };
        format!(
            "{}://{}{}:{}/{}",
            scheme, auth, self.host, self.port, self.database
        )
    }
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            username: None,
            password: None,
            tls: false,
            database: 0,
        }
    }
}

// == Distributed Provider ==
#[derive(Clone)]
pub struct DistributedProvider {
    pool: Pool,
    namespace: String,
}

impl DistributedProvider {
    pub fn new(pool: Pool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    /// Builds a connection pool from config. No connection is opened yet.
    pub fn connect(config: &DistributedConfig, namespace: impl Into<String>) -> Result<Self> {
        let pool = deadpool_redis::Config::from_url(config.url())
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Config(format!("Invalid Redis configuration: {}", e)))?;
        Ok(Self::new(pool, namespace))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn strip_namespace<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.namespace.as_str())?.strip_prefix(':')
    }

    async fn conn(&self) -> Result<Connection> {
        Ok(self.pool.get().await?)
    }

    /// Iterates SCAN MATCH cursors until exhausted. Returns full store keys.
    async fn scan_match(&self, conn: &mut Connection, pattern: &str) -> Result<Vec<String>> {
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut *conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }
}

/// Escapes Redis MATCH metacharacters so `text` is matched literally.
fn escape_match(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// INCRBY is refused by the server when the stored value is not a
/// counter or the result would overflow.
fn counter_error(err: redis::RedisError) -> CacheError {
    match err.kind() {
        redis::ErrorKind::ResponseError => CacheError::Decode(err.to_string()),
        _ => err.into(),
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis().min(u64::MAX as u128) as u64).max(1)
}

#[async_trait]
impl CacheProvider for DistributedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Distributed
    }

    async fn raw_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(self.namespaced(key))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn raw_set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.namespaced(key)).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let previous: Option<Vec<u8>> = cmd.arg("GET").query_async(&mut conn).await?;
        Ok(previous)
    }

    async fn raw_delete(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = redis::cmd("GETDEL")
            .arg(self.namespaced(key))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn raw_exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let exists: bool = redis::cmd("EXISTS")
            .arg(self.namespaced(key))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    async fn raw_increment(&self, key: &str, delta: i64) -> Result<(i64, bool)> {
        let mut conn = self.conn().await?;
        let key = self.namespaced(key);

        let (existed, value): (bool, i64) = redis::pipe()
            .atomic()
            .cmd("EXISTS")
            .arg(&key)
            .cmd("INCRBY")
            .arg(&key)
            .arg(delta)
            .query_async(&mut conn)
            .await
            .map_err(counter_error)?;
        Ok((value, !existed))
    }

    async fn raw_expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        let applied: bool = redis::cmd("PEXPIRE")
            .arg(self.namespaced(key))
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(applied)
    }

    async fn raw_ttl(&self, key: &str) -> Result<TtlState> {
        let mut conn = self.conn().await?;
        let pttl: i64 = redis::cmd("PTTL")
            .arg(self.namespaced(key))
            .query_async(&mut conn)
            .await?;
        Ok(match pttl {
            -2 => TtlState::Missing,
            -1 => TtlState::Persistent,
            ms => TtlState::Expires(Duration::from_millis(ms.max(0) as u64)),
        })
    }

    async fn raw_scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let pattern = format!("{}*", escape_match(&self.namespaced(prefix)));
        let keys = self.scan_match(&mut conn, &pattern).await?;
        Ok(keys
            .iter()
            .filter_map(|k| self.strip_namespace(k))
            .map(str::to_string)
            .collect())
    }

    async fn raw_clear_namespace(&self) -> Result<usize> {
        let mut conn = self.conn().await?;
        let pattern = format!("{}:*", escape_match(&self.namespace));
        let keys = self.scan_match(&mut conn, &pattern).await?;

        let mut removed = 0usize;
        for batch in keys.chunks(SCAN_BATCH) {
            let count: usize = redis::cmd("UNLINK")
                .arg(batch)
                .query_async(&mut conn)
                .await?;
            removed += count;
        }
        debug!(namespace = %self.namespace, removed, "distributed namespace cleared");
        Ok(removed)
    }
}
