//! Error types for the cache subsystem
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache subsystem.
///
/// Only [`CacheError::Backend`] is considered transient; the service
/// downgrades it to a miss. Every other variant reaches the caller.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Precondition violation (empty key, zero TTL, empty pattern)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Value could not be serialized or deserialized
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored bytes are not what the reader expected
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Provider I/O failure
    #[error("Cache backend unavailable: {0}")]
    Backend(String),

    /// The value factory of `get_or_set` failed
    #[error("Value factory failed: {0}")]
    Factory(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// True for failures the service treats as "cache unavailable".
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::Backend(_))
    }
}

// == Backend Conversions ==
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            // WRONGTYPE replies and replies that do not convert to the
            // requested type
            redis::ErrorKind::TypeError => CacheError::Decode(err.to_string()),
            _ => CacheError::Backend(err.to_string()),
        }
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache subsystem.
pub type Result<T> = std::result::Result<T, CacheError>;
