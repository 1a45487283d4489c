//! Cache Entry Module
//!
//! Defines the structure for entries held by the local provider.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// == Cache Entry ==
/// A stored value with its expiration metadata.
///
/// The value is the opaque envelope produced by the codec; category and
/// absolute deadline live inside it.
#[derive(Debug)]
pub(crate) struct CacheEntry {
    /// The stored bytes
    pub value: Vec<u8>,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Last read or write (Unix milliseconds)
    last_accessed_at: AtomicU64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry with optional TTL.
    pub fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        let now = current_timestamp_ms();
        Self {
            value,
            expires_at: ttl.map(|ttl| deadline_from(now, ttl)),
            last_accessed_at: AtomicU64::new(now),
        }
    }

    // == Is Expired ==
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(expires) if now >= expires)
    }

    // == Expire ==
    /// Re-applies a TTL measured from now.
    pub fn expire_in(&mut self, ttl: Duration) {
        self.expires_at = Some(deadline_from(current_timestamp_ms(), ttl));
    }

    // == Touch ==
    /// Records a read.
    pub fn touch(&self) {
        self.last_accessed_at
            .store(current_timestamp_ms(), Ordering::Relaxed);
    }

    pub fn last_accessed_at(&self) -> u64 {
        self.last_accessed_at.load(Ordering::Relaxed)
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired (TTL elapsed)
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry has no TTL (never expires)
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn deadline_from(now: u64, ttl: Duration) -> u64 {
    now.saturating_add(ttl.as_millis().min(u64::MAX as u128) as u64)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new(b"value".to_vec(), None);

        assert_eq!(entry.value, b"value");
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
        assert!(entry.ttl_remaining_ms().is_none());
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new(b"value".to_vec(), Some(Duration::from_secs(10)));

        assert!(!entry.is_expired());
        let remaining = entry.ttl_remaining_ms().unwrap();
        assert!(remaining <= 10_000);
        assert!(remaining >= 9_000);
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new(b"value".to_vec(), Some(Duration::from_millis(50)));
        assert!(!entry.is_expired());

        sleep(Duration::from_millis(80));

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining_ms(), Some(0));
    }

    #[test]
    fn test_expire_in_resets_deadline() {
        let mut entry = CacheEntry::new(b"value".to_vec(), Some(Duration::from_millis(10)));
        entry.expire_in(Duration::from_secs(60));
        assert!(entry.ttl_remaining_ms().unwrap() > 59_000);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::new(b"value".to_vec(), Some(Duration::ZERO));
        let now = current_timestamp_ms();

        assert!(entry.is_expired_at(now));
    }

    #[test]
    fn test_touch_advances_last_access() {
        let entry = CacheEntry::new(b"value".to_vec(), None);
        let before = entry.last_accessed_at();
        sleep(Duration::from_millis(5));
        entry.touch();
        assert!(entry.last_accessed_at() > before);
    }
}
