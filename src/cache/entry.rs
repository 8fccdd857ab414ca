//! Cache entry with TTL and access bookkeeping

use crate::cache::types::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A stored payload and its metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Canonical key
    pub key: CacheKey,

    /// Namespace the entry was stored under
    pub namespace: String,

    /// Stored representation (compressed when `metadata.compressed`)
    pub payload: Arc<[u8]>,

    /// Entry metadata
    pub metadata: CacheMetadata,

    /// Position in the recency order; larger is more recent
    pub(crate) recency: u64,

    /// Insertion sequence number, stable across reads
    pub(crate) generation: u64,
}

impl CacheEntry {
    /// Create a new entry. `size_bytes` is taken from the payload itself.
    pub fn new(
        key: CacheKey,
        namespace: String,
        payload: Vec<u8>,
        ttl: Duration,
        compressed: bool,
    ) -> Self {
        let now = Utc::now();
        let size_bytes = payload.len();

        Self {
            key,
            namespace,
            payload: payload.into(),
            metadata: CacheMetadata {
                created_at: now,
                accessed_at: now,
                access_count: 0,
                ttl,
                size_bytes,
                compressed,
            },
            recency: 0,
            generation: 0,
        }
    }

    /// Whether the entry is past its TTL at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let age = (now - self.metadata.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age >= self.metadata.ttl
    }

    /// Whether the entry is past its TTL
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Get time until expiration
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let remaining = self.metadata.ttl.checked_sub(self.age())?;
        if remaining.is_zero() {
            None
        } else {
            Some(remaining)
        }
    }

    /// Mark the entry as accessed. Does not extend the TTL.
    pub fn mark_accessed(&mut self) {
        self.metadata.accessed_at = Utc::now();
        self.metadata.access_count += 1;
    }

    /// Get the age of the entry
    pub fn age(&self) -> Duration {
        (Utc::now() - self.metadata.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Metadata associated with a cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// When the entry was created; the TTL counts from here
    pub created_at: DateTime<Utc>,

    /// Last access time
    pub accessed_at: DateTime<Utc>,

    /// Number of times this entry has been read
    pub access_count: u64,

    /// Time-to-live
    pub ttl: Duration,

    /// Exact size of the stored payload in bytes
    pub size_bytes: usize,

    /// Whether the payload is compressed
    pub compressed: bool,
}

impl CacheMetadata {
    /// Check if entry is stale (not accessed for a while)
    pub fn is_stale(&self, threshold: Duration) -> bool {
        let time_since_access = Utc::now() - self.accessed_at;
        time_since_access.to_std().unwrap_or(Duration::ZERO) > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn entry(ttl: Duration) -> CacheEntry {
        CacheEntry::new(
            "k".to_string(),
            "ns".to_string(),
            b"value".to_vec(),
            ttl,
            false,
        )
    }

    #[test]
    fn test_cache_entry_creation() {
        let entry = entry(Duration::from_secs(3600));

        assert_eq!(entry.key, "k");
        assert_eq!(entry.namespace, "ns");
        assert_eq!(entry.metadata.size_bytes, 5);
        assert_eq!(entry.metadata.access_count, 0);
        assert!(!entry.metadata.compressed);
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = entry(Duration::from_millis(100));

        assert!(!entry.is_expired());
        sleep(Duration::from_millis(150));
        assert!(entry.is_expired());
        assert!(entry.time_until_expiration().is_none());
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let entry = entry(Duration::from_secs(10));
        let created = entry.metadata.created_at;

        assert!(!entry.is_expired_at(created + chrono::Duration::milliseconds(9_999)));
        assert!(entry.is_expired_at(created + chrono::Duration::seconds(10)));
    }

    #[test]
    fn test_access_does_not_extend_ttl() {
        let mut entry = entry(Duration::from_millis(100));
        sleep(Duration::from_millis(60));
        entry.mark_accessed();
        sleep(Duration::from_millis(60));

        assert_eq!(entry.metadata.access_count, 1);
        assert!(entry.is_expired());
    }

    #[test]
    fn test_metadata_staleness() {
        let mut entry = entry(Duration::from_secs(3600));
        entry.metadata.accessed_at = Utc::now() - chrono::Duration::hours(1);

        assert!(entry.metadata.is_stale(Duration::from_secs(1800)));
        assert!(!entry.metadata.is_stale(Duration::from_secs(7200)));
    }

    #[test]
    fn test_age() {
        let entry = entry(Duration::from_secs(3600));
        sleep(Duration::from_millis(10));
        assert!(entry.age() >= Duration::from_millis(10));
        assert!(entry.time_until_expiration().unwrap() <= Duration::from_secs(3600));
    }
}
