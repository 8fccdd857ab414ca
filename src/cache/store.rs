//! Main cache store implementation with LRU eviction and memory management

use crate::cache::{
    codec::{Codec, CodecError, JsonCodec},
    config::CacheConfig,
    entry::{CacheEntry, CacheMetadata},
    key::CacheKeyComponents,
    types::{CacheKey, CacheMetrics, CacheStats, CacheStatus},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Bounded TTL + LRU cache over encoded payloads
///
/// This implementation provides:
/// - Synchronous, non-suspending access behind one short mutex section
/// - Lazy TTL expiry on every read
/// - LRU eviction under entry-count and memory pressure
/// - Optional compression of large payloads
/// - Namespace index for bulk invalidation
///
/// No operation returns an error: encoding problems, oversized values and
/// corrupt payloads all degrade to "not cached".
pub struct CacheStore<C: Codec = JsonCodec> {
    config: CacheConfig,
    codec: C,
    inner: Mutex<StoreInner>,
    metrics: CacheMetrics,
}

/// State guarded by the store mutex
#[derive(Default)]
struct StoreInner {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, CacheEntry>,

    /// Recency order: tick -> key, smallest tick is least recently used
    lru: BTreeMap<u64, CacheKey>,

    /// Secondary index: namespace -> keys
    namespaces: HashMap<String, HashSet<CacheKey>>,

    /// Sum of payload sizes
    memory_bytes: usize,

    /// Monotonic counter feeding recency ticks and generations
    tick: u64,
}

/// Outcome of a locked lookup
enum Lookup {
    Hit {
        payload: Arc<[u8]>,
        compressed: bool,
        generation: u64,
    },
    Expired,
    Missing,
}

impl StoreInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn insert(&mut self, mut entry: CacheEntry) {
        let tick = self.next_tick();
        entry.recency = tick;
        entry.generation = tick;

        self.memory_bytes += entry.metadata.size_bytes;
        self.lru.insert(tick, entry.key.clone());
        self.namespaces
            .entry(entry.namespace.clone())
            .or_default()
            .insert(entry.key.clone());
        self.entries.insert(entry.key.clone(), entry);
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(&entry.recency);
        if let Some(keys) = self.namespaces.get_mut(&entry.namespace) {
            keys.remove(key);
            if keys.is_empty() {
                self.namespaces.remove(&entry.namespace);
            }
        }
        self.memory_bytes = self.memory_bytes.saturating_sub(entry.metadata.size_bytes);
        Some(entry)
    }

    fn pop_lru(&mut self) -> Option<CacheEntry> {
        let key = self.lru.first_key_value().map(|(_, key)| key.clone())?;
        self.remove(&key)
    }

    fn lookup(&mut self, key: &str, now: DateTime<Utc>) -> Lookup {
        let expired = match self.entries.get(key) {
            None => return Lookup::Missing,
            Some(entry) => entry.is_expired_at(now),
        };

        if expired {
            self.remove(key);
            return Lookup::Expired;
        }

        let tick = self.next_tick();
        let Some(entry) = self.entries.get_mut(key) else {
            return Lookup::Missing;
        };
        self.lru.remove(&entry.recency);
        entry.recency = tick;
        entry.mark_accessed();
        self.lru.insert(tick, key.to_string());

        Lookup::Hit {
            payload: Arc::clone(&entry.payload),
            compressed: entry.metadata.compressed,
            generation: entry.generation,
        }
    }

    /// Evict LRU entries until `incoming` bytes fit. Returns (evicted, expired).
    fn make_room(
        &mut self,
        incoming: usize,
        max_entries: usize,
        max_memory_bytes: usize,
        now: DateTime<Utc>,
    ) -> (u64, u64) {
        let mut evicted = 0;
        let mut expired = 0;

        while self.entries.len() >= max_entries || self.memory_bytes + incoming > max_memory_bytes
        {
            let Some(victim) = self.pop_lru() else {
                break;
            };
            if victim.is_expired_at(now) {
                expired += 1;
            } else {
                debug!("Evicting LRU entry: {}", victim.key);
                evicted += 1;
            }
        }

        (evicted, expired)
    }
}

impl CacheStore<JsonCodec> {
    /// Create a new JSON-backed cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self::with_codec(config, JsonCodec)
    }
}

impl<C: Codec> CacheStore<C> {
    /// Create a cache with a custom codec
    pub fn with_codec(config: CacheConfig, codec: C) -> Self {
        info!(
            "Initializing cache store (max_entries: {}, max_memory: {} bytes)",
            config.max_entries, config.max_memory_bytes
        );

        Self {
            config,
            codec,
            inner: Mutex::new(StoreInner::default()),
            metrics: CacheMetrics::default(),
        }
    }

    /// Get the store configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get and decode a value. Expired, missing and undecodable entries are misses.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKeyComponents) -> Option<T> {
        let start = Instant::now();
        let cache_key = key.cache_key();
        let value = self
            .read_payload(&cache_key)
            .and_then(|(bytes, generation)| match self.codec.decode(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    self.discard_corrupt(&cache_key, generation, &e);
                    None
                }
            });

        if value.is_some() {
            debug!("Cache hit: {}/{}", key.namespace, key.identifier);
            self.metrics.record_hit();
        } else {
            debug!("Cache miss: {}/{}", key.namespace, key.identifier);
            self.metrics.record_miss();
        }
        self.metrics.record_latency(start.elapsed());
        value
    }

    /// Encode and store a value. Returns `false` when nothing was stored.
    ///
    /// `ttl: None` uses the configured default TTL (with jitter when enabled).
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &CacheKeyComponents,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let start = Instant::now();
        let stored = match self.codec.encode(value) {
            Ok(bytes) => self.store_bytes(key, bytes, ttl),
            Err(e) => {
                warn!("Not caching {}/{}: {}", key.namespace, key.identifier, e);
                self.reject(&key.cache_key());
                false
            }
        };
        self.metrics.record_latency(start.elapsed());
        stored
    }

    /// Return the cached value, or compute, cache and return it
    pub async fn get_or_insert_with<T, E, F, Fut>(
        &self,
        key: &CacheKeyComponents,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = compute().await?;
        self.set(key, &value, ttl);
        Ok(value)
    }

    /// Remove a specific entry. Returns whether an entry was removed.
    pub fn delete(&self, key: &CacheKeyComponents) -> bool {
        let removed = self.inner.lock().remove(&key.cache_key()).is_some();
        if removed {
            debug!("Removed cache entry: {}/{}", key.namespace, key.identifier);
        }
        removed
    }

    /// Remove every entry stored under `namespace`. Returns the number removed.
    pub fn clear_namespace(&self, namespace: &str) -> usize {
        let mut inner = self.inner.lock();
        let Some(keys) = inner.namespaces.remove(namespace) else {
            return 0;
        };

        let mut removed = 0;
        for key in keys {
            if inner.remove(&key).is_some() {
                removed += 1;
            }
        }
        drop(inner);

        info!("Cleared {} entries from namespace {}", removed, namespace);
        removed
    }

    /// Clear all entries from the cache
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        inner.lru.clear();
        inner.namespaces.clear();
        inner.memory_bytes = 0;
        drop(inner);

        info!("Cleared {} entries from cache", count);
        count
    }

    /// Remove all expired entries. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.remove(key);
        }
        drop(inner);

        if !expired.is_empty() {
            self.metrics.record_expirations(expired.len() as u64);
            debug!("Purged {} expired entries", expired.len());
        }
        expired.len()
    }

    /// Whether a live entry exists (does not count as an access)
    pub fn contains(&self, key: &CacheKeyComponents) -> bool {
        let now = Utc::now();
        self.inner
            .lock()
            .entries
            .get(&key.cache_key())
            .map_or(false, |entry| !entry.is_expired_at(now))
    }

    /// Metadata of a live entry (does not count as an access)
    pub fn metadata(&self, key: &CacheKeyComponents) -> Option<CacheMetadata> {
        let now = Utc::now();
        self.inner
            .lock()
            .entries
            .get(&key.cache_key())
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.metadata.clone())
    }

    /// Get number of entries in cache
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Bytes currently held by payloads
    pub fn memory_usage(&self) -> usize {
        self.inner.lock().memory_bytes
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot()
    }

    /// Entries, memory usage, configured bounds and counters
    pub fn status(&self) -> CacheStatus {
        let (entries, memory_usage_bytes, namespaces) = {
            let inner = self.inner.lock();
            (inner.entries.len(), inner.memory_bytes, inner.namespaces.len())
        };

        CacheStatus {
            entries,
            memory_usage_bytes,
            max_entries: self.config.max_entries,
            max_memory_bytes: self.config.max_memory_bytes,
            namespaces,
            stats: self.metrics.snapshot(),
        }
    }

    /// Locked lookup, then decompression outside the lock
    fn read_payload(&self, cache_key: &str) -> Option<(Vec<u8>, u64)> {
        let lookup = self.inner.lock().lookup(cache_key, Utc::now());

        match lookup {
            Lookup::Missing => None,
            Lookup::Expired => {
                debug!("Cache entry expired: {}", cache_key);
                self.metrics.record_expirations(1);
                None
            }
            Lookup::Hit {
                payload,
                compressed: false,
                generation,
            } => Some((payload.to_vec(), generation)),
            Lookup::Hit {
                payload,
                compressed: true,
                generation,
            } => match self.codec.decompress(&payload) {
                Ok(bytes) => Some((bytes, generation)),
                Err(e) => {
                    self.discard_corrupt(cache_key, generation, &e);
                    None
                }
            },
        }
    }

    /// Drop an entry that failed to decode, unless it was replaced meanwhile
    fn discard_corrupt(&self, cache_key: &str, generation: u64, error: &CodecError) {
        warn!("Dropping undecodable cache entry {}: {}", cache_key, error);
        let mut inner = self.inner.lock();
        if inner
            .entries
            .get(cache_key)
            .map_or(false, |entry| entry.generation == generation)
        {
            inner.remove(cache_key);
        }
    }

    /// A failed write also drops the previous value under that key
    fn reject(&self, cache_key: &str) {
        self.inner.lock().remove(cache_key);
        self.metrics.record_rejection();
    }

    fn compress_if_worthwhile(&self, bytes: Vec<u8>) -> (Vec<u8>, bool) {
        if !self.config.enable_compression || bytes.len() <= self.config.compression_threshold {
            return (bytes, false);
        }

        match self.codec.compress(&bytes, self.config.compression_level) {
            Ok(compressed) if compressed.len() < bytes.len() => (compressed, true),
            Ok(_) => (bytes, false),
            Err(e) => {
                debug!("Compression failed, storing uncompressed: {}", e);
                (bytes, false)
            }
        }
    }

    fn store_bytes(&self, key: &CacheKeyComponents, bytes: Vec<u8>, ttl: Option<Duration>) -> bool {
        let cache_key = key.cache_key();
        let ttl = ttl.unwrap_or_else(|| self.config.ttl_with_jitter());
        if ttl.is_zero() {
            debug!("Not caching {}/{}: zero TTL", key.namespace, key.identifier);
            self.reject(&cache_key);
            return false;
        }

        let (payload, compressed) = self.compress_if_worthwhile(bytes);
        let size = payload.len();
        if size > self.config.max_item_size || size > self.config.max_memory_bytes {
            warn!(
                "Not caching {}/{}: {} bytes exceeds limit",
                key.namespace, key.identifier, size
            );
            self.reject(&cache_key);
            return false;
        }

        let entry = CacheEntry::new(cache_key.clone(), key.namespace.clone(), payload, ttl, compressed);
        let now = Utc::now();

        let (evicted, expired) = {
            let mut inner = self.inner.lock();
            inner.remove(&cache_key);
            let freed = inner.make_room(
                size,
                self.config.max_entries.max(1),
                self.config.max_memory_bytes,
                now,
            );
            inner.insert(entry);
            freed
        };

        self.metrics.record_evictions(evicted);
        self.metrics.record_expirations(expired);
        self.metrics.record_write(compressed);
        debug!(
            "Cached {}/{} ({} bytes, compressed: {})",
            key.namespace, key.identifier, size, compressed
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn key(ns: &str, id: &str) -> CacheKeyComponents {
        CacheKeyComponents::new(ns, id)
    }

    fn store(max_entries: usize) -> CacheStore {
        CacheStore::new(
            CacheConfig::builder()
                .default_ttl(Duration::from_secs(60))
                .max_entries(max_entries)
                .build(),
        )
    }

    #[test]
    fn test_basic_set_and_get() {
        let cache = store(100);

        assert!(cache.set(&key("ns", "k1"), &json!({"a": 1}), None));
        let value: Option<Value> = cache.get(&key("ns", "k1"));
        assert_eq!(value, Some(json!({"a": 1})));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.writes, 1);
    }

    #[test]
    fn test_cache_miss() {
        let cache = store(100);

        let value: Option<Value> = cache.get(&key("ns", "nonexistent"));
        assert_eq!(value, None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_ttl_expiration_is_lazy() {
        let cache = store(100);
        cache.set(&key("ns", "k1"), "v", Some(Duration::from_millis(50)));

        std::thread::sleep(Duration::from_millis(80));

        // Still physically present until read or purged
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get::<String>(&key("ns", "k1")), None);
        assert_eq!(cache.len(), 0);

        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_lru_eviction_respects_touches() {
        let cache = store(2);

        cache.set(&key("ns", "k1"), &1, None);
        cache.set(&key("ns", "k2"), &2, None);
        assert_eq!(cache.get::<i32>(&key("ns", "k1")), Some(1));
        cache.set(&key("ns", "k3"), &3, None);

        assert!(cache.contains(&key("ns", "k1")));
        assert!(!cache.contains(&key("ns", "k2")));
        assert!(cache.contains(&key("ns", "k3")));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_refreshes_recency_and_accounting() {
        let cache = store(2);

        cache.set(&key("ns", "k1"), "aaaa", None);
        cache.set(&key("ns", "k2"), "b", None);
        cache.set(&key("ns", "k1"), "a", None);

        assert_eq!(cache.len(), 2);
        // "a" and "b" encode as 3 bytes each
        assert_eq!(cache.memory_usage(), 6);

        cache.set(&key("ns", "k3"), "c", None);
        assert!(!cache.contains(&key("ns", "k2")));
        assert!(cache.contains(&key("ns", "k1")));
    }

    #[test]
    fn test_memory_bound_evicts() {
        let cache = CacheStore::new(
            CacheConfig::builder()
                .max_entries(100)
                .max_memory_bytes(250)
                .enable_compression(false)
                .build(),
        );

        for i in 0..5 {
            // 100 characters + 2 quotes
            assert!(cache.set(&key("ns", &i.to_string()), &"x".repeat(100), None));
            assert!(cache.memory_usage() <= 250);
        }

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 3);
    }

    #[test]
    fn test_oversized_value_is_rejected_not_forced() {
        let cache = CacheStore::new(
            CacheConfig::builder()
                .max_memory_bytes(1024)
                .max_item_size(64)
                .enable_compression(false)
                .build(),
        );

        cache.set(&key("ns", "small"), "ok", None);
        assert!(!cache.set(&key("ns", "big"), &"x".repeat(200), None));

        assert!(cache.contains(&key("ns", "small")));
        assert!(!cache.contains(&key("ns", "big")));
        assert_eq!(cache.stats().rejections, 1);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_rejected_overwrite_drops_previous_value() {
        let cache = CacheStore::new(
            CacheConfig::builder()
                .max_item_size(16)
                .enable_compression(false)
                .build(),
        );

        cache.set(&key("ns", "k"), "old", None);
        assert!(!cache.set(&key("ns", "k"), &"new".repeat(20), None));
        assert_eq!(cache.get::<String>(&key("ns", "k")), None);
        assert_eq!(cache.memory_usage(), 0);
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let cache = store(10);
        assert!(!cache.set(&key("ns", "k"), "v", Some(Duration::ZERO)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_large_payload_is_compressed() {
        let cache = CacheStore::new(
            CacheConfig::builder()
                .compression_threshold(128)
                .build(),
        );
        let value = json!({"description": "community ".repeat(200)});

        assert!(cache.set(&key("reports", "c1"), &value, None));

        let metadata = cache.metadata(&key("reports", "c1")).unwrap();
        assert!(metadata.compressed);
        assert!(metadata.size_bytes < serde_json::to_vec(&value).unwrap().len());
        assert_eq!(cache.memory_usage(), metadata.size_bytes);
        assert_eq!(cache.get::<Value>(&key("reports", "c1")), Some(value));
        assert_eq!(cache.stats().compressed_writes, 1);
    }

    #[test]
    fn test_incompressible_payload_stays_plain() {
        let cache = CacheStore::new(CacheConfig::builder().compression_threshold(4).build());

        // Short payloads grow under gzip's header overhead
        cache.set(&key("ns", "k"), "abcdefgh", None);
        let metadata = cache.metadata(&key("ns", "k")).unwrap();
        assert!(!metadata.compressed);
        assert_eq!(metadata.size_bytes, 10);
    }

    #[test]
    fn test_decode_failure_is_a_miss_and_removes_entry() {
        let cache = store(10);
        cache.set(&key("ns", "k"), &json!({"a": 1}), None);

        assert_eq!(cache.get::<Vec<u32>>(&key("ns", "k")), None);
        assert!(!cache.contains(&key("ns", "k")));
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let cache = store(10);
        cache.set(&key("ns", "k"), "v", None);

        assert!(cache.delete(&key("ns", "k")));
        assert!(!cache.delete(&key("ns", "k")));

        let stats = cache.stats();
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(cache.memory_usage(), 0);
    }

    #[test]
    fn test_clear_namespace() {
        let cache = store(100);
        for i in 0..5 {
            cache.set(&key("entities", &format!("e{}", i)), &i, None);
        }
        cache.set(&key("queries", "q1"), &1, None);
        cache.set(&key("queries", "q2"), &2, None);

        assert_eq!(cache.clear_namespace("entities"), 5);
        assert_eq!(cache.clear_namespace("entities"), 0);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get::<i32>(&key("queries", "q1")), Some(1));
        assert_eq!(cache.get::<i32>(&key("queries", "q2")), Some(2));
        assert_eq!(cache.status().namespaces, 1);
    }

    #[test]
    fn test_purge_expired() {
        let cache = store(100);
        cache.set(&key("ns", "short"), &1, Some(Duration::from_millis(20)));
        cache.set(&key("ns", "long"), &2, Some(Duration::from_secs(60)));

        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expirations, 1);
        assert!(cache.contains(&key("ns", "long")));
    }

    #[test]
    fn test_expired_victim_counts_as_expiration() {
        let cache = store(1);
        cache.set(&key("ns", "old"), &1, Some(Duration::from_millis(10)));
        std::thread::sleep(Duration::from_millis(30));

        cache.set(&key("ns", "new"), &2, None);

        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_clear() {
        let cache = store(10);
        cache.set(&key("a", "1"), &1, None);
        cache.set(&key("b", "2"), &2, None);

        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.memory_usage(), 0);
    }

    #[tokio::test]
    async fn test_get_or_insert_with() {
        let cache = store(10);
        let k = key("entities", "alice");

        let first: Result<String, String> = cache
            .get_or_insert_with(&k, None, || async { Ok("computed".to_string()) })
            .await;
        assert_eq!(first.unwrap(), "computed");

        let second: Result<String, String> = cache
            .get_or_insert_with(&k, None, || async { Err("must not run".to_string()) })
            .await;
        assert_eq!(second.unwrap(), "computed");
    }

    #[test]
    fn test_status_reports_bounds() {
        let cache = store(42);
        cache.set(&key("ns", "k"), "v", None);
        let _ = cache.get::<String>(&key("ns", "k"));

        let status = cache.status();
        assert_eq!(status.entries, 1);
        assert_eq!(status.max_entries, 42);
        assert_eq!(status.memory_usage_bytes, 3);
        assert_eq!(status.stats.hit_rate(), 100.0);
        assert!(status.stats.avg_latency_us >= 0.0);
    }
}
