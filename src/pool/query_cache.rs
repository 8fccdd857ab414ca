//! Second-level cache of query results
//!
//! A timestamped map with one fixed TTL. It shares nothing with
//! [`CacheStore`](crate::cache::CacheStore) except the key canonicalization.

use crate::cache::key::hash_hex;
use crate::query::{QueryFilters, QueryResult, QueryType};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

struct QueryCacheRecord {
    source: PathBuf,
    result: QueryResult,
    inserted_at: Instant,
}

/// Query cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Fixed-TTL cache keyed by `(query type, source, filter signature)`
pub struct QueryCache {
    ttl: Duration,
    soft_cap: usize,
    records: Mutex<HashMap<String, QueryCacheRecord>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(ttl: Duration, soft_cap: usize) -> Self {
        Self {
            ttl,
            soft_cap: soft_cap.max(1),
            records: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Canonical key; filter order never matters
    pub fn key(query_type: QueryType, source: &Path, filters: &QueryFilters) -> String {
        hash_hex(&format!(
            "{}|{}|{}",
            query_type,
            source.to_string_lossy(),
            filters.signature()
        ))
    }

    /// Cached result, if present and younger than the TTL
    pub fn get(&self, query_type: QueryType, source: &Path, filters: &QueryFilters) -> Option<QueryResult> {
        let key = Self::key(query_type, source, filters);
        let mut records = self.records.lock();

        let fresh = match records.get(&key) {
            Some(record) if record.inserted_at.elapsed() < self.ttl => Some(record.result.clone()),
            Some(_) => {
                records.remove(&key);
                None
            }
            None => None,
        };

        match fresh {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        fresh
    }

    /// Store a result, cleaning up once past the soft cap
    pub fn put(&self, query_type: QueryType, source: &Path, filters: &QueryFilters, result: QueryResult) {
        let key = Self::key(query_type, source, filters);
        let mut records = self.records.lock();

        records.insert(
            key,
            QueryCacheRecord {
                source: source.to_path_buf(),
                result,
                inserted_at: Instant::now(),
            },
        );

        if records.len() > self.soft_cap {
            self.cleanup(&mut records);
        }
    }

    fn cleanup(&self, records: &mut HashMap<String, QueryCacheRecord>) {
        let before = records.len();
        let ttl = self.ttl;
        records.retain(|_, record| record.inserted_at.elapsed() < ttl);

        if records.len() > self.soft_cap {
            let mut by_age: Vec<(Instant, String)> = records
                .iter()
                .map(|(key, record)| (record.inserted_at, key.clone()))
                .collect();
            by_age.sort();

            let excess = records.len() - self.soft_cap;
            for (_, key) in by_age.into_iter().take(excess) {
                records.remove(&key);
            }
        }

        debug!("Query cache cleanup dropped {} records", before - records.len());
    }

    /// Drop results read from `source` or from any file beneath it
    pub fn invalidate_source(&self, source: &Path) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, record| !record.source.starts_with(source));
        before - records.len()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueryCacheStats {
        QueryCacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(n: usize) -> QueryResult {
        let rows = (0..n)
            .map(|i| json!({"id": i}).as_object().cloned().unwrap())
            .collect();
        QueryResult::new(vec!["id".to_string()], rows)
    }

    #[test]
    fn test_key_ignores_filter_order() {
        let a = QueryFilters::new().eq("type", "PERSON").eq("title", "ALICE");
        let b = QueryFilters::new().eq("title", "ALICE").eq("type", "PERSON");
        let source = Path::new("/data/ws1/output");

        assert_eq!(
            QueryCache::key(QueryType::Entities, source, &a),
            QueryCache::key(QueryType::Entities, source, &b)
        );
        assert_ne!(
            QueryCache::key(QueryType::Entities, source, &a),
            QueryCache::key(QueryType::Communities, source, &a)
        );
        assert_ne!(
            QueryCache::key(QueryType::Entities, source, &a),
            QueryCache::key(QueryType::Entities, Path::new("/data/ws2/output"), &a)
        );
    }

    #[test]
    fn test_get_put() {
        let cache = QueryCache::new(Duration::from_secs(60), 10);
        let source = Path::new("/data/ws1");
        let filters = QueryFilters::new();

        assert!(cache.get(QueryType::Entities, source, &filters).is_none());
        cache.put(QueryType::Entities, source, &filters, result(2));
        assert_eq!(cache.get(QueryType::Entities, source, &filters), Some(result(2)));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_expired_record_is_dropped() {
        let cache = QueryCache::new(Duration::from_millis(20), 10);
        let source = Path::new("/data/ws1");
        cache.put(QueryType::Entities, source, &QueryFilters::new(), result(1));

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get(QueryType::Entities, source, &QueryFilters::new()).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_soft_cap_drops_oldest() {
        let cache = QueryCache::new(Duration::from_secs(60), 3);
        let source = Path::new("/data/ws1");

        for limit in 0..5 {
            cache.put(QueryType::Entities, source, &QueryFilters::new().limit(limit), result(limit));
            std::thread::sleep(Duration::from_millis(2));
        }

        assert_eq!(cache.len(), 3);
        assert!(cache.get(QueryType::Entities, source, &QueryFilters::new().limit(0)).is_none());
        assert!(cache.get(QueryType::Entities, source, &QueryFilters::new().limit(1)).is_none());
        assert!(cache.get(QueryType::Entities, source, &QueryFilters::new().limit(4)).is_some());
    }

    #[test]
    fn test_invalidate_source() {
        let cache = QueryCache::new(Duration::from_secs(60), 10);
        let filters = QueryFilters::new();
        cache.put(QueryType::Entities, Path::new("/data/ws1"), &filters, result(1));
        cache.put(QueryType::Entities, Path::new("/data/ws1/entities.csv"), &filters, result(1));
        cache.put(QueryType::Entities, Path::new("/data/ws2"), &filters, result(1));

        assert_eq!(cache.invalidate_source(Path::new("/data/ws1")), 2);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
