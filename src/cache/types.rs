//! Core type definitions and metrics for the cache

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Canonical cache key (hex SHA-256 of the key components)
pub type CacheKey = String;

/// Point-in-time view of the cache counters
///
/// Counters are cumulative for the lifetime of the store.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Total number of `get` calls
    pub requests: u64,

    /// Total number of cache hits
    pub hits: u64,

    /// Total number of cache misses
    pub misses: u64,

    /// Entries removed to make room (count or memory pressure)
    pub evictions: u64,

    /// Entries removed because their TTL elapsed
    pub expirations: u64,

    /// `set` calls that stored nothing
    pub rejections: u64,

    /// Successful `set` calls
    pub writes: u64,

    /// Successful `set` calls whose payload was stored compressed
    pub compressed_writes: u64,

    /// Average `get`/`set` latency in microseconds
    pub avg_latency_us: f64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, evictions: {}, expirations: {}, rejections: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.evictions,
            self.expirations,
            self.rejections
        )
    }
}

/// Operator-facing status report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    /// Number of live entries
    pub entries: usize,

    /// Bytes currently held by payloads
    pub memory_usage_bytes: usize,

    /// Configured entry ceiling
    pub max_entries: usize,

    /// Configured memory ceiling in bytes
    pub max_memory_bytes: usize,

    /// Number of distinct namespaces with live entries
    pub namespaces: usize,

    /// Counter snapshot
    pub stats: CacheStats,
}

impl CacheStatus {
    /// Memory usage as a percentage of the budget
    pub fn memory_utilization(&self) -> f64 {
        if self.max_memory_bytes == 0 {
            0.0
        } else {
            (self.memory_usage_bytes as f64 / self.max_memory_bytes as f64) * 100.0
        }
    }
}

/// Lock-free counters owned by a cache store
#[derive(Debug, Default)]
pub(crate) struct CacheMetrics {
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    rejections: AtomicU64,
    writes: AtomicU64,
    compressed_writes: AtomicU64,
    timed_ops: AtomicU64,
    total_latency_ns: AtomicU64,
}

impl CacheMetrics {
    pub(crate) fn record_hit(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evictions(&self, n: u64) {
        self.evictions.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_expirations(&self, n: u64) {
        self.expirations.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, compressed: bool) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if compressed {
            self.compressed_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_latency(&self, elapsed: Duration) {
        self.timed_ops.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        let timed_ops = self.timed_ops.load(Ordering::Relaxed);
        let avg_latency_us = if timed_ops == 0 {
            0.0
        } else {
            self.total_latency_ns.load(Ordering::Relaxed) as f64 / timed_ops as f64 / 1000.0
        };

        CacheStats {
            requests: self.requests.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            compressed_writes: self.compressed_writes.load(Ordering::Relaxed),
            avg_latency_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };

        assert_eq!(stats.hit_rate(), 80.0);
        assert_eq!(stats.miss_rate(), 20.0);
    }

    #[test]
    fn test_cache_stats_zero_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 100.0);
    }

    #[test]
    fn test_cache_stats_display() {
        let stats = CacheStats {
            requests: 150,
            hits: 100,
            misses: 50,
            evictions: 10,
            expirations: 5,
            ..Default::default()
        };

        let display = format!("{}", stats);
        assert!(display.contains("hits: 100"));
        assert!(display.contains("misses: 50"));
        assert!(display.contains("hit_rate: 66.67%"));
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = CacheMetrics::default();
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_miss();
        metrics.record_write(true);
        metrics.record_evictions(3);
        metrics.record_latency(Duration::from_micros(10));
        metrics.record_latency(Duration::from_micros(30));

        let stats = metrics.snapshot();
        assert_eq!(stats.requests, 3);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.compressed_writes, 1);
        assert_eq!(stats.evictions, 3);
        assert!((stats.avg_latency_us - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_memory_utilization() {
        let status = CacheStatus {
            entries: 1,
            memory_usage_bytes: 25,
            max_entries: 10,
            max_memory_bytes: 100,
            namespaces: 1,
            stats: CacheStats::default(),
        };
        assert_eq!(status.memory_utilization(), 25.0);
    }
}
