//! Configuration for the cache store

use serde::{Deserialize, Serialize};
use std::time::Duration;

const MB: usize = 1024 * 1024;

/// Lower bound for a jittered TTL
const MIN_JITTERED_TTL_SECS: f64 = 0.001;

/// Configuration for [`CacheStore`](crate::cache::CacheStore)
///
/// Two bounds apply at once: an entry count and a memory budget. A single
/// value larger than `max_item_size` (or the whole memory budget) is never
/// stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live used when `set` is called without an explicit TTL
    pub default_ttl: Duration,

    /// Maximum number of entries in the cache
    pub max_entries: usize,

    /// Maximum total size of stored payloads in bytes
    pub max_memory_bytes: usize,

    /// Maximum size of a single stored payload in bytes
    pub max_item_size: usize,

    /// Encoded payloads larger than this are considered for compression
    pub compression_threshold: usize,

    /// gzip level (0-9)
    pub compression_level: u32,

    /// Enable payload compression
    pub enable_compression: bool,

    /// TTL jitter factor (0.0 - 1.0) applied to `default_ttl` only
    pub ttl_jitter: f64,

    /// Run the background reaper
    pub enable_auto_cleanup: bool,

    /// Interval between reaper sweeps
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            max_entries: 10_000,
            max_memory_bytes: 100 * MB,
            max_item_size: 10 * MB,
            // 1 KB; smaller payloads rarely shrink under gzip
            compression_threshold: 1024,
            compression_level: 6,
            enable_compression: true,
            // Explicit TTLs must stay exact, so no jitter unless asked for
            ttl_jitter: 0.0,
            enable_auto_cleanup: true,
            // Sweep every 5 minutes
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_entries == 0 {
            return Err("max_entries must be greater than 0".to_string());
        }

        if self.max_memory_bytes == 0 {
            return Err("max_memory_bytes must be greater than 0".to_string());
        }

        if self.max_item_size == 0 {
            return Err("max_item_size must be greater than 0".to_string());
        }

        if self.default_ttl.is_zero() {
            return Err("default_ttl must be greater than 0".to_string());
        }

        if self.compression_level > 9 {
            return Err("compression_level must be between 0 and 9".to_string());
        }

        if self.ttl_jitter < 0.0 || self.ttl_jitter > 1.0 {
            return Err("ttl_jitter must be between 0.0 and 1.0".to_string());
        }

        if self.enable_auto_cleanup && self.cleanup_interval.is_zero() {
            return Err("cleanup_interval must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Calculate the default TTL with jitter applied
    pub fn ttl_with_jitter(&self) -> Duration {
        if self.ttl_jitter == 0.0 {
            return self.default_ttl;
        }

        let base_secs = self.default_ttl.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        // Stays within the jitter band; the floor only matters at full jitter
        let final_secs = (base_secs + jitter).max(MIN_JITTERED_TTL_SECS);

        Duration::from_secs_f64(final_secs)
    }

    /// Memory budget in whole megabytes
    pub fn max_memory_mb(&self) -> usize {
        self.max_memory_bytes / MB
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    default_ttl: Option<Duration>,
    max_entries: Option<usize>,
    max_memory_bytes: Option<usize>,
    max_item_size: Option<usize>,
    compression_threshold: Option<usize>,
    compression_level: Option<u32>,
    enable_compression: Option<bool>,
    ttl_jitter: Option<f64>,
    enable_auto_cleanup: Option<bool>,
    cleanup_interval: Option<Duration>,
}

impl CacheConfigBuilder {
    /// Set default TTL for cache entries
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set maximum number of cache entries
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Set the memory budget in bytes
    pub fn max_memory_bytes(mut self, size: usize) -> Self {
        self.max_memory_bytes = Some(size);
        self
    }

    /// Set the memory budget in megabytes
    pub fn max_memory_mb(mut self, mb: usize) -> Self {
        self.max_memory_bytes = Some(mb * MB);
        self
    }

    /// Set the largest single payload accepted
    pub fn max_item_size(mut self, size: usize) -> Self {
        self.max_item_size = Some(size);
        self
    }

    /// Set the size above which payloads are compressed
    pub fn compression_threshold(mut self, size: usize) -> Self {
        self.compression_threshold = Some(size);
        self
    }

    /// Set gzip compression level
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = Some(level);
        self
    }

    /// Enable or disable compression
    pub fn enable_compression(mut self, enable: bool) -> Self {
        self.enable_compression = Some(enable);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Enable or disable the background reaper
    pub fn enable_auto_cleanup(mut self, enable: bool) -> Self {
        self.enable_auto_cleanup = Some(enable);
        self
    }

    /// Set reaper interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            max_entries: self.max_entries.unwrap_or(defaults.max_entries),
            max_memory_bytes: self.max_memory_bytes.unwrap_or(defaults.max_memory_bytes),
            max_item_size: self.max_item_size.unwrap_or(defaults.max_item_size),
            compression_threshold: self
                .compression_threshold
                .unwrap_or(defaults.compression_threshold),
            compression_level: self.compression_level.unwrap_or(defaults.compression_level),
            enable_compression: self
                .enable_compression
                .unwrap_or(defaults.enable_compression),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            enable_auto_cleanup: self
                .enable_auto_cleanup
                .unwrap_or(defaults.enable_auto_cleanup),
            cleanup_interval: self.cleanup_interval.unwrap_or(defaults.cleanup_interval),
        }
    }
}

/// Preset configurations for common deployments
impl CacheConfig {
    /// Memory-constrained environments
    pub fn small() -> Self {
        Self {
            default_ttl: Duration::from_secs(1800),
            max_entries: 1_000,
            max_memory_bytes: 10 * MB,
            max_item_size: MB,
            ..Default::default()
        }
    }

    /// Large deployments serving many workspaces
    pub fn large() -> Self {
        Self {
            default_ttl: Duration::from_secs(7200),
            max_entries: 1_000_000,
            max_memory_bytes: 2048 * MB,
            max_item_size: 50 * MB,
            ..Default::default()
        }
    }
}
