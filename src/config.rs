//! Application configuration
//!
//! Values come from `OUROBOROS_*` environment variables (a `.env` file is
//! loaded first when present). Unset variables keep their defaults; a
//! variable that is set but unparsable is a [`KgError::ConfigError`].

use crate::cache::CacheConfig;
use crate::error::{KgError, Result};
use crate::pool::PoolConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

const MB: usize = 1024 * 1024;

/// Configuration for everything an [`AppContext`](crate::AppContext) owns
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub pool: PoolConfig,
}

impl AppConfig {
    /// Load `.env`, then read overrides from the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through `lookup` (variable name -> value)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let cache = &mut config.cache;
        let pool = &mut config.pool;

        if let Some(secs) = parse_var::<u64, _>(&lookup, "OUROBOROS_CACHE_DEFAULT_TTL_SECS")? {
            cache.default_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var(&lookup, "OUROBOROS_CACHE_MAX_ENTRIES")? {
            cache.max_entries = n;
        }
        if let Some(mb) = parse_var::<usize, _>(&lookup, "OUROBOROS_CACHE_MAX_MEMORY_MB")? {
            cache.max_memory_bytes = mb.saturating_mul(MB);
        }
        if let Some(enabled) = parse_var(&lookup, "OUROBOROS_CACHE_COMPRESSION")? {
            cache.enable_compression = enabled;
        }
        if let Some(enabled) = parse_var(&lookup, "OUROBOROS_CACHE_AUTO_CLEANUP")? {
            cache.enable_auto_cleanup = enabled;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "OUROBOROS_CACHE_CLEANUP_INTERVAL_SECS")? {
            cache.cleanup_interval = Duration::from_secs(secs);
        }

        if let Some(n) = parse_var(&lookup, "OUROBOROS_POOL_MIN_CONNECTIONS")? {
            pool.min_connections = n;
        }
        if let Some(n) = parse_var(&lookup, "OUROBOROS_POOL_MAX_CONNECTIONS")? {
            pool.max_connections = n;
        }
        if let Some(secs) = parse_var::<f64, _>(&lookup, "OUROBOROS_POOL_TIMEOUT_SECS")? {
            pool.connection_timeout = Duration::try_from_secs_f64(secs).map_err(|e| {
                KgError::ConfigError(format!("OUROBOROS_POOL_TIMEOUT_SECS: {}", e))
            })?;
        }
        if let Some(name) = lookup("OUROBOROS_POOL_DATABASE_FILE") {
            pool.database_file = name;
        }
        if let Some(prefer) = parse_var(&lookup, "OUROBOROS_POOL_PREFER_STRUCTURED")? {
            pool.prefer_structured_store = prefer;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "OUROBOROS_QUERY_CACHE_TTL_SECS")? {
            pool.query_cache_ttl = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate both sections
    pub fn validate(&self) -> Result<()> {
        self.cache
            .validate()
            .map_err(|e| KgError::ConfigError(format!("cache: {}", e)))?;
        self.pool
            .validate()
            .map_err(|e| KgError::ConfigError(format!("pool: {}", e)))?;
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| KgError::ConfigError(format!("{}={:?}: {}", name, raw, e))),
    }
}
