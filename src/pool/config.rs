//! Configuration for the resource pool

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`ResourcePool`](crate::pool::ResourcePool)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Handles created by `initialize`
    pub min_connections: usize,

    /// Ceiling on handles, and on simultaneous leases
    pub max_connections: usize,

    /// How long `acquire` waits before failing with `PoolExhausted`
    pub connection_timeout: Duration,

    /// Back handles with a SQLite connection; when false (or when opening one
    /// fails) handles read flat files only
    pub prefer_structured_store: bool,

    /// Database file looked up inside a directory source
    pub database_file: String,

    /// Fixed TTL of query-cache records
    pub query_cache_ttl: Duration,

    /// Record count above which the query cache cleans up
    pub query_cache_soft_cap: usize,

    /// Per-query metric records kept in memory
    pub max_metrics_history: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 10,
            connection_timeout: Duration::from_secs(30),
            prefer_structured_store: true,
            database_file: "knowledge.db".to_string(),
            // 5 minutes
            query_cache_ttl: Duration::from_secs(300),
            query_cache_soft_cap: 256,
            max_metrics_history: 1000,
        }
    }
}

impl PoolConfig {
    /// Create a new builder for pool configuration
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }

        if self.min_connections > self.max_connections {
            return Err(format!(
                "min_connections ({}) must not exceed max_connections ({})",
                self.min_connections, self.max_connections
            ));
        }

        if self.database_file.trim().is_empty() {
            return Err("database_file must not be empty".to_string());
        }

        if self.query_cache_ttl.is_zero() {
            return Err("query_cache_ttl must be greater than 0".to_string());
        }

        if self.query_cache_soft_cap == 0 {
            return Err("query_cache_soft_cap must be greater than 0".to_string());
        }

        if self.max_metrics_history == 0 {
            return Err("max_metrics_history must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Small pool for tests and single-user tools
    pub fn small() -> Self {
        Self {
            min_connections: 1,
            max_connections: 2,
            connection_timeout: Duration::from_secs(5),
            query_cache_soft_cap: 64,
            max_metrics_history: 100,
            ..Default::default()
        }
    }
}

/// Builder for pool configuration
#[derive(Debug, Default)]
pub struct PoolConfigBuilder {
    min_connections: Option<usize>,
    max_connections: Option<usize>,
    connection_timeout: Option<Duration>,
    prefer_structured_store: Option<bool>,
    database_file: Option<String>,
    query_cache_ttl: Option<Duration>,
    query_cache_soft_cap: Option<usize>,
    max_metrics_history: Option<usize>,
}

impl PoolConfigBuilder {
    pub fn min_connections(mut self, n: usize) -> Self {
        self.min_connections = Some(n);
        self
    }

    pub fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = Some(n);
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    pub fn prefer_structured_store(mut self, prefer: bool) -> Self {
        self.prefer_structured_store = Some(prefer);
        self
    }

    pub fn database_file(mut self, name: impl Into<String>) -> Self {
        self.database_file = Some(name.into());
        self
    }

    pub fn query_cache_ttl(mut self, ttl: Duration) -> Self {
        self.query_cache_ttl = Some(ttl);
        self
    }

    pub fn query_cache_soft_cap(mut self, cap: usize) -> Self {
        self.query_cache_soft_cap = Some(cap);
        self
    }

    pub fn max_metrics_history(mut self, n: usize) -> Self {
        self.max_metrics_history = Some(n);
        self
    }

    pub fn build(self) -> PoolConfig {
        let defaults = PoolConfig::default();
        PoolConfig {
            min_connections: self.min_connections.unwrap_or(defaults.min_connections),
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            connection_timeout: self.connection_timeout.unwrap_or(defaults.connection_timeout),
            prefer_structured_store: self
                .prefer_structured_store
                .unwrap_or(defaults.prefer_structured_store),
            database_file: self.database_file.unwrap_or(defaults.database_file),
            query_cache_ttl: self.query_cache_ttl.unwrap_or(defaults.query_cache_ttl),
            query_cache_soft_cap: self
                .query_cache_soft_cap
                .unwrap_or(defaults.query_cache_soft_cap),
            max_metrics_history: self
                .max_metrics_history
                .unwrap_or(defaults.max_metrics_history),
        }
    }
}
