//! Application-scoped ownership of the cache, the reaper and the pool
//!
//! There are no process-wide instances: whoever builds an [`AppContext`]
//! owns exactly one of each and decides when they start and stop.

use crate::cache::{CacheStatus, CacheStore, KnowledgeGraphCache, Reaper};
use crate::config::AppConfig;
use crate::error::Result;
use crate::pool::{PoolStatus, ResourcePool};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Combined health report for administrative endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub cache: CacheStatus,
    pub pool: PoolStatus,
    pub reaper_running: bool,
    pub reaper_sweeps: u64,
    pub reaper_purged: u64,
}

impl HealthReport {
    /// Pool is open and not every handle is leased
    pub fn is_healthy(&self) -> bool {
        !self.pool.closed && self.pool.active < self.pool.max
    }
}

/// Owner of the cache, its reaper and the resource pool
pub struct AppContext {
    config: AppConfig,
    cache: Arc<CacheStore>,
    pool: Arc<ResourcePool>,
    reaper: Mutex<Option<Reaper>>,
}

impl AppContext {
    /// Validate `config`, build every component and start background work
    ///
    /// Must be called from within a tokio runtime.
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let pool = Arc::new(ResourcePool::new(config.pool.clone()));
        pool.initialize().await?;

        let cache = Arc::new(CacheStore::new(config.cache.clone()));
        let reaper = if config.cache.enable_auto_cleanup {
            Some(Reaper::spawn(Arc::clone(&cache), config.cache.cleanup_interval))
        } else {
            None
        };

        info!(
            "Application context ready (cache: {} entries / {}MB, pool: {}-{} handles)",
            config.cache.max_entries,
            config.cache.max_memory_mb(),
            config.pool.min_connections,
            config.pool.max_connections
        );

        Ok(Self {
            config,
            cache,
            pool,
            reaper: Mutex::new(reaper),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> Arc<CacheStore> {
        Arc::clone(&self.cache)
    }

    pub fn pool(&self) -> Arc<ResourcePool> {
        Arc::clone(&self.pool)
    }

    /// Graph-level cache facade over the shared store
    pub fn kg_cache(&self) -> KnowledgeGraphCache {
        KnowledgeGraphCache::from_store(self.cache())
    }

    pub async fn health(&self) -> HealthReport {
        let (reaper_running, reaper_sweeps, reaper_purged) = match &*self.reaper.lock().await {
            Some(reaper) => {
                let stats = reaper.stats();
                (reaper.is_running(), stats.sweeps(), stats.purged())
            }
            None => (false, 0, 0),
        };

        HealthReport {
            cache: self.cache.status(),
            pool: self.pool.status(),
            reaper_running,
            reaper_sweeps,
            reaper_purged,
        }
    }

    /// Stop the reaper, close the pool and drop cached data
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Some(reaper) = self.reaper.lock().await.take() {
            reaper.shutdown().await;
        }
        self.pool.shutdown();
        let cleared = self.cache.clear();
        info!("Application context shut down ({} cache entries dropped)", cleared);
    }
}
