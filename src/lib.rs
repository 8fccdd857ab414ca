//! # Ouroboros Query Core (ouroboros-query)
//!
//! The in-process layer in front of knowledge-graph query execution.
//!
//! ## Features
//!
//! - Bounded TTL + LRU cache with memory accounting and payload compression
//! - Background reaper for expired entries
//! - Async handle pool with a hard concurrency ceiling and typed exhaustion
//! - Short-TTL query-result cache in front of pooled execution
//! - SQLite and flat-file (JSON Lines, JSON, CSV) query paths
//! - Explicit application context instead of global singletons
//!
//! ## Caching
//!
//! ```rust
//! use ouroboros_query::cache::{CacheConfig, CacheKeyComponents, CacheStore};
//!
//! let cache = CacheStore::new(CacheConfig::small());
//! let key = CacheKeyComponents::new("entities", "alice");
//!
//! cache.set(&key, &vec!["PERSON"], None);
//! assert_eq!(cache.get::<Vec<String>>(&key), Some(vec!["PERSON".to_string()]));
//! ```
//!
//! ## Querying through the pool
//!
//! ```no_run
//! use ouroboros_query::{AppConfig, AppContext, QueryFilters, QueryType};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let context = AppContext::initialize(AppConfig::from_env()?).await?;
//!
//!     let filters = QueryFilters::new().eq("type", "PERSON").limit(20);
//!     let people = context
//!         .pool()
//!         .execute_query(QueryType::Entities, "./workspaces/demo/output", &filters, true)
//!         .await?;
//!     println!("{} people", people.len());
//!
//!     context.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod pool;
pub mod query;

// Re-export main types for convenience
pub use cache::{
    CacheConfig, CacheConfigBuilder, CacheKeyComponents, CacheNamespace, CacheStats, CacheStatus,
    CacheStore, KnowledgeGraphCache, Reaper,
};
pub use config::AppConfig;
pub use context::{AppContext, HealthReport};
pub use error::{KgError, Result};
pub use pool::{PoolConfig, PoolStatus, PooledHandle, QueryMetric, ResourcePool};
pub use query::{Condition, QueryFilters, QueryResult, QueryType, Row};

/// Install a `tracing` subscriber filtered by `RUST_LOG`
///
/// Falls back to `info` when `RUST_LOG` is unset. Does nothing if a global
/// subscriber is already installed.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
