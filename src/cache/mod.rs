//! # Bounded Caching Layer
//!
//! This module implements the in-process cache used in front of
//! knowledge-graph queries.
//!
//! ## Features
//!
//! - **TTL-Based Expiration**: checked lazily on every read, TTL counted from creation
//! - **LRU Eviction**: under both an entry-count and a memory ceiling
//! - **Compression**: large payloads are gzip-compressed when it actually helps
//! - **Namespaces**: bulk invalidation through a namespace index
//! - **Background Reaper**: periodic reclamation of expired entries
//! - **Failure Isolation**: cache faults degrade to misses, never to errors
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_query::cache::{CacheConfig, CacheKeyComponents, CacheStore};
//! use std::time::Duration;
//!
//! let config = CacheConfig::builder()
//!     .default_ttl(Duration::from_secs(3600))
//!     .max_entries(10_000)
//!     .max_memory_mb(100)
//!     .build();
//!
//! let cache = CacheStore::new(config);
//! let key = CacheKeyComponents::new("entities", "alice").param("workspace", "demo");
//!
//! assert!(cache.set(&key, &serde_json::json!({"type": "PERSON"}), None));
//! let value: Option<serde_json::Value> = cache.get(&key);
//! assert!(value.is_some());
//! ```

pub mod codec;
pub mod config;
pub mod entry;
pub mod integration;
pub mod key;
pub mod reaper;
pub mod store;
pub mod types;

pub use codec::{Codec, CodecError, JsonCodec};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::{CacheEntry, CacheMetadata};
pub use integration::{CacheNamespace, KnowledgeGraphCache};
pub use key::CacheKeyComponents;
pub use reaper::{Reaper, ReaperStats, Sweep};
pub use store::CacheStore;
pub use types::{CacheKey, CacheStats, CacheStatus};
