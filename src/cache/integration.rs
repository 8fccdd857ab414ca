//! Typed caching for the graph-query integration layer
//!
//! Entities, relationships, communities and search answers each live in
//! their own namespace so that re-indexing one kind of data can drop exactly
//! that slice of the cache.

use crate::cache::{
    config::CacheConfig,
    key::CacheKeyComponents,
    store::CacheStore,
    types::CacheStatus,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Well-known cache namespaces
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheNamespace {
    /// Entity lookups
    Entities,

    /// Relationship lookups
    Relationships,

    /// Community lookups
    Communities,

    /// Search answers (local/global/drift)
    Queries,

    /// Arbitrary API payloads
    Api,

    /// Custom namespace
    Custom(String),
}

impl CacheNamespace {
    /// Namespace string used in cache keys
    pub fn as_str(&self) -> &str {
        match self {
            CacheNamespace::Entities => "entities",
            CacheNamespace::Relationships => "relationships",
            CacheNamespace::Communities => "communities",
            CacheNamespace::Queries => "queries",
            CacheNamespace::Api => "api",
            CacheNamespace::Custom(s) => s,
        }
    }
}

impl std::fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knowledge graph cache wrapper
///
/// Provides namespaced, workspace-scoped caching on top of a shared
/// [`CacheStore`].
#[derive(Clone)]
pub struct KnowledgeGraphCache {
    cache: Arc<CacheStore>,
}

impl KnowledgeGraphCache {
    /// Create a new knowledge graph cache with its own store
    pub fn new(config: CacheConfig) -> Self {
        Self {
            cache: Arc::new(CacheStore::new(config)),
        }
    }

    /// Create from existing cache instance
    pub fn from_store(cache: Arc<CacheStore>) -> Self {
        Self { cache }
    }

    /// Get the underlying cache instance
    pub fn inner(&self) -> Arc<CacheStore> {
        Arc::clone(&self.cache)
    }

    /// Cache an entity
    pub fn cache_entity<T: Serialize>(&self, workspace: &str, entity_id: &str, entity: &T) -> bool {
        self.cache
            .set(&Self::key(CacheNamespace::Entities, workspace, entity_id), entity, None)
    }

    /// Get cached entity
    pub fn get_entity<T: DeserializeOwned>(&self, workspace: &str, entity_id: &str) -> Option<T> {
        self.cache
            .get(&Self::key(CacheNamespace::Entities, workspace, entity_id))
    }

    /// Cache a relationship
    pub fn cache_relationship<T: Serialize>(&self, workspace: &str, rel_id: &str, rel: &T) -> bool {
        self.cache
            .set(&Self::key(CacheNamespace::Relationships, workspace, rel_id), rel, None)
    }

    /// Get cached relationship
    pub fn get_relationship<T: DeserializeOwned>(&self, workspace: &str, rel_id: &str) -> Option<T> {
        self.cache
            .get(&Self::key(CacheNamespace::Relationships, workspace, rel_id))
    }

    /// Cache a community
    pub fn cache_community<T: Serialize>(&self, workspace: &str, community_id: &str, community: &T) -> bool {
        self.cache.set(
            &Self::key(CacheNamespace::Communities, workspace, community_id),
            community,
            None,
        )
    }

    /// Get cached community
    pub fn get_community<T: DeserializeOwned>(&self, workspace: &str, community_id: &str) -> Option<T> {
        self.cache
            .get(&Self::key(CacheNamespace::Communities, workspace, community_id))
    }

    /// Cache a search answer for `(method, query)` within a workspace
    pub fn cache_search<T: Serialize>(
        &self,
        workspace: &str,
        method: &str,
        query: &str,
        answer: &T,
        ttl: Option<Duration>,
    ) -> bool {
        self.cache
            .set(&Self::search_key(workspace, method, query), answer, ttl)
    }

    /// Get a cached search answer
    pub fn get_search<T: DeserializeOwned>(&self, workspace: &str, method: &str, query: &str) -> Option<T> {
        self.cache.get(&Self::search_key(workspace, method, query))
    }

    /// Drop everything cached under `namespace`
    pub fn invalidate(&self, namespace: &CacheNamespace) -> usize {
        self.cache.clear_namespace(namespace.as_str())
    }

    /// Get cache status
    pub fn status(&self) -> CacheStatus {
        self.cache.status()
    }

    fn key(namespace: CacheNamespace, workspace: &str, id: &str) -> CacheKeyComponents {
        CacheKeyComponents::new(namespace.as_str(), id).param("workspace", workspace)
    }

    fn search_key(workspace: &str, method: &str, query: &str) -> CacheKeyComponents {
        CacheKeyComponents::new(CacheNamespace::Queries.as_str(), query)
            .param("workspace", workspace)
            .param("method", method)
    }
}
