//! Query Cache Demo Application
//!
//! Builds an application context, writes a small flat-file workspace and
//! runs a few pooled queries against it, showing query-cache hits, pool
//! status and the generic cache.
//!
//! Usage:
//!   cargo run --example query_cache_demo
//!
//! Environment variables (all optional, see `AppConfig::from_env`):
//!   OUROBOROS_POOL_MAX_CONNECTIONS - handle ceiling (default: 10)
//!   OUROBOROS_QUERY_CACHE_TTL_SECS - query-cache TTL (default: 300)
//!   RUST_LOG                       - log filter (default: info)

use ouroboros_query::cache::{CacheKeyComponents, CacheNamespace};
use ouroboros_query::{AppConfig, AppContext, QueryFilters, QueryType};
use serde_json::{json, Value};
use std::fs;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ouroboros_query::init_tracing();

    info!("=== Query Cache Demo ===");

    let workspace = tempfile::TempDir::new()?;
    let entities = [
        json!({"id": "e1", "title": "ALICE", "type": "PERSON", "degree": 3}),
        json!({"id": "e2", "title": "ACME", "type": "ORGANIZATION", "degree": 5}),
        json!({"id": "e3", "title": "BOB", "type": "PERSON", "degree": 1}),
    ];
    let lines: Vec<String> = entities.iter().map(Value::to_string).collect();
    fs::write(workspace.path().join("entities.jsonl"), lines.join("\n"))?;

    let context = AppContext::initialize(AppConfig::from_env()?).await?;
    let pool = context.pool();

    info!("\n--- Pooled queries ---");
    let people = QueryFilters::new().eq("type", "PERSON");
    for attempt in 1..=2 {
        let result = pool
            .execute_query(QueryType::Entities, workspace.path(), &people, true)
            .await?;
        let titles: Vec<&Value> = result.column("title").collect();
        info!("Attempt {}: {} rows {:?}", attempt, result.len(), titles);
    }

    for metric in pool.metrics() {
        info!(
            "{} on {}: {} rows in {:?} (cache hit: {})",
            metric.query_type, metric.source, metric.rows, metric.duration, metric.cache_hit
        );
    }

    info!("\n--- Generic cache ---");
    let cache = context.cache();
    let key = CacheKeyComponents::new("api", "summary").param("workspace", "demo");
    let summary: Result<String, anyhow::Error> = cache
        .get_or_insert_with(&key, Some(Duration::from_secs(60)), || async {
            Ok("ALICE works at ACME".to_string())
        })
        .await;
    info!("Summary: {}", summary?);

    let kg_cache = context.kg_cache();
    kg_cache.cache_entity("demo", "e1", &entities[0]);
    info!("Cached entity: {:?}", kg_cache.get_entity::<serde_json::Value>("demo", "e1"));
    info!(
        "Invalidated {} entity entries",
        kg_cache.invalidate(&CacheNamespace::Entities)
    );

    info!("\n--- Health ---");
    let health = context.health().await;
    info!("{}", serde_json::to_string_pretty(&health)?);

    context.shutdown().await;
    info!("=== Demo Complete ===");
    Ok(())
}
