//! # Query Handle Pool
//!
//! Bounds concurrent use of query-execution handles, reuses idle ones and
//! creates new ones on demand up to `max_connections`. A short-TTL
//! [`QueryCache`] sits in front of execution.
//!
//! Leases are counted by a fair `tokio::sync::Semaphore`, so waiters are
//! served in arrival order and a dropped `acquire` future leaves no trace.
//! A running query owns its permit until the blocking work ends, even when
//! the caller has stopped waiting.

pub mod config;
pub mod handle;
pub mod metrics;
pub mod query_cache;

pub use config::{PoolConfig, PoolConfigBuilder};
pub use handle::{HandleInfo, HandleKind, HandleState, PoolHandle};
pub use metrics::QueryMetric;
pub use query_cache::{QueryCache, QueryCacheStats};

use crate::error::{KgError, Result};
use crate::query::{QueryFilters, QueryResult, QueryType};
use metrics::QueryMetrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Point-in-time pool summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Live (non-retired) handles
    pub total: usize,
    /// Handles currently leased
    pub active: usize,
    pub idle: usize,
    pub max: usize,
    pub min: usize,
    pub total_queries: u64,
    pub cache_hits: u64,
    pub failed_queries: u64,
    /// Acquires that timed out at the ceiling
    pub exhausted: u64,
    pub query_cache: QueryCacheStats,
    pub closed: bool,
}

impl PoolStatus {
    /// Fraction of the ceiling currently leased
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        self.active as f64 / self.max as f64
    }
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<PoolHandle>,
    ledger: HashMap<Uuid, HandleInfo>,
    exhausted: u64,
}

impl PoolState {
    fn live(&self) -> usize {
        self.ledger.values().filter(|info| info.is_active()).count()
    }

    fn register(&mut self, mut info: HandleInfo) {
        info.state = HandleState::Idle;
        self.ledger.insert(info.id, info);
    }

    fn set_state(&mut self, id: Uuid, state: HandleState) {
        if let Some(info) = self.ledger.get_mut(&id) {
            info.state = state;
        }
    }
}

/// Bounded pool of query-execution handles
pub struct ResourcePool {
    config: PoolConfig,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
    init_lock: tokio::sync::Mutex<()>,
    initialized: AtomicBool,
    closed: AtomicBool,
    query_cache: QueryCache,
    metrics: QueryMetrics,
}

impl ResourcePool {
    /// Create an empty pool; call [`initialize`](Self::initialize) to warm it
    pub fn new(config: PoolConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_connections));
        let query_cache = QueryCache::new(config.query_cache_ttl, config.query_cache_soft_cap);
        let metrics = QueryMetrics::new(config.max_metrics_history);

        Self {
            config,
            permits,
            state: Mutex::new(PoolState::default()),
            init_lock: tokio::sync::Mutex::new(()),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            query_cache,
            metrics,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Create `min_connections` idle handles
    ///
    /// Idempotent and safe to call from concurrent tasks.
    pub async fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let _guard = self.init_lock.lock().await;
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        if self.is_closed() {
            return Err(KgError::PoolClosed);
        }

        let target = self.config.min_connections.min(self.config.max_connections);
        let mut created = 0;
        while self.state.lock().live() < target {
            let (handle, info) = PoolHandle::open(self.config.prefer_structured_store);
            let mut state = self.state.lock();
            state.register(info);
            state.idle.push_back(handle);
            created += 1;
        }

        self.initialized.store(true, Ordering::Release);
        info!(
            "Resource pool initialized with {} handles (max {})",
            created, self.config.max_connections
        );
        Ok(())
    }

    /// Lease a handle, waiting up to `connection_timeout`
    pub async fn acquire(&self) -> Result<PooledHandle<'_>> {
        self.acquire_timeout(self.config.connection_timeout).await
    }

    /// Lease a handle, waiting up to `timeout`
    ///
    /// Fails with [`KgError::PoolExhausted`] when every handle stays leased
    /// for the whole wait.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledHandle<'_>> {
        if self.is_closed() {
            return Err(KgError::PoolClosed);
        }

        let started = Instant::now();
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(KgError::PoolClosed),
            Err(TryAcquireError::NoPermits) => {
                match tokio::time::timeout(timeout, Arc::clone(&self.permits).acquire_owned()).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => return Err(KgError::PoolClosed),
                    Err(_) => {
                        self.state.lock().exhausted += 1;
                        let waited_ms = started.elapsed().as_millis() as u64;
                        warn!(
                            "Pool exhausted: {} handles leased, waited {}ms",
                            self.config.max_connections, waited_ms
                        );
                        return Err(KgError::PoolExhausted {
                            max_connections: self.config.max_connections,
                            waited_ms,
                        });
                    }
                }
            }
        };

        let handle = self.check_out();
        debug!("Leased handle {} after {:?}", handle.id(), started.elapsed());

        Ok(PooledHandle {
            pool: self,
            handle: Some(handle),
            permit: Some(permit),
        })
    }

    /// Take an idle handle or create one; the caller holds a permit, so the
    /// live count stays within the ceiling
    fn check_out(&self) -> PoolHandle {
        let reused = {
            let mut state = self.state.lock();
            let handle = state.idle.pop_front();
            if let Some(handle) = &handle {
                if let Some(info) = state.ledger.get_mut(&handle.id()) {
                    info.lease();
                }
            }
            handle
        };

        if let Some(handle) = reused {
            return handle;
        }

        let (handle, info) = PoolHandle::open(self.config.prefer_structured_store);
        let mut state = self.state.lock();
        state.register(info);
        if let Some(info) = state.ledger.get_mut(&handle.id()) {
            info.lease();
        }
        handle
    }

    fn release(&self, handle: PoolHandle) {
        let mut state = self.state.lock();
        if self.is_closed() {
            state.set_state(handle.id(), HandleState::Retired);
            debug!("Retired handle {} on release", handle.id());
        } else {
            state.set_state(handle.id(), HandleState::Idle);
            state.idle.push_back(handle);
        }
    }

    /// Run a query, consulting the query cache first when `use_cache` is set
    ///
    /// Every call records a [`QueryMetric`]. Execution errors are returned
    /// unchanged after being recorded.
    pub async fn execute_query(
        &self,
        query_type: QueryType,
        source: impl AsRef<Path>,
        filters: &QueryFilters,
        use_cache: bool,
    ) -> Result<QueryResult> {
        let source = source.as_ref();
        let started = Instant::now();
        let source_label = source.to_string_lossy().into_owned();

        if use_cache {
            if let Some(result) = self.query_cache.get(query_type, source, filters) {
                debug!("Query cache hit: {} on {}", query_type, source_label);
                self.metrics.record(QueryMetric::succeeded(
                    query_type,
                    source_label,
                    started.elapsed(),
                    result.len(),
                    true,
                ));
                return Ok(result);
            }
        }

        match self.run(query_type, source, filters).await {
            Ok(result) => {
                if use_cache {
                    self.query_cache.put(query_type, source, filters, result.clone());
                }
                debug!(
                    "Executed {} on {}: {} rows in {:?}",
                    query_type,
                    source_label,
                    result.len(),
                    started.elapsed()
                );
                self.metrics.record(QueryMetric::succeeded(
                    query_type,
                    source_label,
                    started.elapsed(),
                    result.len(),
                    false,
                ));
                Ok(result)
            }
            Err(e) => {
                error!("Query {} on {} failed: {}", query_type, source_label, e);
                self.metrics.record(QueryMetric::failed(
                    query_type,
                    source_label,
                    started.elapsed(),
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        query_type: QueryType,
        source: &Path,
        filters: &QueryFilters,
    ) -> Result<QueryResult> {
        filters.validate(query_type)?;
        let mut handle = self.acquire().await?;
        handle.query(query_type, source, filters).await
    }

    /// Handle counts and query counters
    pub fn status(&self) -> PoolStatus {
        let (total, active, idle, exhausted) = {
            let state = self.state.lock();
            let active = state
                .ledger
                .values()
                .filter(|info| info.state == HandleState::Leased)
                .count();
            (state.live(), active, state.idle.len(), state.exhausted)
        };

        PoolStatus {
            total,
            active,
            idle,
            max: self.config.max_connections,
            min: self.config.min_connections,
            total_queries: self.metrics.total(),
            cache_hits: self.metrics.cache_hits(),
            failed_queries: self.metrics.failures(),
            exhausted,
            query_cache: self.query_cache.stats(),
            closed: self.is_closed(),
        }
    }

    /// Recent per-query records, oldest first
    pub fn metrics(&self) -> Vec<QueryMetric> {
        self.metrics.snapshot()
    }

    /// Ledger snapshot, oldest handle first
    pub fn handles(&self) -> Vec<HandleInfo> {
        let mut handles: Vec<HandleInfo> = self.state.lock().ledger.values().cloned().collect();
        handles.sort_by_key(|info| info.created_at);
        handles
    }

    pub fn query_cache(&self) -> &QueryCache {
        &self.query_cache
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Retire idle handles and refuse further leases
    ///
    /// Leased handles are retired when their lease ends. Pending acquires
    /// fail with [`KgError::PoolClosed`].
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.permits.close();

        let retired = {
            let mut state = self.state.lock();
            let idle: Vec<PoolHandle> = state.idle.drain(..).collect();
            for handle in &idle {
                state.set_state(handle.id(), HandleState::Retired);
            }
            idle.len()
        };
        self.query_cache.clear();

        info!("Resource pool shut down, retired {} idle handles", retired);
    }
}

/// A leased handle, returned to the pool when dropped
pub struct PooledHandle<'a> {
    pool: &'a ResourcePool,
    handle: Option<PoolHandle>,
    permit: Option<OwnedSemaphorePermit>,
}

impl PooledHandle<'_> {
    /// Run a query on the leased handle
    ///
    /// The permit travels with the blocking work, so dropping this future
    /// mid-query keeps the slot occupied until that work ends.
    pub async fn query(
        &mut self,
        query_type: QueryType,
        source: &Path,
        filters: &QueryFilters,
    ) -> Result<QueryResult> {
        let permit = self.permit.take();
        let database_file = &self.pool.config.database_file;
        let (result, permit) = self
            .deref()
            .execute_holding(query_type, source, filters, database_file, permit)
            .await;
        self.permit = permit.flatten();
        result
    }
}

impl Deref for PooledHandle<'_> {
    type Target = PoolHandle;

    fn deref(&self) -> &PoolHandle {
        // Only `drop` takes the handle out
        self.handle.as_ref().unwrap_or_else(|| unreachable!("handle taken before drop"))
    }
}

impl std::fmt::Debug for PooledHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledHandle")
            .field("handle", &self.handle)
            .finish()
    }
}

impl Drop for PooledHandle<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle);
        }
    }
}
