//! Per-query execution records

use crate::query::QueryType;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One `execute_query` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetric {
    pub query_type: QueryType,
    pub source: String,
    pub duration: Duration,
    /// Zero for failed queries
    pub rows: usize,
    pub cache_hit: bool,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl QueryMetric {
    pub(crate) fn succeeded(
        query_type: QueryType,
        source: String,
        duration: Duration,
        rows: usize,
        cache_hit: bool,
    ) -> Self {
        Self {
            query_type,
            source,
            duration,
            rows,
            cache_hit,
            success: true,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn failed(
        query_type: QueryType,
        source: String,
        duration: Duration,
        error: String,
    ) -> Self {
        Self {
            query_type,
            source,
            duration,
            rows: 0,
            cache_hit: false,
            success: false,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

/// Bounded history plus lifetime counters
pub(crate) struct QueryMetrics {
    history: Mutex<VecDeque<QueryMetric>>,
    max_history: usize,
    total: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
}

impl QueryMetrics {
    pub(crate) fn new(max_history: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
            max_history: max_history.max(1),
            total: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn record(&self, metric: QueryMetric) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if metric.cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        if !metric.success {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }

        let mut history = self.history.lock();
        if history.len() == self.max_history {
            history.pop_front();
        }
        history.push_back(metric);
    }

    pub(crate) fn snapshot(&self) -> Vec<QueryMetric> {
        self.history.lock().iter().cloned().collect()
    }

    pub(crate) fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub(crate) fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub(crate) fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = QueryMetrics::new(10);
        metrics.record(QueryMetric::succeeded(
            QueryType::Entities,
            "/ws".into(),
            Duration::from_millis(3),
            4,
            false,
        ));
        metrics.record(QueryMetric::succeeded(
            QueryType::Entities,
            "/ws".into(),
            Duration::from_micros(10),
            4,
            true,
        ));
        metrics.record(QueryMetric::failed(
            QueryType::Relationships,
            "/ws".into(),
            Duration::from_millis(1),
            "boom".into(),
        ));

        assert_eq!(metrics.total(), 3);
        assert_eq!(metrics.cache_hits(), 1);
        assert_eq!(metrics.failures(), 1);

        let history = metrics.snapshot();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].rows, 0);
        assert_eq!(history[2].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_history_is_bounded() {
        let metrics = QueryMetrics::new(2);
        for rows in 0..5 {
            metrics.record(QueryMetric::succeeded(
                QueryType::TextUnits,
                "/ws".into(),
                Duration::ZERO,
                rows,
                false,
            ));
        }

        let history = metrics.snapshot();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].rows, 3);
        assert_eq!(metrics.total(), 5);
    }
}
