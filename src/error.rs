//! Error types for pool and query operations
//!
//! Cache faults never surface here: the cache absorbs them locally and reports
//! "not cached" instead. Everything in this module describes a failure the
//! caller has to see, either because the pool is overloaded or because a
//! query could not produce correct data.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pool and query operations
#[derive(Error, Debug)]
pub enum KgError {
    /// No handle became available within the acquire timeout
    #[error("Connection pool exhausted: all {max_connections} connections are in use (waited {waited_ms}ms)")]
    PoolExhausted {
        max_connections: usize,
        waited_ms: u64,
    },

    /// The pool has been shut down
    #[error("Connection pool is closed")]
    PoolClosed,

    /// Downstream read or query failure
    #[error("Query error ({query_type}): {message}")]
    QueryExecution { query_type: String, message: String },

    /// Identifier rejected by the filter allow-list
    #[error("Unsafe identifier: {0}")]
    UnsafeIdentifier(String),

    /// No data for the requested query type at the source locator
    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// SQLite driver error (wrapper)
    #[error("SQLite error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Flat-file CSV parse error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for pool and query operations
pub type Result<T> = std::result::Result<T, KgError>;

impl KgError {
    /// Whether backing off and retrying can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, KgError::PoolExhausted { .. })
    }

    /// Whether this error came from reading or querying the data source
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            KgError::QueryExecution { .. }
                | KgError::SourceNotFound(_)
                | KgError::Database(_)
                | KgError::Io(_)
                | KgError::Csv(_)
                | KgError::SerializationError(_)
        )
    }
}

impl From<String> for KgError {
    fn from(s: String) -> Self {
        KgError::Other(s)
    }
}

impl From<&str> for KgError {
    fn from(s: &str) -> Self {
        KgError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for KgError {
    fn from(e: serde_json::Error) -> Self {
        KgError::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let pool_error = KgError::PoolExhausted {
            max_connections: 16,
            waited_ms: 100,
        };
        assert!(pool_error.to_string().contains("16 connections"));
        assert!(pool_error.to_string().contains("100ms"));

        let query_error = KgError::QueryExecution {
            query_type: "entities".to_string(),
            message: "no such table".to_string(),
        };
        assert_eq!(query_error.to_string(), "Query error (entities): no such table");

        let missing = KgError::SourceNotFound(PathBuf::from("/data/output"));
        assert!(missing.to_string().contains("/data/output"));
    }

    #[test]
    fn test_error_classification() {
        let exhausted = KgError::PoolExhausted {
            max_connections: 2,
            waited_ms: 0,
        };
        assert!(exhausted.is_retryable());
        assert!(!exhausted.is_execution_failure());

        let io = KgError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.is_execution_failure());
        assert!(!io.is_retryable());

        assert!(!KgError::UnsafeIdentifier("x;".to_string()).is_execution_failure());
    }

    #[test]
    fn test_error_conversion() {
        let error: KgError = "test error".into();
        assert!(matches!(error, KgError::Other(_)));

        let error: KgError = "test error".to_string().into();
        assert!(matches!(error, KgError::Other(_)));
    }
}
