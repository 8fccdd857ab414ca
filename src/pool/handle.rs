//! Pool handles and their bookkeeping records

use crate::error::{KgError, Result};
use crate::query::{flat_file, structured, QueryFilters, QueryResult, QueryType};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// What backs a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    /// SQLite connection; reads flat files when a source has no database
    StructuredStore,

    /// Fallback reader for JSON Lines, JSON and CSV files
    FlatFile,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::StructuredStore => f.write_str("structured_store"),
            HandleKind::FlatFile => f.write_str("flat_file"),
        }
    }
}

/// Lifecycle state: `Created -> Idle -> Leased -> Idle ... -> Retired`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleState {
    Created,
    Idle,
    Leased,
    Retired,
}

/// Ledger record for one handle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleInfo {
    pub id: Uuid,
    pub kind: HandleKind,
    pub state: HandleState,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub use_count: u64,
}

impl HandleInfo {
    fn new(id: Uuid, kind: HandleKind) -> Self {
        Self {
            id,
            kind,
            state: HandleState::Created,
            created_at: Utc::now(),
            last_used_at: None,
            use_count: 0,
        }
    }

    /// Stamp the start of a lease
    pub(crate) fn lease(&mut self) {
        self.state = HandleState::Leased;
        self.use_count += 1;
        self.last_used_at = Some(Utc::now());
    }

    /// Whether the handle still belongs to a live pool
    pub fn is_active(&self) -> bool {
        self.state != HandleState::Retired
    }
}

enum Backend {
    Sqlite(Arc<Mutex<Connection>>),
    FlatFile,
}

/// A reusable query-execution handle
pub struct PoolHandle {
    id: Uuid,
    backend: Backend,
}

impl PoolHandle {
    /// Open a handle and its ledger record
    ///
    /// A structured-store handle degrades to a flat-file handle when the
    /// connection cannot be opened.
    pub(crate) fn open(prefer_structured_store: bool) -> (Self, HandleInfo) {
        let id = Uuid::new_v4();
        let backend = if prefer_structured_store {
            match structured::open_connection() {
                Ok(conn) => Backend::Sqlite(Arc::new(Mutex::new(conn))),
                Err(e) => {
                    warn!("Falling back to flat-file handle {}: {}", id, e);
                    Backend::FlatFile
                }
            }
        } else {
            Backend::FlatFile
        };

        let handle = Self { id, backend };
        let info = HandleInfo::new(id, handle.kind());
        debug!("Created {} handle {}", info.kind, id);
        (handle, info)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> HandleKind {
        match self.backend {
            Backend::Sqlite(_) => HandleKind::StructuredStore,
            Backend::FlatFile => HandleKind::FlatFile,
        }
    }

    /// Run a query on the blocking thread pool
    pub async fn execute(
        &self,
        query_type: QueryType,
        source: &Path,
        filters: &QueryFilters,
        database_file: &str,
    ) -> Result<QueryResult> {
        self.execute_holding(query_type, source, filters, database_file, ())
            .await
            .0
    }

    /// Run a query while the blocking task owns `lease`
    ///
    /// The blocking work cannot be cancelled, so `lease` lives inside it and
    /// comes back with the result. It is dropped when the task finishes if the
    /// caller stopped waiting, and lost if the task panicked.
    pub(crate) async fn execute_holding<L: Send + 'static>(
        &self,
        query_type: QueryType,
        source: &Path,
        filters: &QueryFilters,
        database_file: &str,
        lease: L,
    ) -> (Result<QueryResult>, Option<L>) {
        let source: PathBuf = source.to_path_buf();
        let filters = filters.clone();

        let task = match &self.backend {
            Backend::Sqlite(conn) => {
                let conn = Arc::clone(conn);
                let database_file = database_file.to_string();
                tokio::task::spawn_blocking(move || {
                    let result = if reads_flat_file(&source, &database_file) {
                        flat_file::execute(&source, query_type, &filters)
                    } else {
                        let conn = conn.lock();
                        structured::execute(&conn, &source, query_type, &filters, &database_file)
                    };
                    (result, lease)
                })
            }
            Backend::FlatFile => tokio::task::spawn_blocking(move || {
                (flat_file::execute(&source, query_type, &filters), lease)
            }),
        };

        match task.await {
            Ok((result, lease)) => (result, Some(lease)),
            Err(e) => (
                Err(KgError::QueryExecution {
                    query_type: query_type.to_string(),
                    message: format!("query task failed: {}", e),
                }),
                None,
            ),
        }
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> Option<Arc<Mutex<Connection>>> {
        match &self.backend {
            Backend::Sqlite(conn) => Some(Arc::clone(conn)),
            Backend::FlatFile => None,
        }
    }
}

/// Whether a structured-store handle should read `source` as a flat file
fn reads_flat_file(source: &Path, database_file: &str) -> bool {
    flat_file::is_flat_file(source)
        || (structured::resolve_database(source, database_file).is_none()
            && flat_file::has_data(source))
}

impl fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_open_kinds() {
        let (structured, info) = PoolHandle::open(true);
        assert_eq!(structured.kind(), HandleKind::StructuredStore);
        assert_eq!(info.state, HandleState::Created);
        assert_eq!(info.id, structured.id());

        let (flat, info) = PoolHandle::open(false);
        assert_eq!(flat.kind(), HandleKind::FlatFile);
        assert_eq!(info.kind, HandleKind::FlatFile);
    }

    #[test]
    fn test_lease_stamps_usage() {
        let (_, mut info) = PoolHandle::open(false);
        info.lease();
        info.lease();
        assert_eq!(info.state, HandleState::Leased);
        assert_eq!(info.use_count, 2);
        assert!(info.last_used_at.is_some());
        assert!(info.is_active());
    }

    #[tokio::test]
    async fn test_structured_handle_reads_flat_files_without_database() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("entities.jsonl"), "{\"id\":\"e1\"}\n").unwrap();

        let (handle, _) = PoolHandle::open(true);
        let result = handle
            .execute(QueryType::Entities, dir.path(), &QueryFilters::new(), "knowledge.db")
            .await
            .unwrap();

        assert_eq!(result.rows[0]["id"], json!("e1"));
    }

    #[tokio::test]
    async fn test_structured_handle_reads_flat_file_paths() {
        let dir = TempDir::new().unwrap();
        let jsonl = dir.path().join("entities.jsonl");
        let csv = dir.path().join("relationships.csv");
        fs::write(&jsonl, "{\"id\":\"e1\"}\n").unwrap();
        fs::write(&csv, "id,source,target\nr1,ALICE,ACME\n").unwrap();
        assert!(reads_flat_file(&jsonl, "knowledge.db"));
        assert!(reads_flat_file(&csv, "knowledge.db"));

        let (handle, _) = PoolHandle::open(true);
        let entities = handle
            .execute(QueryType::Entities, &jsonl, &QueryFilters::new(), "knowledge.db")
            .await
            .unwrap();
        let relationships = handle
            .execute(QueryType::Relationships, &csv, &QueryFilters::new(), "knowledge.db")
            .await
            .unwrap();

        assert_eq!(entities.rows[0]["id"], json!("e1"));
        assert_eq!(relationships.rows[0]["target"], json!("ACME"));
    }

    #[tokio::test]
    async fn test_flat_file_handle_missing_source() {
        let dir = TempDir::new().unwrap();
        let (handle, _) = PoolHandle::open(false);

        let err = handle
            .execute(QueryType::Entities, dir.path(), &QueryFilters::new(), "knowledge.db")
            .await
            .unwrap_err();
        assert!(matches!(err, KgError::SourceNotFound(_)));
    }
}
