//! Structured-store execution over SQLite
//!
//! Each handle owns one in-memory connection. A query attaches the source
//! database file under a fixed schema name, runs a parameterized SELECT and
//! detaches again, so a handle can serve any workspace.

use crate::error::{KgError, Result};
use crate::query::{flat_file, QueryFilters, QueryResult, QueryType, Row};
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

const SOURCE_SCHEMA: &str = "src";

/// Open the connection backing a structured-store handle
pub(crate) fn open_connection() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    Ok(conn)
}

/// Locate the database file for `source`
///
/// A source that is itself a file is used as-is unless it is a JSON or CSV
/// file; a directory must contain `database_file`.
pub(crate) fn resolve_database(source: &Path, database_file: &str) -> Option<PathBuf> {
    if source.is_file() {
        return (!flat_file::is_flat_file(source)).then(|| source.to_path_buf());
    }
    let candidate = source.join(database_file);
    candidate.is_file().then_some(candidate)
}

/// Run one query against the database behind `source`
pub(crate) fn execute(
    conn: &Connection,
    source: &Path,
    query_type: QueryType,
    filters: &QueryFilters,
    database_file: &str,
) -> Result<QueryResult> {
    let (sql, params) = filters.to_sql(query_type, SOURCE_SCHEMA)?;
    let database = resolve_database(source, database_file)
        .ok_or_else(|| KgError::SourceNotFound(source.to_path_buf()))?;

    if is_attached(conn)? {
        conn.execute("DETACH DATABASE src", [])?;
    }

    let path = database.to_string_lossy().into_owned();
    conn.execute("ATTACH DATABASE ?1 AS src", [&path])?;
    debug!("Attached {} for {} query", path, query_type);

    let result = run_select(conn, &sql, params);

    // Detach even when the query failed so the handle stays reusable
    let detached = conn.execute("DETACH DATABASE src", []);
    let result = result?;
    detached?;

    Ok(result)
}

fn is_attached(conn: &Connection) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM pragma_database_list WHERE name = ?1")?;
    let attached = stmt.exists([SOURCE_SCHEMA])?;
    Ok(attached)
}

fn run_select(
    conn: &Connection,
    sql: &str,
    params: Vec<rusqlite::types::Value>,
) -> Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query(params_from_iter(params))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            record.insert(name.clone(), to_json(row.get_ref(idx)?));
        }
        out.push(record);
    }

    Ok(QueryResult::new(columns, out))
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}
