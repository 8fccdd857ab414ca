//! Flat-file execution: JSON Lines, JSON arrays and CSV
//!
//! A directory source is searched for `{table}.jsonl`, `{table}.json` and
//! `{table}.csv` in that order. A file source is read according to its
//! extension and must hold the requested table.

use crate::error::{KgError, Result};
use crate::query::{QueryFilters, QueryResult, QueryType, Row};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    JsonLines,
    Json,
    Csv,
}

impl Format {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "jsonl" | "ndjson" => Some(Format::JsonLines),
            "json" => Some(Format::Json),
            "csv" => Some(Format::Csv),
            _ => None,
        }
    }
}

fn resolve(source: &Path, query_type: QueryType) -> Option<(PathBuf, Format)> {
    if source.is_file() {
        return Format::from_path(source).map(|format| (source.to_path_buf(), format));
    }

    let table = query_type.table_name();
    [
        ("jsonl", Format::JsonLines),
        ("json", Format::Json),
        ("csv", Format::Csv),
    ]
    .into_iter()
    .map(|(ext, format)| (source.join(format!("{}.{}", table, ext)), format))
    .find(|(path, _)| path.is_file())
}

/// Whether `source` is a single file in one of the flat-file formats
pub(crate) fn is_flat_file(source: &Path) -> bool {
    source.is_file() && Format::from_path(source).is_some()
}

/// Whether `source` holds flat-file data for any query type
pub(crate) fn has_data(source: &Path) -> bool {
    QueryType::ALL
        .into_iter()
        .any(|qt| resolve(source, qt).is_some())
}

/// Read and filter the flat file behind `source`
pub(crate) fn execute(
    source: &Path,
    query_type: QueryType,
    filters: &QueryFilters,
) -> Result<QueryResult> {
    filters.validate(query_type)?;

    let (path, format) =
        resolve(source, query_type).ok_or_else(|| KgError::SourceNotFound(source.to_path_buf()))?;
    debug!("Reading {} rows from {}", query_type, path.display());

    let (header, rows) = match format {
        Format::JsonLines => (None, read_json_lines(&path)?),
        Format::Json => (None, read_json_array(&path)?),
        Format::Csv => {
            let (header, rows) = read_csv(&path)?;
            (Some(header), rows)
        }
    };

    let columns = header.unwrap_or_else(|| columns_in_order(&rows));
    Ok(QueryResult::new(columns, filters.apply(rows)))
}

fn into_row(value: Value, path: &Path) -> Result<Row> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(KgError::SerializationError(format!(
            "{}: expected an object per record, found {}",
            path.display(),
            other
        ))),
    }
}

fn read_json_lines(path: &Path) -> Result<Vec<Row>> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(into_row(serde_json::from_str(&line)?, path)?);
    }
    Ok(rows)
}

fn read_json_array(path: &Path) -> Result<Vec<Row>> {
    let value: Value = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    match value {
        Value::Array(items) => items.into_iter().map(|item| into_row(item, path)).collect(),
        other => Ok(vec![into_row(other, path)?]),
    }
}

fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Row>)> {
    let mut reader = csv::Reader::from_path(path)?;
    let header: Vec<String> = reader.headers()?.iter().map(String::from).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = header
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::String(cell.to_string())
                };
                (name.clone(), value)
            })
            .collect();
        rows.push(row);
    }
    Ok((header, rows))
}

/// Column names in first-seen order across all rows
fn columns_in_order(rows: &[Row]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for name in row.keys() {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.clone());
            }
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_jsonl_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("entities.jsonl"),
            "{\"id\":\"e1\",\"type\":\"PERSON\"}\n\n{\"id\":\"e2\",\"type\":\"ORG\",\"degree\":2}\n",
        )
        .unwrap();

        let result = execute(
            dir.path(),
            QueryType::Entities,
            &QueryFilters::new().eq("type", "PERSON"),
        )
        .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result.rows[0]["id"], json!("e1"));
        assert!(result.columns.contains(&"degree".to_string()));
        assert!(has_data(dir.path()));
        assert!(is_flat_file(&dir.path().join("entities.jsonl")));
        assert!(!is_flat_file(dir.path()));
    }

    #[test]
    fn test_csv_file_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relationships.csv");
        fs::write(&path, "id,source,target,weight\nr1,ALICE,ACME,1.0\nr2,BOB,ACME,\n").unwrap();

        let result = execute(
            &path,
            QueryType::Relationships,
            &QueryFilters::new().eq("weight", 1),
        )
        .unwrap();

        assert_eq!(result.columns, vec!["id", "source", "target", "weight"]);
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows[0]["source"], json!("ALICE"));
    }

    #[test]
    fn test_json_array() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("communities.json"),
            json!([{"id": "c1", "level": 0}, {"id": "c2", "level": 1}]).to_string(),
        )
        .unwrap();

        let result = execute(dir.path(), QueryType::Communities, &QueryFilters::new().limit(1)).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.columns, vec!["id", "level"]);
    }

    #[test]
    fn test_missing_and_malformed() {
        let dir = TempDir::new().unwrap();
        assert!(!has_data(dir.path()));
        assert!(matches!(
            execute(dir.path(), QueryType::TextUnits, &QueryFilters::new()),
            Err(KgError::SourceNotFound(_))
        ));

        fs::write(dir.path().join("text_units.jsonl"), "[1, 2]\n").unwrap();
        assert!(matches!(
            execute(dir.path(), QueryType::TextUnits, &QueryFilters::new()),
            Err(KgError::SerializationError(_))
        ));
    }
}
