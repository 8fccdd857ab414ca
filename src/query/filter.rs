//! Query filters and their translation
//!
//! Column names are identifiers and go through an allow-list; filter values
//! are data and are only ever bound as SQL parameters.

use crate::cache::key::write_canonical;
use crate::error::{KgError, Result};
use crate::query::{QueryType, Row};
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A condition on a single column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum Condition {
    /// Column equals the value
    Eq(Value),

    /// Column equals any of the values
    In(Vec<Value>),

    /// Column text contains the substring (case-sensitive)
    Contains(String),
}

/// Filters applied to a query, one condition per column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    #[serde(default)]
    conditions: BTreeMap<String, Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
}

impl QueryFilters {
    /// No filtering
    pub fn new() -> Self {
        Self::default()
    }

    /// Simple key/value filters: arrays become membership tests, everything
    /// else an equality test
    pub fn from_map(map: serde_json::Map<String, Value>) -> Self {
        let conditions = map
            .into_iter()
            .map(|(column, value)| {
                let condition = match value {
                    Value::Array(values) => Condition::In(values),
                    other => Condition::Eq(other),
                };
                (column, condition)
            })
            .collect();

        Self {
            conditions,
            limit: None,
        }
    }

    /// Require `column == value`
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .insert(column.into(), Condition::Eq(value.into()));
        self
    }

    /// Require `column` to be one of `values`
    pub fn one_of<V: Into<Value>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions.insert(column.into(), Condition::In(values));
        self
    }

    /// Require `column` to contain `needle`
    pub fn contains(mut self, column: impl Into<String>, needle: impl Into<String>) -> Self {
        self.conditions
            .insert(column.into(), Condition::Contains(needle.into()));
        self
    }

    /// Return at most `n` rows
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Configured row limit
    pub fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Conditions by column
    pub fn conditions(&self) -> &BTreeMap<String, Condition> {
        &self.conditions
    }

    /// Whether no condition and no limit is set
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.limit.is_none()
    }

    /// Canonical, order-independent encoding used in cache keys
    pub fn signature(&self) -> String {
        let mut out = String::new();
        // Serializing plain maps, strings and numbers cannot fail
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        write_canonical(&value, &mut out);
        out
    }

    /// Reject any column not allow-listed for `query_type`
    pub fn validate(&self, query_type: QueryType) -> Result<()> {
        for column in self.conditions.keys() {
            if !is_plain_identifier(column) || !query_type.allows_column(column) {
                return Err(KgError::UnsafeIdentifier(format!(
                    "column '{}' is not queryable on {}",
                    column, query_type
                )));
            }
        }
        Ok(())
    }

    /// Build a parameterized SELECT against `schema.table`
    pub fn to_sql(&self, query_type: QueryType, schema: &str) -> Result<(String, Vec<SqlValue>)> {
        self.validate(query_type)?;
        if !is_plain_identifier(schema) {
            return Err(KgError::UnsafeIdentifier(format!("schema '{}'", schema)));
        }

        let mut sql = format!(
            "SELECT * FROM {}.{}",
            quote_identifier(schema),
            quote_identifier(query_type.table_name())
        );
        let mut params = Vec::new();
        let mut clauses = Vec::with_capacity(self.conditions.len());

        for (column, condition) in &self.conditions {
            let column = quote_identifier(column);
            match condition {
                Condition::Eq(Value::Null) => clauses.push(format!("{} IS NULL", column)),
                Condition::Eq(value) => {
                    clauses.push(format!("{} = ?", column));
                    params.push(to_sql_value(value));
                }
                Condition::In(values) if values.is_empty() => clauses.push("0 = 1".to_string()),
                Condition::In(values) => {
                    let placeholders = vec!["?"; values.len()].join(", ");
                    clauses.push(format!("{} IN ({})", column, placeholders));
                    params.extend(values.iter().map(to_sql_value));
                }
                Condition::Contains(needle) => {
                    clauses.push(format!("instr({}, ?) > 0", column));
                    params.push(SqlValue::Text(needle.clone()));
                }
            }
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        Ok((sql, params))
    }

    /// Whether an in-memory row satisfies every condition
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|(column, condition)| {
            let cell = row.get(column).unwrap_or(&Value::Null);
            match condition {
                Condition::Eq(expected) => loose_eq(cell, expected),
                Condition::In(values) => values.iter().any(|v| loose_eq(cell, v)),
                Condition::Contains(needle) => {
                    as_text(cell).map_or(false, |text| text.contains(needle.as_str()))
                }
            }
        })
    }

    /// Filter rows in memory and apply the limit
    pub fn apply<I: IntoIterator<Item = Row>>(&self, rows: I) -> Vec<Row> {
        rows.into_iter()
            .filter(|row| self.matches(row))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name)
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Equality tolerant of flat files that store every cell as text
fn loose_eq(cell: &Value, expected: &Value) -> bool {
    if cell == expected {
        return true;
    }
    if cell.is_null() || expected.is_null() {
        return false;
    }
    if let (Some(a), Some(b)) = (as_number(cell), as_number(expected)) {
        return a == b;
    }
    as_text(cell) == as_text(expected)
}
