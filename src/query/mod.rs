//! Query types, filters and the two execution paths
//!
//! A query names one of the indexed tables, a source locator (a workspace
//! output directory or a file inside it) and a set of filters. Structured
//! stores are queried with SQL; flat files are read and filtered in memory.

pub mod filter;
pub(crate) mod flat_file;
pub(crate) mod structured;

pub use filter::{Condition, QueryFilters};

use crate::error::KgError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One result row, column name -> value
pub type Row = serde_json::Map<String, Value>;

/// The indexed tables that can be queried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Entities,
    Relationships,
    Communities,
    CommunityReports,
    TextUnits,
}

impl QueryType {
    /// Every query type
    pub const ALL: [QueryType; 5] = [
        QueryType::Entities,
        QueryType::Relationships,
        QueryType::Communities,
        QueryType::CommunityReports,
        QueryType::TextUnits,
    ];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Entities => "entities",
            QueryType::Relationships => "relationships",
            QueryType::Communities => "communities",
            QueryType::CommunityReports => "community_reports",
            QueryType::TextUnits => "text_units",
        }
    }

    /// Table name in a structured store, and file stem in a flat-file source
    pub fn table_name(&self) -> &'static str {
        self.as_str()
    }

    /// Columns that filters may reference
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            QueryType::Entities => &[
                "id",
                "human_readable_id",
                "title",
                "type",
                "description",
                "text_unit_ids",
                "frequency",
                "degree",
            ],
            QueryType::Relationships => &[
                "id",
                "human_readable_id",
                "source",
                "target",
                "description",
                "weight",
                "combined_degree",
                "text_unit_ids",
            ],
            QueryType::Communities => &[
                "id",
                "human_readable_id",
                "community",
                "level",
                "parent",
                "title",
                "entity_ids",
                "relationship_ids",
                "text_unit_ids",
                "period",
                "size",
            ],
            QueryType::CommunityReports => &[
                "id",
                "human_readable_id",
                "community",
                "level",
                "parent",
                "title",
                "summary",
                "full_content",
                "rank",
                "rating_explanation",
                "findings",
                "period",
                "size",
            ],
            QueryType::TextUnits => &[
                "id",
                "human_readable_id",
                "text",
                "n_tokens",
                "document_ids",
                "entity_ids",
                "relationship_ids",
            ],
        }
    }

    /// Whether `column` is on this type's allow-list
    pub fn allows_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = KgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueryType::ALL
            .into_iter()
            .find(|qt| qt.as_str() == s)
            .ok_or_else(|| KgError::UnsafeIdentifier(format!("unknown query type '{}'", s)))
    }
}

/// Tabular query result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in result order
    pub columns: Vec<String>,

    /// Rows keyed by column name
    pub rows: Vec<Row>,
}

impl QueryResult {
    /// Create a result from columns and rows
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, `Null` where a row lacks it
    pub fn column<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows
            .iter()
            .map(move |row| row.get(name).unwrap_or(&Value::Null))
    }
}
