//! Query result types for sqlsage.
//!
//! Defines the structures used to represent query results and their textual
//! rendering, which is what the answer composer sees.

use serde_json::{Map, Number, Value as JsonValue};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Represents the result of executing a SQL query.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Column metadata for the result set.
    pub columns: Vec<ColumnInfo>,

    /// Rows of data.
    pub rows: Vec<Row>,

    /// Time taken to execute the query.
    pub execution_time: Duration,

    /// Number of rows in the result (may be truncated).
    pub row_count: usize,

    /// Total number of rows before truncation (if known).
    pub total_rows: Option<usize>,

    /// Whether the result was truncated due to exceeding MAX_ROWS.
    pub was_truncated: bool,
}

impl QueryResult {
    /// Creates a new empty query result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query result with the given columns and rows.
    pub fn with_data(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            execution_time: Duration::ZERO,
            row_count,
            total_rows: Some(row_count),
            was_truncated: false,
        }
    }

    /// Sets the execution time.
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.execution_time = duration;
        self
    }

    /// Keeps at most `max_rows` rows, recording the original count.
    pub fn truncated(mut self, max_rows: usize) -> Self {
        let total = self.rows.len();
        if total > max_rows {
            self.rows.truncate(max_rows);
            self.was_truncated = true;
        }
        self.row_count = self.rows.len();
        self.total_rows = Some(total);
        self
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns a truncation warning message if the result was truncated.
    pub fn truncation_warning(&self) -> Option<String> {
        if !self.was_truncated {
            return None;
        }
        Some(match self.total_rows {
            Some(total) => format!(
                "Result truncated: showing {} of {} rows",
                self.row_count, total
            ),
            None => format!("Result truncated: showing the first {} rows", self.row_count),
        })
    }

    /// Returns one distinct key per column.
    ///
    /// Joins often select the same name twice (`c.name, p.name`); later
    /// repeats get a numeric suffix (`name_2`) so no value is overwritten.
    pub fn record_keys(&self) -> Vec<String> {
        let mut used: HashSet<String> = HashSet::new();
        self.columns
            .iter()
            .map(|col| {
                let mut key = col.name.clone();
                let mut ordinal = 1;
                while !used.insert(key.clone()) {
                    ordinal += 1;
                    key = format!("{}_{ordinal}", col.name);
                }
                key
            })
            .collect()
    }

    /// Zips each row with the column keys into an ordered mapping.
    pub fn to_records(&self) -> Vec<Map<String, JsonValue>> {
        let keys = self.record_keys();
        self.rows
            .iter()
            .map(|row| {
                keys.iter()
                    .zip(row.iter())
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect()
            })
            .collect()
    }

    /// Renders the result as text: a JSON array of row objects, followed by a
    /// truncation note when rows were dropped. An empty result renders as `[]`.
    pub fn to_text(&self) -> String {
        let records: Vec<JsonValue> = self.to_records().into_iter().map(JsonValue::Object).collect();
        let mut text = JsonValue::Array(records).to_string();
        if let Some(warning) = self.truncation_warning() {
            text.push('\n');
            text.push_str(&warning);
        }
        text
    }
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Column data type.
    pub data_type: String,
}

impl ColumnInfo {
    /// Creates a new column info with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A row of data from a query result.
pub type Row = Vec<Value>;

/// Represents a single value from a database query.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts the value to a string representation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }

    /// Converts the value to JSON for result rendering.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number((*i).into()),
            // NaN and infinities have no JSON number form
            Value::Float(f) => Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(f.to_string())),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Bytes(_) => JsonValue::String(self.to_display_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}
