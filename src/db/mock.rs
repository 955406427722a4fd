//! Mock database clients for testing.
//!
//! Provides an in-memory database implementation for headless testing and
//! the `--mock-db` flag.

use super::{Column, ColumnInfo, DatabaseClient, QueryResult, Schema, Table, Value};
use crate::error::{Result, SageError};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// A mock database client that returns predefined results.
///
/// Responses are matched by case-insensitive substring against the executed
/// SQL, first registered match wins. Unmatched queries return an empty result.
pub struct MockDatabaseClient {
    schema: Schema,
    dialect: String,
    responses: Vec<(String, QueryResult)>,
    executed: Mutex<Vec<String>>,
}

impl MockDatabaseClient {
    /// Creates a new mock database client with an empty schema.
    pub fn new() -> Self {
        Self {
            schema: Schema::default(),
            dialect: "PostgreSQL".to_string(),
            responses: Vec::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Creates a new mock database client with the given schema.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            ..Self::new()
        }
    }

    /// Creates a mock with a small customers table and an empty unicorns table.
    pub fn with_sample_data() -> Self {
        let schema = Schema {
            tables: vec![
                Table::new("customers")
                    .with_column(Column::new("id", "integer").nullable(false))
                    .with_column(Column::new("name", "text").nullable(false))
                    .with_column(Column::new("email", "text"))
                    .with_column(Column::new("country", "text"))
                    .with_primary_key(&["id"]),
                Table::new("unicorns")
                    .with_column(Column::new("id", "integer").nullable(false))
                    .with_column(Column::new("name", "text"))
                    .with_primary_key(&["id"]),
            ],
            foreign_keys: Vec::new(),
        };

        let customers = QueryResult::with_data(
            vec![
                ColumnInfo::new("name", "text"),
                ColumnInfo::new("email", "text"),
            ],
            vec![
                vec!["Ada".into(), "ada@example.com".into()],
                vec!["Grace".into(), "grace@example.com".into()],
                vec!["Linus".into(), "linus@example.com".into()],
            ],
        );

        Self::with_schema(schema)
            .with_response("unicorns", QueryResult::new())
            .with_response("count(", Self::single_value("count", Value::Int(3)))
            .with_response("customers", customers)
    }

    /// Sets the dialect reported to the query generator.
    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = dialect.into();
        self
    }

    /// Registers a canned result for queries containing `pattern`.
    pub fn with_response(mut self, pattern: impl Into<String>, result: QueryResult) -> Self {
        self.responses.push((pattern.into().to_lowercase(), result));
        self
    }

    /// Returns every SQL statement executed so far, in order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|queries| queries.clone())
            .unwrap_or_default()
    }

    fn single_value(column: &str, value: Value) -> QueryResult {
        QueryResult::with_data(vec![ColumnInfo::new(column, "int8")], vec![vec![value]])
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn dialect(&self) -> &str {
        &self.dialect
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        Ok(self.schema.clone())
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        let sql_lower = sql.to_lowercase();
        let result = self
            .responses
            .iter()
            .find(|(pattern, _)| sql_lower.contains(pattern.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_default();

        Ok(result.with_execution_time(Duration::from_millis(1)))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A database client whose queries always fail with the given message.
pub struct FailingDatabaseClient {
    schema: Schema,
    message: String,
}

impl FailingDatabaseClient {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            schema: Schema::default(),
            message: message.into(),
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    fn dialect(&self) -> &str {
        "PostgreSQL"
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        Ok(self.schema.clone())
    }

    async fn execute_query(&self, _sql: &str) -> Result<QueryResult> {
        Err(SageError::query(self.message.clone()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
