//! SQLite database client implementation.

use crate::config::ConnectionConfig;
use crate::db::{
    Column, ColumnInfo, DatabaseBackend, DatabaseClient, ForeignKey, QueryResult, Row, Schema,
    Table, Value, MAX_ROWS,
};
use crate::error::{Result, SageError};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo, ValueRef};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Query timeout in seconds.
const QUERY_TIMEOUT_SECS: u64 = 30;

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    pool: SqlitePool,
}

impl SqliteClient {
    /// Opens the database file (or in-memory database) named by the config.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        // An in-memory database lives and dies with its connection, so the
        // pool must never hand out a second one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(config.connection_string())
            .await
            .map_err(|e| {
                SageError::connection(format!(
                    "Cannot open SQLite database '{}': {e}",
                    config.database()
                ))
            })?;

        debug!("Opened SQLite database {}", config.database());
        Ok(Self { pool })
    }

    /// Runs a batch of statements. Used to seed fixtures.
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| SageError::query(e.to_string()))?;
        Ok(())
    }

    async fn fetch_table_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SageError::query(format!("Failed to fetch tables: {e}")))
    }

    async fn fetch_table(&self, table_name: &str) -> Result<Table> {
        let rows: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
            "SELECT name, type, \"notnull\", dflt_value, pk \
             FROM pragma_table_info(?) ORDER BY cid",
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            SageError::query(format!("Failed to fetch columns for {table_name}: {e}"))
        })?;

        let mut primary_key: Vec<(i64, String)> = Vec::new();
        let columns = rows
            .into_iter()
            .map(|(name, data_type, not_null, default, pk)| {
                if pk > 0 {
                    primary_key.push((pk, name.clone()));
                }
                Column {
                    name,
                    data_type,
                    is_nullable: not_null == 0 && pk == 0,
                    default,
                }
            })
            .collect();
        primary_key.sort_by_key(|(position, _)| *position);

        Ok(Table {
            name: table_name.to_string(),
            columns,
            primary_key: primary_key.into_iter().map(|(_, name)| name).collect(),
        })
    }

    async fn fetch_foreign_keys(&self, table_name: &str) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(i64, String, String, Option<String>)> = sqlx::query_as(
            "SELECT id, \"table\", \"from\", \"to\" \
             FROM pragma_foreign_key_list(?) ORDER BY id, seq",
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            SageError::query(format!("Failed to fetch foreign keys for {table_name}: {e}"))
        })?;

        let mut foreign_keys: Vec<(i64, ForeignKey)> = Vec::new();
        for (id, to_table, from_column, to_column) in rows {
            // A missing target column means the referenced table's primary key
            let to_column = to_column.unwrap_or_else(|| "rowid".to_string());
            match foreign_keys.last_mut() {
                Some((last_id, fk)) if *last_id == id => {
                    fk.from_columns.push(from_column);
                    fk.to_columns.push(to_column);
                }
                _ => foreign_keys.push((
                    id,
                    ForeignKey::new(table_name, vec![from_column], to_table, vec![to_column]),
                )),
            }
        }

        Ok(foreign_keys.into_iter().map(|(_, fk)| fk).collect())
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    fn dialect(&self) -> &str {
        DatabaseBackend::Sqlite.dialect()
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        let mut schema = Schema::new();
        for name in self.fetch_table_names().await? {
            schema.tables.push(self.fetch_table(&name).await?);
            schema
                .foreign_keys
                .extend(self.fetch_foreign_keys(&name).await?);
        }
        Ok(schema)
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            Duration::from_secs(QUERY_TIMEOUT_SECS),
            sqlx::query(sql).fetch_all(&self.pool),
        )
        .await
        .map_err(|_| {
            SageError::query(format!(
                "Query timed out after {QUERY_TIMEOUT_SECS} seconds"
            ))
        })?
        .map_err(|e| SageError::query(format_query_error(e)))?;

        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = result
            .first()
            .map(|first_row| {
                first_row
                    .columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect()
            })
            .unwrap_or_default();

        if result.len() > MAX_ROWS {
            warn!(
                "Query returned {} rows, truncating to {} rows",
                result.len(),
                MAX_ROWS
            );
        }

        let rows: Vec<Row> = result.iter().map(convert_row).collect();

        Ok(QueryResult::with_data(columns, rows)
            .truncated(MAX_ROWS)
            .with_execution_time(execution_time))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Converts a SqliteRow to our Row type.
///
/// SQLite is dynamically typed, so each cell is decoded by the storage class
/// of the value itself rather than the declared column type.
fn convert_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|index| convert_value(row, index))
        .collect()
}

fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let storage_class = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    match storage_class.as_str() {
        "INTEGER" | "INT" | "BIGINT" => row
            .try_get::<i64, _>(index)
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "BOOLEAN" => row
            .try_get::<bool, _>(index)
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => row
            .try_get::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<String, _>(index)
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => format!("ERROR: {}", db_error.message()),
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn shop() -> SqliteClient {
        let config = ConnectionConfig::from_connection_string("sqlite::memory:").unwrap();
        let client = SqliteClient::connect(&config).await.unwrap();
        client
            .execute_batch(
                "CREATE TABLE customers (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    country TEXT DEFAULT 'US'
                );
                CREATE TABLE orders (
                    id INTEGER PRIMARY KEY,
                    customer_id INTEGER NOT NULL REFERENCES customers(id),
                    total REAL NOT NULL,
                    receipt BLOB
                );
                INSERT INTO customers (id, name, country) VALUES (1, 'Ada', 'UK'), (2, 'Grace', NULL);
                INSERT INTO orders (id, customer_id, total) VALUES (10, 1, 12.5);",
            )
            .await
            .unwrap();
        client
    }

    #[tokio::test]
    async fn test_introspect_schema() {
        let client = shop().await;
        let schema = client.introspect_schema().await.unwrap();

        let names: Vec<&str> = schema.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["customers", "orders"]);

        let customers = schema.table("customers").unwrap();
        assert_eq!(customers.primary_key, vec!["id".to_string()]);
        assert!(!customers.columns[1].is_nullable);
        assert_eq!(customers.columns[2].default.as_deref(), Some("'US'"));

        assert_eq!(schema.foreign_keys.len(), 1);
        let fk = &schema.foreign_keys[0];
        assert_eq!(fk.from_table, "orders");
        assert_eq!(fk.to_table, "customers");
        assert_eq!(fk.to_columns, vec!["id".to_string()]);
    }

    #[tokio::test]
    async fn test_execute_query_values() {
        let client = shop().await;
        let result = client
            .execute_query(
                "SELECT c.name, c.country, o.total, o.receipt \
                 FROM customers c LEFT JOIN orders o ON o.customer_id = c.id ORDER BY c.id",
            )
            .await
            .unwrap();

        assert_eq!(result.row_count, 2);
        assert_eq!(result.columns[0].name, "name");
        assert_eq!(
            result.rows[0],
            vec![
                Value::String("Ada".into()),
                Value::String("UK".into()),
                Value::Float(12.5),
                Value::Null
            ]
        );
        assert_eq!(result.rows[1][1], Value::Null);
    }

    #[tokio::test]
    async fn test_execute_query_empty() {
        let client = shop().await;
        let result = client
            .execute_query("SELECT name FROM customers WHERE id = 99")
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.to_text(), "[]");
    }

    #[tokio::test]
    async fn test_execute_query_error() {
        let client = shop().await;
        let err = client
            .execute_query("SELECT * FROM unicorns")
            .await
            .unwrap_err();
        assert!(matches!(err, SageError::Query(_)));
        assert!(err.to_string().contains("unicorns"));
    }
}
