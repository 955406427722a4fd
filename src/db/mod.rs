//! Database abstraction layer for sqlsage.
//!
//! Provides a trait-based interface for query execution and schema
//! introspection, so that direct databases, the data warehouse and test
//! doubles can be used interchangeably by the pipeline.

mod mock;
mod postgres;
mod schema;
mod sqlite;
mod types;

pub use mock::{FailingDatabaseClient, MockDatabaseClient};
pub use postgres::PostgresClient;
pub use schema::{Column, ForeignKey, Schema, Table};
pub use sqlite::SqliteClient;
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::config::BackendConfig;
use crate::error::Result;
use crate::warehouse::{RedshiftDataApi, WarehouseClient};
use async_trait::async_trait;

/// Maximum rows to return from a query.
pub const MAX_ROWS: usize = 1000;

/// Supported direct database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    Sqlite,
}

impl DatabaseBackend {
    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a backend from a URL scheme.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Returns the default port for this backend.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Sqlite => 0,
        }
    }

    /// Returns the SQL dialect name given to the query generator.
    pub fn dialect(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::Sqlite => "SQLite",
        }
    }
}

/// Creates a database client for the resolved backend configuration.
///
/// This is the central factory function for database connections.
pub async fn connect(config: &BackendConfig) -> Result<Box<dyn DatabaseClient>> {
    match config {
        BackendConfig::Direct(conn) => match conn.backend {
            DatabaseBackend::Postgres => Ok(Box::new(PostgresClient::connect(conn).await?)),
            DatabaseBackend::Sqlite => Ok(Box::new(SqliteClient::connect(conn).await?)),
        },
        BackendConfig::Warehouse(wh) => {
            let api = RedshiftDataApi::from_config(wh).await;
            Ok(Box::new(WarehouseClient::new(api, wh)))
        }
        BackendConfig::Mock => Ok(Box::new(MockDatabaseClient::with_sample_data())),
    }
}

/// Trait defining the interface for database clients.
///
/// All database operations are async and return Results with SageError.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Returns the SQL dialect this backend speaks (e.g. "PostgreSQL").
    fn dialect(&self) -> &str;

    /// Introspects the database schema, returning table and relationship information.
    async fn introspect_schema(&self) -> Result<Schema>;

    /// Executes a SQL query and returns the results.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
