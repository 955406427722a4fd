//! PostgreSQL integration tests.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable to run them.

use sqlsage::config::{ConnectionConfig, PipelineSettings};
use sqlsage::db::{DatabaseClient, PostgresClient, Value};
use sqlsage::error::SageError;
use sqlsage::llm::MockLlmClient;
use sqlsage::pipeline::TurnOrchestrator;

/// Helper to create a test client.
async fn get_test_client() -> Option<PostgresClient> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    PostgresClient::connect(&config).await.ok()
}

#[tokio::test]
async fn test_execute_simple_select() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = client
        .execute_query("SELECT 1 AS num, 'hello' AS greeting, 12.50::numeric AS price")
        .await
        .unwrap();

    assert_eq!(result.columns.len(), 3);
    assert_eq!(result.rows[0][0], Value::Int(1));
    assert_eq!(result.rows[0][1], Value::String("hello".to_string()));
    assert_eq!(result.to_text(), r#"[{"num":1,"greeting":"hello","price":"12.50"}]"#);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_syntax_error_is_verbatim() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = client.execute_query("SELEC 1").await.unwrap_err();
    assert!(matches!(err, SageError::Query(_)));
    assert!(err.to_string().contains("syntax error"));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_turn_against_postgres() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let llm = MockLlmClient::new().with_query("server version", "SELECT 42 AS answer;");
    let mut orch = TurnOrchestrator::connect(
        Box::new(llm),
        Box::new(client),
        PipelineSettings::default(),
    )
    .await
    .unwrap();

    assert_eq!(orch.dialect(), "PostgreSQL");
    let turn = orch.run_turn("What is the server version?").await.unwrap();
    assert_eq!(turn.result, r#"[{"answer":42}]"#);
    assert_eq!(turn.answer, "Found 1 result: 42.");

    orch.close().await.unwrap();
}
