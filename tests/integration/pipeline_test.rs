//! End-to-end pipeline tests against an in-memory SQLite database.

use pretty_assertions::assert_eq;
use serde_json::json;
use sqlsage::config::{ConnectionConfig, PipelineSettings};
use sqlsage::db::{DatabaseClient, SqliteClient};
use sqlsage::error::SageError;
use sqlsage::llm::MockLlmClient;
use sqlsage::pipeline::{
    ConversationHistory, EntryKind, GenerationStrategy, TurnOrchestrator, TurnStage,
};
use tokio_test::{assert_err, assert_ok};

const SHOP: &str = "
    CREATE TABLE customers (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT
    );
    CREATE TABLE unicorns (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE products (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        customer_id INTEGER NOT NULL REFERENCES customers(id)
    );
    INSERT INTO customers (id, name, email) VALUES
        (1, 'Ada', 'ada@example.com'),
        (2, 'Grace', 'grace@example.com');
    INSERT INTO products (id, name, customer_id) VALUES
        (1, 'Widget', 1),
        (2, 'Gadget', 2);
";

async fn shop_db() -> SqliteClient {
    let config = ConnectionConfig::from_connection_string("sqlite::memory:").unwrap();
    let client = SqliteClient::connect(&config).await.unwrap();
    client.execute_batch(SHOP).await.unwrap();
    client
}

async fn orchestrator_with(llm: MockLlmClient, settings: PipelineSettings) -> TurnOrchestrator {
    TurnOrchestrator::connect(Box::new(llm), Box::new(shop_db().await), settings)
        .await
        .unwrap()
}

fn kinds(history: &ConversationHistory) -> Vec<EntryKind> {
    history.entries().iter().map(|e| e.kind).collect()
}

#[tokio::test]
async fn test_list_all_customers() {
    let llm = MockLlmClient::new();
    let mut orch = orchestrator_with(llm.clone(), PipelineSettings::default()).await;

    let turn = orch.run_turn("List all customers").await.unwrap();

    assert_eq!(
        turn.generated_query,
        "SELECT name, email FROM customers LIMIT 10;"
    );
    assert_eq!(
        turn.result,
        r#"[{"name":"Ada","email":"ada@example.com"},{"name":"Grace","email":"grace@example.com"}]"#
    );
    assert_eq!(
        turn.answer,
        "Found 2 results: Ada / ada@example.com; Grace / grace@example.com."
    );

    // Query prompt is grounded in the live schema and dialect
    let calls = llm.calls();
    assert_eq!(calls.len(), 2);
    let system = &calls[0][0].content;
    assert!(system.contains("syntactically correct SQLite query"));
    assert!(system.contains("at most 10 results"));
    assert!(system.contains("customers"));
    assert!(system.contains("unicorns"));
}

#[tokio::test]
async fn test_schema_is_introspected_at_connect() {
    let orch = orchestrator_with(MockLlmClient::new(), PipelineSettings::default()).await;
    let expected = shop_db().await.introspect_schema().await.unwrap();

    assert_eq!(orch.schema(), &expected);
    assert_eq!(orch.schema().foreign_keys.len(), 1);
}

#[tokio::test]
async fn test_join_keeps_both_name_columns() {
    let llm = MockLlmClient::new().with_query(
        "who bought",
        "SELECT c.name, p.name FROM customers c JOIN products p ON p.customer_id = c.id ORDER BY c.id;",
    );
    let mut orch = orchestrator_with(llm, PipelineSettings::default()).await;

    let turn = orch.run_turn("Who bought which product?").await.unwrap();

    assert_eq!(
        turn.result,
        r#"[{"name":"Ada","name_2":"Widget"},{"name":"Grace","name_2":"Gadget"}]"#
    );
    assert_eq!(turn.answer, "Found 2 results: Ada / Widget; Grace / Gadget.");
}

#[tokio::test]
async fn test_empty_table_reports_no_information() {
    let mut orch = orchestrator_with(MockLlmClient::new(), PipelineSettings::default()).await;

    let turn = assert_ok!(orch.run_turn("How many unicorns are registered?").await);

    assert_eq!(turn.result, "[]");
    assert!(turn.answer.contains("No information was found"));
}

#[tokio::test]
async fn test_tool_calling_strategy_runs_the_same_pipeline() {
    let settings = PipelineSettings {
        strategy: GenerationStrategy::ToolCalling,
        ..PipelineSettings::default()
    };
    let llm = MockLlmClient::new();
    let mut orch = orchestrator_with(llm.clone(), settings).await;

    let turn = orch.run_turn("How many customers are there?").await.unwrap();

    assert_eq!(turn.generated_query, "SELECT COUNT(*) AS count FROM customers;");
    assert_eq!(turn.result, r#"[{"count":2}]"#);
    assert_eq!(turn.answer, "Found 1 result: 2.");
    assert!(llm.calls()[0][0].content.contains("sql_database"));
}

#[tokio::test]
async fn test_row_limit_reaches_prompt() {
    let settings = PipelineSettings {
        row_limit: 3,
        ..PipelineSettings::default()
    };
    let llm = MockLlmClient::new();
    let mut orch = orchestrator_with(llm.clone(), settings).await;

    orch.run_turn("List all customers").await.unwrap();
    assert!(llm.calls()[0][0].content.contains("at most 3 results"));
}

#[tokio::test]
async fn test_history_grows_append_only_across_turns() {
    let llm = MockLlmClient::new();
    let mut orch = orchestrator_with(llm.clone(), PipelineSettings::default()).await;

    orch.run_turn("List all customers").await.unwrap();
    let after_first = orch.history().clone();
    orch.run_turn("How many unicorns are registered?")
        .await
        .unwrap();

    assert!(after_first.is_prefix_of(orch.history()));
    assert_eq!(orch.history().len(), 8);
    assert_eq!(orch.history().turn_count(), 2);

    // The second query prompt carries the first turn as prior conversation
    let second_query_prompt = &llm.calls()[2][1].content;
    assert!(second_query_prompt.starts_with("Conversation so far:\nUser: List all customers"));
    assert!(second_query_prompt.contains("Answer: Found 2 results"));
    assert!(second_query_prompt.ends_with("Question: How many unicorns are registered?"));
}

#[tokio::test]
async fn test_history_window_limits_prompt() {
    let settings = PipelineSettings {
        history_turns: 1,
        ..PipelineSettings::default()
    };
    let llm = MockLlmClient::new();
    let mut orch = orchestrator_with(llm.clone(), settings).await;

    orch.run_turn("List all customers").await.unwrap();
    orch.run_turn("How many unicorns are registered?")
        .await
        .unwrap();
    orch.run_turn("How many customers are there?").await.unwrap();

    let third_query_prompt = &llm.calls()[4][1].content;
    assert!(!third_query_prompt.contains("List all customers"));
    assert!(third_query_prompt.contains("User: How many unicorns are registered?"));
    assert_eq!(orch.history().len(), 12);
}

#[tokio::test]
async fn test_non_conforming_output_aborts_turn_only() {
    let llm = MockLlmClient::new()
        .with_structured_output("revenue", json!({"query": "SELECT 1", "confidence": 0.9}));
    let mut orch = orchestrator_with(llm, PipelineSettings::default()).await;

    orch.run_turn("List all customers").await.unwrap();
    let before = orch.history().clone();

    let failure = assert_err!(orch.run_turn("What was revenue last year?").await);
    assert_eq!(failure.stage(), TurnStage::Querying);
    assert!(matches!(failure.error, SageError::Llm(_)));
    assert_eq!(orch.history(), &before);

    // The session keeps going
    let turn = orch
        .run_turn("How many unicorns are registered?")
        .await
        .unwrap();
    assert!(turn.is_done());
}

#[tokio::test]
async fn test_invalid_sql_surfaces_database_error() {
    let llm = MockLlmClient::new().with_query("emails", "SELECT emali FROM customers;");
    let mut orch = orchestrator_with(llm, PipelineSettings::default()).await;

    let failure = orch.run_turn("Show me all emails").await.unwrap_err();

    assert_eq!(failure.stage(), TurnStage::Executing);
    assert!(matches!(failure.error, SageError::Query(_)));
    assert!(failure.to_string().contains("emali"));
    assert_eq!(
        kinds(orch.history()),
        vec![EntryKind::Question, EntryKind::Query]
    );
}
