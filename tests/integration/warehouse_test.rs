//! Pipeline tests against a scripted warehouse statement service.

use async_trait::async_trait;
use sqlsage::config::{PipelineSettings, WarehouseConfig};
use sqlsage::db::{ColumnInfo, DatabaseClient, Value};
use sqlsage::error::{Result, SageError};
use sqlsage::llm::MockLlmClient;
use sqlsage::pipeline::{TurnOrchestrator, TurnStage};
use sqlsage::warehouse::{
    Addressing, PollPolicy, ResultPage, StatementApi, StatementDescription, StatementStatus,
    WarehouseClient,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Every statement reports SUBMITTED twice, then its scripted final status.
#[derive(Default)]
struct Warehouse {
    statements: Mutex<Vec<String>>,
    describes: Mutex<HashMap<String, usize>>,
    fetches: Mutex<usize>,
    fail_with: Option<String>,
}

#[derive(Clone, Default)]
struct ScriptedWarehouse(Arc<Warehouse>);

impl ScriptedWarehouse {
    fn failing(message: &str) -> Self {
        Self(Arc::new(Warehouse {
            fail_with: Some(message.to_string()),
            ..Warehouse::default()
        }))
    }

    fn describes_for(&self, statement_id: &str) -> usize {
        self.0
            .describes
            .lock()
            .unwrap()
            .get(statement_id)
            .copied()
            .unwrap_or(0)
    }

    fn fetches(&self) -> usize {
        *self.0.fetches.lock().unwrap()
    }

    fn sql_of(&self, statement_id: &str) -> String {
        let index: usize = statement_id.trim_start_matches("stmt-").parse().unwrap();
        self.0.statements.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl StatementApi for ScriptedWarehouse {
    async fn submit(&self, database: &str, sql: &str, addressing: &Addressing) -> Result<String> {
        assert_eq!(database, "dev");
        assert!(matches!(addressing, Addressing::Serverless { .. }));
        let mut statements = self.0.statements.lock().unwrap();
        statements.push(sql.to_string());
        Ok(format!("stmt-{}", statements.len() - 1))
    }

    async fn describe(&self, statement_id: &str) -> Result<StatementDescription> {
        let mut describes = self.0.describes.lock().unwrap();
        let count = describes.entry(statement_id.to_string()).or_insert(0);
        *count += 1;
        if *count < 3 {
            return Ok(StatementDescription::new(StatementStatus::Submitted));
        }

        let sql = self.sql_of(statement_id);
        let is_schema_query = sql.contains("information_schema");
        match &self.0.fail_with {
            Some(message) if !is_schema_query => Ok(StatementDescription::failed(message.clone())),
            _ if sql.starts_with("DELETE") => {
                Ok(StatementDescription::new(StatementStatus::Finished).without_result_set())
            }
            _ => Ok(StatementDescription::new(StatementStatus::Finished)),
        }
    }

    async fn fetch_page(
        &self,
        statement_id: &str,
        next_token: Option<String>,
    ) -> Result<ResultPage> {
        assert!(next_token.is_none());
        *self.0.fetches.lock().unwrap() += 1;
        let sql = self.sql_of(statement_id);

        if sql.contains("information_schema") {
            let text = |s: &str| Value::String(s.to_string());
            return Ok(ResultPage::new(
                vec![
                    ColumnInfo::new("table_name", "varchar"),
                    ColumnInfo::new("column_name", "varchar"),
                    ColumnInfo::new("data_type", "varchar"),
                    ColumnInfo::new("is_nullable", "varchar"),
                ],
                vec![
                    vec![text("customers"), text("name"), text("character varying"), text("NO")],
                    vec![text("customers"), text("email"), text("character varying"), text("YES")],
                    vec![text("unicorns"), text("name"), text("character varying"), text("YES")],
                ],
            ));
        }

        if sql.contains("unicorns") {
            return Ok(ResultPage::new(
                vec![ColumnInfo::new("name", "varchar")],
                Vec::new(),
            ));
        }

        Ok(ResultPage::new(
            vec![
                ColumnInfo::new("name", "varchar"),
                ColumnInfo::new("email", "varchar"),
            ],
            vec![vec![
                Value::String("Ada".to_string()),
                Value::String("ada@example.com".to_string()),
            ]],
        ))
    }

    async fn cancel(&self, _statement_id: &str) -> Result<()> {
        Ok(())
    }
}

fn config() -> WarehouseConfig {
    WarehouseConfig {
        region: "us-east-1".to_string(),
        database: "dev".to_string(),
        addressing: Addressing::Serverless {
            workgroup_name: "analytics".to_string(),
        },
        polling: PollPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            timeout: Duration::from_secs(5),
        },
    }
}

async fn orchestrator(api: ScriptedWarehouse) -> TurnOrchestrator {
    let client = WarehouseClient::new(api, &config());
    TurnOrchestrator::connect(
        Box::new(MockLlmClient::new()),
        Box::new(client),
        PipelineSettings::default(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_schema_comes_from_warehouse() {
    let api = ScriptedWarehouse::default();
    let orch = orchestrator(api.clone()).await;

    assert_eq!(orch.dialect(), "Amazon Redshift (PostgreSQL-compatible)");
    let customers = orch.schema().table("customers").unwrap();
    assert_eq!(customers.columns.len(), 2);
    assert!(orch.schema().table("unicorns").is_some());
    assert_eq!(api.describes_for("stmt-0"), 3);
}

#[tokio::test]
async fn test_turn_polls_three_times_and_fetches_once() {
    let api = ScriptedWarehouse::default();
    let mut orch = orchestrator(api.clone()).await;
    let fetches_after_schema = api.fetches();

    let turn = orch.run_turn("List all customers").await.unwrap();

    assert_eq!(api.sql_of("stmt-1"), "SELECT name, email FROM customers LIMIT 10;");
    assert_eq!(api.describes_for("stmt-1"), 3);
    assert_eq!(api.fetches(), fetches_after_schema + 1);
    assert_eq!(turn.result, r#"[{"name":"Ada","email":"ada@example.com"}]"#);
    assert_eq!(turn.answer, "Found 1 result: Ada / ada@example.com.");
}

#[tokio::test]
async fn test_empty_warehouse_result() {
    let mut orch = orchestrator(ScriptedWarehouse::default()).await;

    let turn = orch
        .run_turn("How many unicorns are registered?")
        .await
        .unwrap();
    assert!(turn.answer.contains("No information was found"));
}

#[tokio::test]
async fn test_failed_statement_carries_backend_message() {
    let api = ScriptedWarehouse::failing("ERROR: permission denied for relation customers");
    let mut orch = orchestrator(api.clone()).await;
    let fetches_after_schema = api.fetches();

    let failure = orch.run_turn("List all customers").await.unwrap_err();

    assert_eq!(failure.stage(), TurnStage::Executing);
    assert!(matches!(failure.error, SageError::Query(_)));
    assert!(failure
        .to_string()
        .contains("permission denied for relation customers"));
    assert_eq!(api.fetches(), fetches_after_schema);
}

#[tokio::test]
async fn test_warehouse_client_is_a_database_client() {
    let client = WarehouseClient::new(ScriptedWarehouse::default(), &config());
    let client: &dyn DatabaseClient = &client;
    let result = client.execute_query("SELECT name FROM unicorns").await.unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_statement_without_rows_answers_from_empty_result() {
    let api = ScriptedWarehouse::default();
    let client = WarehouseClient::new(api.clone(), &config());
    let fetches_before = api.fetches();

    let result = client
        .execute_query("DELETE FROM unicorns WHERE id = 1")
        .await
        .unwrap();

    assert_eq!(result.to_text(), "[]");
    assert_eq!(api.describes_for("stmt-0"), 3);
    assert_eq!(api.fetches(), fetches_before);
}
