//! Startup configuration tests.
//!
//! Everything here must fail before any network call is made.

use sqlsage::config::{BackendConfig, BackendKind, BackendOverrides, Config};
use sqlsage::db::DatabaseBackend;
use sqlsage::error::SageError;
use sqlsage::pipeline::GenerationStrategy;
use sqlsage::warehouse::Addressing;
use std::time::Duration;

fn load(toml: &str) -> Config {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, toml).unwrap();
    Config::load_from_file(&path).unwrap()
}

fn config_error(result: sqlsage::error::Result<BackendConfig>) -> String {
    match result {
        Err(SageError::Config(message)) => message,
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[test]
fn test_file_configures_serverless_warehouse() {
    let config = load(
        r#"
[warehouse]
region = "eu-central-1"
database = "dev"
workgroup_name = "analytics"

[warehouse.polling]
max_attempts = 5
initial_delay_ms = 100
"#,
    );

    let BackendConfig::Warehouse(wh) = config.resolve_backend(&BackendOverrides::default()).unwrap()
    else {
        panic!("expected the warehouse backend");
    };
    assert_eq!(wh.region, "eu-central-1");
    assert_eq!(
        wh.addressing,
        Addressing::Serverless {
            workgroup_name: "analytics".to_string()
        }
    );
    assert_eq!(wh.polling.max_attempts, 5);
    assert_eq!(wh.polling.initial_delay, Duration::from_millis(100));
}

#[test]
fn test_overrides_take_precedence_over_file() {
    let config = load(
        r#"
[database]
url = "postgres://app@db.internal/shop"
"#,
    );
    let overrides = BackendOverrides {
        db_uri: Some("sqlite::memory:".to_string()),
        ..BackendOverrides::default()
    };

    let BackendConfig::Direct(conn) = config.resolve_backend(&overrides).unwrap() else {
        panic!("expected the direct backend");
    };
    assert_eq!(conn.backend, DatabaseBackend::Sqlite);
}

#[test]
fn test_both_addressing_modes_rejected() {
    let overrides = BackendOverrides {
        kind: Some(BackendKind::Warehouse),
        region: Some("us-east-1".to_string()),
        database: Some("dev".to_string()),
        workgroup_name: Some("analytics".to_string()),
        cluster_identifier: Some("prod".to_string()),
        db_user: Some("awsuser".to_string()),
        ..BackendOverrides::default()
    };

    let message = config_error(Config::default().resolve_backend(&overrides));
    assert!(message.contains("REDSHIFT_WORKGROUP_NAME"));
}

#[test]
fn test_cluster_without_user_rejected() {
    let overrides = BackendOverrides {
        region: Some("us-east-1".to_string()),
        database: Some("dev".to_string()),
        cluster_identifier: Some("prod".to_string()),
        ..BackendOverrides::default()
    };

    let message = config_error(Config::default().resolve_backend(&overrides));
    assert!(message.contains("REDSHIFT_DB_USER"));
}

#[test]
fn test_missing_region_rejected() {
    let overrides = BackendOverrides {
        database: Some("dev".to_string()),
        workgroup_name: Some("analytics".to_string()),
        ..BackendOverrides::default()
    };

    let message = config_error(Config::default().resolve_backend(&overrides));
    assert_eq!(message, "AWS_REGION is not set");
}

#[test]
fn test_nothing_configured_rejected() {
    let message = config_error(Config::default().resolve_backend(&BackendOverrides::default()));
    assert!(message.contains("DB_URI"));
}

#[test]
fn test_pipeline_section() {
    let config = load(
        r#"
[pipeline]
strategy = "tool-calling"
row_limit = 50
history_turns = 3
"#,
    );

    let settings = config.pipeline_settings(None, None).unwrap();
    assert_eq!(settings.strategy, GenerationStrategy::ToolCalling);
    assert_eq!(settings.row_limit, 50);
    assert_eq!(settings.history_turns, 3);

    let settings = config.pipeline_settings(Some("structured"), Some(5)).unwrap();
    assert_eq!(settings.strategy, GenerationStrategy::Structured);
    assert_eq!(settings.row_limit, 5);
}
