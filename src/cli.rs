//! Command-line argument parsing for sqlsage.
//!
//! Backend values can be given as flags or through the environment (a `.env`
//! file is loaded first); flags win.

use crate::config::{BackendKind, BackendOverrides};
use crate::llm::LlmProvider;
use clap::Parser;
use std::path::PathBuf;

/// Ask questions about your database in plain English.
#[derive(Parser, Debug)]
#[command(name = "sqlsage")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Database connection URL (postgres://..., sqlite://...)
    #[arg(long, env = "DB_URI", value_name = "URL", hide_env_values = true)]
    pub db_uri: Option<String>,

    /// Backend to use: direct, warehouse or mock (inferred when omitted)
    #[arg(long, value_name = "KIND")]
    pub backend: Option<String>,

    /// AWS region of the Redshift warehouse
    #[arg(long, env = "AWS_REGION", value_name = "REGION")]
    pub region: Option<String>,

    /// Redshift database name
    #[arg(long = "redshift-database", env = "REDSHIFT_DATABASE", value_name = "NAME")]
    pub redshift_database: Option<String>,

    /// Redshift Serverless workgroup
    #[arg(long, env = "REDSHIFT_WORKGROUP_NAME", value_name = "NAME")]
    pub workgroup_name: Option<String>,

    /// Provisioned Redshift cluster identifier
    #[arg(long, env = "REDSHIFT_CLUSTER_IDENTIFIER", value_name = "ID")]
    pub cluster_identifier: Option<String>,

    /// Database user for a provisioned cluster
    #[arg(long, env = "REDSHIFT_DB_USER", value_name = "USER")]
    pub db_user: Option<String>,

    /// LLM provider: openai, anthropic, ollama or mock
    #[arg(long, value_name = "PROVIDER")]
    pub llm: Option<String>,

    /// Model name (defaults per provider)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Query generation strategy: structured or tool-calling
    #[arg(long, value_name = "STRATEGY")]
    pub strategy: Option<String>,

    /// Default row limit the model applies to queries
    #[arg(long, value_name = "N")]
    pub row_limit: Option<u32>,

    /// Path to config file (default: ~/.config/sqlsage/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Ask a single question and exit
    #[arg(long, value_name = "QUESTION")]
    pub ask: Option<String>,

    /// Print the generated SQL before each answer
    #[arg(long)]
    pub show_sql: bool,

    /// Log to stderr instead of the log file
    #[arg(short, long)]
    pub verbose: bool,

    /// Use the in-memory mock database (shorthand for --backend mock)
    #[arg(long, conflicts_with = "backend")]
    pub mock_db: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path, using the default if not specified.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }

    /// Parses the --backend flag.
    pub fn backend_kind(&self) -> std::result::Result<Option<BackendKind>, String> {
        if self.mock_db {
            return Ok(Some(BackendKind::Mock));
        }
        self.backend.as_deref().map(str::parse).transpose()
    }

    /// Parses the --llm flag.
    pub fn llm_provider(&self) -> std::result::Result<Option<LlmProvider>, String> {
        self.llm.as_deref().map(str::parse).transpose()
    }

    /// Collects the backend values for config resolution.
    pub fn backend_overrides(&self) -> std::result::Result<BackendOverrides, String> {
        Ok(BackendOverrides {
            kind: self.backend_kind()?,
            db_uri: self.db_uri.clone(),
            region: self.region.clone(),
            database: self.redshift_database.clone(),
            workgroup_name: self.workgroup_name.clone(),
            cluster_identifier: self.cluster_identifier.clone(),
            db_user: self.db_user.clone(),
        })
    }
}
