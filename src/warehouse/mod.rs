//! Data warehouse backend.
//!
//! Warehouse statements run asynchronously: a statement is submitted, its
//! status is polled until it reaches a terminal state, and then its result is
//! fetched. [`StatementApi`] is the seam to the service; [`WarehouseClient`]
//! drives the protocol and plugs into the pipeline as a `DatabaseClient`.

mod client;
mod redshift;

pub use client::WarehouseClient;
pub use redshift::RedshiftDataApi;

use crate::db::{ColumnInfo, Row};
use crate::error::{Result, SageError};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// How a statement is routed to the warehouse.
///
/// Exactly one mode is ever used; it is chosen once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addressing {
    /// Redshift Serverless, addressed by workgroup.
    Serverless { workgroup_name: String },
    /// A provisioned cluster, addressed by cluster identifier and database user.
    Provisioned {
        cluster_identifier: String,
        db_user: String,
    },
}

impl Addressing {
    /// Picks the addressing mode from the configured values.
    ///
    /// Supplying neither mode, both modes, or half of the provisioned mode is
    /// a configuration error.
    pub fn resolve(
        workgroup_name: Option<String>,
        cluster_identifier: Option<String>,
        db_user: Option<String>,
    ) -> Result<Self> {
        match (workgroup_name, cluster_identifier, db_user) {
            (Some(workgroup_name), None, None) => Ok(Self::Serverless { workgroup_name }),
            (None, Some(cluster_identifier), Some(db_user)) => Ok(Self::Provisioned {
                cluster_identifier,
                db_user,
            }),
            (Some(_), Some(_), _) => Err(SageError::config(
                "Set either REDSHIFT_WORKGROUP_NAME or REDSHIFT_CLUSTER_IDENTIFIER, not both",
            )),
            (Some(_), None, Some(_)) => Err(SageError::config(
                "REDSHIFT_DB_USER only applies to provisioned clusters; \
                 unset it or use REDSHIFT_CLUSTER_IDENTIFIER",
            )),
            (None, Some(_), None) => Err(SageError::config(
                "REDSHIFT_DB_USER is required with REDSHIFT_CLUSTER_IDENTIFIER",
            )),
            (None, None, _) => Err(SageError::config(
                "Set REDSHIFT_WORKGROUP_NAME (serverless) or REDSHIFT_CLUSTER_IDENTIFIER \
                 and REDSHIFT_DB_USER (provisioned cluster)",
            )),
        }
    }
}

impl fmt::Display for Addressing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serverless { workgroup_name } => write!(f, "workgroup {workgroup_name}"),
            Self::Provisioned {
                cluster_identifier,
                db_user,
            } => write!(f, "cluster {cluster_identifier} as {db_user}"),
        }
    }
}

/// Lifecycle state of a submitted statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementStatus {
    Submitted,
    Picked,
    Started,
    Finished,
    Failed,
    Aborted,
}

impl StatementStatus {
    /// Parses the service's status string. Unknown values are treated as
    /// still running so that polling continues until a known terminal state.
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "PICKED" => Self::Picked,
            "STARTED" => Self::Started,
            "FINISHED" => Self::Finished,
            "FAILED" => Self::Failed,
            "ABORTED" => Self::Aborted,
            _ => Self::Submitted,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Picked => "PICKED",
            Self::Started => "STARTED",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status report for a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementDescription {
    pub status: StatementStatus,
    /// Error text reported by the service for failed statements.
    pub error: Option<String>,
    /// False for statements that produce no rows (DDL, DML).
    pub has_result_set: bool,
}

impl StatementDescription {
    pub fn new(status: StatementStatus) -> Self {
        Self {
            status,
            error: None,
            has_result_set: true,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: StatementStatus::Failed,
            error: Some(error.into()),
            has_result_set: false,
        }
    }

    /// Marks a statement as having no result to fetch.
    pub fn without_result_set(mut self) -> Self {
        self.has_result_set = false;
        self
    }
}

/// One page of a finished statement's result.
#[derive(Debug, Clone, Default)]
pub struct ResultPage {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Row>,
    /// Row count of the whole result, when the service reports it.
    pub total_rows: Option<usize>,
    /// Token for the following page; `None` on the last page.
    pub next_token: Option<String>,
}

impl ResultPage {
    /// Creates a final page with the given columns and rows.
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            total_rows: None,
            next_token: None,
        }
    }

    pub fn with_next_token(mut self, token: impl Into<String>) -> Self {
        self.next_token = Some(token.into());
        self
    }

    pub fn with_total_rows(mut self, total: usize) -> Self {
        self.total_rows = Some(total);
        self
    }
}

/// Bounds on the status polling loop.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Maximum number of status checks.
    pub max_attempts: u32,
    /// Wait before the second status check; doubles after every check.
    pub initial_delay: Duration,
    /// Upper bound on a single wait.
    pub max_delay: Duration,
    /// Upper bound on the whole wait for a terminal state.
    pub timeout: Duration,
}

impl PollPolicy {
    /// Returns the wait after the given (1-based) status check.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

/// The asynchronous statement service.
#[async_trait]
pub trait StatementApi: Send + Sync {
    /// Submits a statement and returns its id.
    async fn submit(&self, database: &str, sql: &str, addressing: &Addressing) -> Result<String>;

    /// Reports the current status of a statement.
    async fn describe(&self, statement_id: &str) -> Result<StatementDescription>;

    /// Fetches one page of a finished statement's result. `None` asks for
    /// the first page.
    async fn fetch_page(
        &self,
        statement_id: &str,
        next_token: Option<String>,
    ) -> Result<ResultPage>;

    /// Cancels a running statement.
    async fn cancel(&self, statement_id: &str) -> Result<()>;
}
