//! Submit/poll/fetch driver for warehouse statements.

use super::{Addressing, PollPolicy, StatementApi, StatementStatus};
use crate::config::WarehouseConfig;
use crate::db::{ColumnInfo, DatabaseClient, QueryResult, Row, Schema, MAX_ROWS};
use crate::error::{Result, SageError};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info, warn};

const DIALECT: &str = "Amazon Redshift (PostgreSQL-compatible)";

const SCHEMA_QUERY: &str = "SELECT table_name, column_name, data_type, is_nullable \
     FROM information_schema.columns \
     WHERE table_schema = 'public' \
     ORDER BY table_name, ordinal_position";

/// A `DatabaseClient` backed by an asynchronous statement service.
pub struct WarehouseClient<A> {
    api: A,
    database: String,
    addressing: Addressing,
    policy: PollPolicy,
}

impl<A: StatementApi> WarehouseClient<A> {
    pub fn new(api: A, config: &WarehouseConfig) -> Self {
        Self {
            api,
            database: config.database.clone(),
            addressing: config.addressing.clone(),
            policy: config.polling.clone(),
        }
    }

    /// Submits `sql`, waits for a terminal status and fetches the result.
    pub async fn run_statement(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let statement_id = self
            .api
            .submit(&self.database, sql, &self.addressing)
            .await?;
        debug!(statement_id = %statement_id, "Submitted warehouse statement");

        let has_result_set = self.wait_for_completion(&statement_id, start).await?;

        let result = if has_result_set {
            self.fetch_result(&statement_id, MAX_ROWS).await?
        } else {
            QueryResult::new()
        };
        let elapsed = start.elapsed();
        info!(
            statement_id = %statement_id,
            rows = result.row_count,
            elapsed_ms = elapsed.as_millis() as u64,
            "Warehouse statement finished"
        );

        Ok(result.with_execution_time(elapsed))
    }

    /// Pages through the result, stopping once more than `max_rows` rows
    /// are in hand.
    async fn fetch_result(&self, statement_id: &str, max_rows: usize) -> Result<QueryResult> {
        let mut columns: Vec<ColumnInfo> = Vec::new();
        let mut rows: Vec<Row> = Vec::new();
        let mut reported_total: Option<usize> = None;
        let mut next_token: Option<String> = None;
        let mut pages_left_unread = false;

        loop {
            let page = self.api.fetch_page(statement_id, next_token.take()).await?;
            if columns.is_empty() {
                columns = page.columns;
            }
            reported_total = reported_total.or(page.total_rows);
            rows.extend(page.rows);

            match page.next_token {
                Some(token) if rows.len() <= max_rows => {
                    debug!(statement_id, rows = rows.len(), "Fetching next result page");
                    next_token = Some(token);
                }
                Some(_) => {
                    warn!(
                        statement_id,
                        rows = rows.len(),
                        "Row cap reached, leaving remaining result pages unread"
                    );
                    pages_left_unread = true;
                    break;
                }
                None => break,
            }
        }

        let fetched = rows.len();
        let mut result = QueryResult::with_data(columns, rows).truncated(max_rows);
        if pages_left_unread {
            result.total_rows = reported_total.filter(|total| *total >= fetched);
        }
        Ok(result)
    }

    /// Polls until the statement finishes. Returns whether it has rows to fetch.
    async fn wait_for_completion(&self, statement_id: &str, start: Instant) -> Result<bool> {
        for attempt in 1..=self.policy.max_attempts {
            let description = self.api.describe(statement_id).await?;
            debug!(statement_id, attempt, status = %description.status, "Polled statement");

            match description.status {
                StatementStatus::Finished => return Ok(description.has_result_set),
                StatementStatus::Failed => {
                    return Err(SageError::query(format!(
                        "Statement failed: {}",
                        description
                            .error
                            .as_deref()
                            .unwrap_or("no error message reported")
                    )))
                }
                StatementStatus::Aborted => {
                    return Err(SageError::query(match description.error {
                        Some(error) => format!("Statement was aborted: {error}"),
                        None => "Statement was aborted".to_string(),
                    }))
                }
                StatementStatus::Submitted | StatementStatus::Picked | StatementStatus::Started => {}
            }

            if attempt == self.policy.max_attempts {
                break;
            }

            let delay = self.policy.delay_after(attempt);
            if start.elapsed() + delay > self.policy.timeout {
                self.abandon(statement_id).await;
                return Err(SageError::query(format!(
                    "Statement did not finish within {} seconds",
                    self.policy.timeout.as_secs_f64()
                )));
            }
            tokio::time::sleep(delay).await;
        }

        self.abandon(statement_id).await;
        Err(SageError::query(format!(
            "Statement did not finish after {} status checks",
            self.policy.max_attempts
        )))
    }

    /// Best-effort cancel of a statement we stopped waiting for.
    async fn abandon(&self, statement_id: &str) {
        if let Err(e) = self.api.cancel(statement_id).await {
            warn!(statement_id, error = %e, "Failed to cancel abandoned statement");
        }
    }
}

#[async_trait]
impl<A: StatementApi> DatabaseClient for WarehouseClient<A> {
    fn dialect(&self) -> &str {
        DIALECT
    }

    async fn introspect_schema(&self) -> Result<Schema> {
        let result = self.run_statement(SCHEMA_QUERY).await?;
        let rows = result.rows.iter().filter_map(|row| match row.as_slice() {
            [table, column, data_type, is_nullable, ..] => Some((
                table.to_display_string(),
                column.to_display_string(),
                data_type.to_display_string(),
                is_nullable.to_display_string().eq_ignore_ascii_case("yes"),
            )),
            _ => None,
        });
        Ok(Schema::from_column_rows(rows))
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.run_statement(sql).await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
