//! Query execution.
//!
//! Runs generated SQL against whichever backend was injected and renders the
//! rows as text for the answer prompt. Backend errors pass through untouched.

use std::time::Instant;

use crate::db::{DatabaseClient, QueryResult};
use crate::error::Result;

use super::history::{ConversationHistory, EntryKind};

/// Result of running one query.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub result: QueryResult,
    /// Rendering handed to the answer composer.
    pub text: String,
}

/// Executes SQL against a database or warehouse client.
pub struct QueryExecutor<'a> {
    db: &'a dyn DatabaseClient,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(db: &'a dyn DatabaseClient) -> Self {
        Self { db }
    }

    /// Executes `sql` and returns its result with the rendered result
    /// appended to `history`.
    ///
    /// The query itself is recorded by the generator, so only a missing
    /// query entry (SQL not produced by this session's generator) is added.
    pub async fn execute(
        &self,
        sql: &str,
        history: ConversationHistory,
    ) -> Result<(ExecutionOutput, ConversationHistory)> {
        let start = Instant::now();
        tracing::debug!(sql_len = sql.len(), dialect = self.db.dialect(), "Executing query");

        let result = self.db.execute_query(sql).await.map_err(|e| {
            tracing::warn!(
                duration_ms = start.elapsed().as_millis(),
                error = %e,
                "Query failed"
            );
            e
        })?;

        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            row_count = result.row_count,
            was_truncated = result.was_truncated,
            "Query executed"
        );

        let text = result.to_text();
        let already_recorded = history
            .last()
            .is_some_and(|e| e.kind == EntryKind::Query && e.text == sql);
        let history = if already_recorded {
            history
        } else {
            history.with_entry(EntryKind::Query, sql)
        };
        let history = history.with_entry(EntryKind::Result, text.clone());

        Ok((ExecutionOutput { result, text }, history))
    }
}
