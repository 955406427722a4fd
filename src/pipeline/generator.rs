//! Query generation.
//!
//! Turns a question into SQL, either through the model's structured-output
//! mode or by making it call the `sql_database` tool. Both paths end in a
//! validated [`QueryOutput`].

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::error::{Result, SageError};
use crate::llm::prompt::{build_query_messages, QueryContext};
use crate::llm::structured::{generate_structured, parse_structured, QueryOutput};
use crate::llm::tools::{sql_database_tool, SQL_DATABASE_TOOL};
use crate::llm::LlmClient;

use super::history::{ConversationHistory, EntryKind};

/// How the model is asked for a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenerationStrategy {
    /// Structured output constrained to `QueryOutput`.
    #[default]
    Structured,
    /// A forced call to the `sql_database` tool.
    ToolCalling,
}

impl GenerationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::ToolCalling => "tool-calling",
        }
    }
}

impl FromStr for GenerationStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "structured" => Ok(Self::Structured),
            "tool-calling" | "tool_calling" | "tools" => Ok(Self::ToolCalling),
            _ => Err(format!(
                "Unknown generation strategy: {s}. Expected: structured or tool-calling"
            )),
        }
    }
}

impl fmt::Display for GenerationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generates SQL for a question.
pub struct QueryGenerator<'a> {
    client: &'a dyn LlmClient,
    strategy: GenerationStrategy,
    history_turns: usize,
}

impl<'a> QueryGenerator<'a> {
    pub fn new(client: &'a dyn LlmClient, strategy: GenerationStrategy) -> Self {
        Self {
            client,
            strategy,
            history_turns: usize::MAX,
        }
    }

    /// Limits how many prior turns go into the prompt.
    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Generates a query and returns it with the question and query appended
    /// to `history`.
    pub async fn generate(
        &self,
        question: &str,
        history: ConversationHistory,
        ctx: &QueryContext<'_>,
    ) -> Result<(String, ConversationHistory)> {
        let start = Instant::now();
        let transcript = history.render(self.history_turns);
        let tool_calling = self.strategy == GenerationStrategy::ToolCalling;
        let messages = build_query_messages(ctx, &transcript, question, tool_calling);

        tracing::debug!(
            strategy = %self.strategy,
            dialect = ctx.dialect,
            row_limit = ctx.row_limit,
            transcript_len = transcript.len(),
            "Generating query"
        );

        let output = match self.strategy {
            GenerationStrategy::Structured => {
                generate_structured::<QueryOutput>(self.client, &messages).await?
            }
            GenerationStrategy::ToolCalling => {
                let response = self
                    .client
                    .complete_with_tools(&messages, &[sql_database_tool()])
                    .await?;
                let call = response.tool_call(SQL_DATABASE_TOOL).ok_or_else(|| {
                    SageError::llm(format!("Model did not call the {SQL_DATABASE_TOOL} tool"))
                })?;
                let arguments: serde_json::Value = serde_json::from_str(&call.arguments)
                    .map_err(|e| {
                        SageError::llm(format!("Invalid {SQL_DATABASE_TOOL} arguments: {e}"))
                    })?;
                parse_structured::<QueryOutput>(arguments)?
            }
        };

        let sql = output.query.trim().to_string();
        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            sql_len = sql.len(),
            "Generated query"
        );

        let history = history
            .with_entry(EntryKind::Question, question)
            .with_entry(EntryKind::Query, sql.clone());
        Ok((sql, history))
    }
}
