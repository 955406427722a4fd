//! Mock LLM client for testing.
//!
//! Provides deterministic responses based on input patterns, so the whole
//! pipeline can run without a model endpoint.

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};

use crate::error::{Result, SageError};
use crate::llm::structured::OutputSchema;
use crate::llm::tools::{ToolDefinition, SQL_DATABASE_TOOL};
use crate::llm::types::{LlmResponse, Message, Role, ToolCall};
use crate::llm::LlmClient;

/// Mock LLM client that returns canned responses based on input patterns.
///
/// Patterns are matched case-insensitively against the question (the text
/// after the last `Question:` marker in the final user message). Custom
/// mappings are checked before the built-in ones.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Question pattern -> SQL.
    queries: Vec<(String, String)>,
    /// Question pattern -> raw structured value, conforming or not.
    raw_outputs: Vec<(String, serde_json::Value)>,
    /// Question pattern -> answer text.
    answers: Vec<(String, String)>,
    /// Calls whose prompt contains one of these fail with an LLM error.
    failures: Vec<String>,
    /// Every message list received, in order.
    calls: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps questions containing `pattern` to the given SQL.
    pub fn with_query(mut self, pattern: impl Into<String>, sql: impl Into<String>) -> Self {
        self.queries
            .push((pattern.into().to_lowercase(), sql.into()));
        self
    }

    /// Returns `value` verbatim as the structured output for matching questions.
    pub fn with_structured_output(
        mut self,
        pattern: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.raw_outputs.push((pattern.into().to_lowercase(), value));
        self
    }

    /// Maps questions containing `pattern` to the given answer.
    pub fn with_answer(mut self, pattern: impl Into<String>, answer: impl Into<String>) -> Self {
        self.answers
            .push((pattern.into().to_lowercase(), answer.into()));
        self
    }

    /// Makes every call whose prompt contains `pattern` fail.
    pub fn failing_on(mut self, pattern: impl Into<String>) -> Self {
        self.failures.push(pattern.into().to_lowercase());
        self
    }

    /// Returns every message list this client received.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Records the call and applies configured failures.
    fn receive(&self, messages: &[Message]) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }

        let input = Self::extract_user_input(messages);
        let input_lower = input.to_lowercase();
        if self.failures.iter().any(|p| input_lower.contains(p)) {
            return Err(SageError::llm("Mock LLM failure"));
        }
        Ok(input)
    }

    /// Extracts the last user message content from a message list.
    fn extract_user_input(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    /// Returns the current question: the line after the last `Question:` marker.
    fn question_of(input: &str) -> String {
        let tail = input
            .rfind("Question:")
            .map(|i| &input[i + "Question:".len()..])
            .unwrap_or(input);
        tail.lines().next().unwrap_or_default().trim().to_lowercase()
    }

    /// Returns the SQL for a question, if any pattern matches.
    fn mock_query(&self, question: &str) -> Option<String> {
        if let Some((_, sql)) = self.queries.iter().find(|(p, _)| question.contains(p)) {
            return Some(sql.clone());
        }

        if question.contains("unicorn") {
            return Some("SELECT name FROM unicorns LIMIT 10;".to_string());
        }

        if question.contains("customer")
            && (question.contains("how many") || question.contains("count"))
        {
            return Some("SELECT COUNT(*) AS count FROM customers;".to_string());
        }

        if question.contains("customer") {
            return Some("SELECT name, email FROM customers LIMIT 10;".to_string());
        }

        None
    }

    /// Answers from the result text embedded in an answer prompt.
    fn mock_answer(&self, input: &str) -> String {
        let question = Self::question_of(input);
        if let Some((_, answer)) = self.answers.iter().find(|(p, _)| question.contains(p)) {
            return answer.clone();
        }

        let result = input
            .rfind("SQL Result:")
            .map(|i| input[i + "SQL Result:".len()..].trim())
            .unwrap_or_default();
        let first_line = result.lines().next().unwrap_or_default();

        let rows = match serde_json::from_str::<Vec<serde_json::Map<String, serde_json::Value>>>(
            first_line,
        ) {
            Ok(rows) => rows,
            Err(_) => return format!("The query returned: {result}"),
        };

        if rows.is_empty() {
            return "No information was found for that question.".to_string();
        }

        let summary = rows
            .iter()
            .map(|row| {
                row.values()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" / ")
            })
            .collect::<Vec<_>>()
            .join("; ");
        let noun = if rows.len() == 1 { "result" } else { "results" };
        format!("Found {} {noun}: {summary}.", rows.len())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let input = self.receive(messages)?;
        Ok(self.mock_answer(&input))
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        _schema: &OutputSchema,
    ) -> Result<serde_json::Value> {
        let input = self.receive(messages)?;
        let question = Self::question_of(&input);

        if let Some((_, value)) = self.raw_outputs.iter().find(|(p, _)| question.contains(p)) {
            return Ok(value.clone());
        }

        Ok(match self.mock_query(&question) {
            Some(sql) => json!({ "query": sql }),
            // A model that cannot comply tends to answer in prose instead
            None => json!({ "answer": "I don't understand that question." }),
        })
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let input = self.receive(messages)?;
        let question = Self::question_of(&input);
        let offers_sql_tool = tools.iter().any(|t| t.name == SQL_DATABASE_TOOL);

        match self.mock_query(&question) {
            Some(sql) if offers_sql_tool => Ok(LlmResponse::with_tool_calls(
                String::new(),
                vec![ToolCall::new(
                    "mock_tool_call_1",
                    SQL_DATABASE_TOOL,
                    json!({ "query": sql }).to_string(),
                )],
            )),
            _ => Ok(LlmResponse::text(
                "I don't understand that question. Could you please rephrase it?",
            )),
        }
    }
}
