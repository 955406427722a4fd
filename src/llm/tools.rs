//! LLM tool definitions for function calling.

use serde::{Deserialize, Serialize};

use crate::llm::structured::{QueryOutput, StructuredOutput};

/// Name of the query tool offered to the model.
pub const SQL_DATABASE_TOOL: &str = "sql_database";

/// Tool definition for LLM function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The tool the model calls to run a query. Its arguments are a `QueryOutput`.
pub fn sql_database_tool() -> ToolDefinition {
    ToolDefinition {
        name: SQL_DATABASE_TOOL.to_string(),
        description: "Executes a SQL query against the configured database and returns the \
                      rows as a list of objects. Call it exactly once with the query that \
                      answers the question."
            .to_string(),
        parameters: QueryOutput::output_schema().schema,
    }
}
