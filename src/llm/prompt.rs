//! Prompt construction for LLM requests.
//!
//! Builds the query-generation prompt (dialect, row limit and schema) and the
//! answer prompt. Prior turns arrive pre-rendered as a transcript.

use crate::db::Schema;
use crate::llm::tools::SQL_DATABASE_TOOL;
use crate::llm::types::Message;

/// System prompt template for query generation.
const QUERY_SYSTEM_PROMPT: &str = r#"Given an input question, create a syntactically correct {dialect} query to run to help find the answer. Unless the user specifies in their question a specific number of examples they wish to obtain, always limit your query to at most {top_k} results. You can order the results by a relevant column to return the most interesting examples in the database.

Never query for all the columns from a specific table, only ask for the few relevant columns given the question.

Pay attention to use only the column names that you can see in the schema description. Be careful to not query for columns that do not exist. Also, pay attention to which column is in which table.

Only use the following tables:
{schema}"#;

/// Extra instruction for the tool-calling strategy.
const TOOL_INSTRUCTION: &str =
    "Run your query by calling the {tool} tool with the complete SQL in its `query` argument.";

/// System prompt for answer composition.
const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Given the user's question and the SQL query result, provide a natural language answer. If the query result is empty, state that no information was found.";

/// Grounding for query generation.
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    /// SQL dialect name, e.g. "PostgreSQL".
    pub dialect: &'a str,
    /// Default row limit the model is told to apply.
    pub row_limit: u32,
    pub schema: &'a Schema,
}

/// Builds the query-generation system prompt.
pub fn build_query_system_prompt(ctx: &QueryContext<'_>, tool_calling: bool) -> String {
    let mut prompt = QUERY_SYSTEM_PROMPT
        .replace("{dialect}", ctx.dialect)
        .replace("{top_k}", &ctx.row_limit.to_string())
        .replace("{schema}", &ctx.schema.format_for_llm());

    if tool_calling {
        prompt.push_str("\n\n");
        prompt.push_str(&TOOL_INSTRUCTION.replace("{tool}", SQL_DATABASE_TOOL));
    }
    prompt
}

/// Builds the message list for query generation.
pub fn build_query_messages(
    ctx: &QueryContext<'_>,
    transcript: &str,
    question: &str,
    tool_calling: bool,
) -> Vec<Message> {
    vec![
        Message::system(build_query_system_prompt(ctx, tool_calling)),
        Message::user(with_transcript(transcript, format!("Question: {question}"))),
    ]
}

/// Builds the message list for answer composition.
pub fn build_answer_messages(transcript: &str, question: &str, result: &str) -> Vec<Message> {
    vec![
        Message::system(ANSWER_SYSTEM_PROMPT),
        Message::user(with_transcript(
            transcript,
            format!("Question: {question}\nSQL Result: {result}"),
        )),
    ]
}

fn with_transcript(transcript: &str, request: String) -> String {
    if transcript.trim().is_empty() {
        request
    } else {
        format!("Conversation so far:\n{}\n\n{request}", transcript.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Column, Table};
    use crate::llm::types::Role;

    fn sample_schema() -> Schema {
        Schema {
            tables: vec![Table::new("customers")
                .with_column(Column::new("id", "integer").nullable(false))
                .with_column(Column::new("email", "varchar(255)"))
                .with_primary_key(&["id"])],
            foreign_keys: vec![],
        }
    }

    #[test]
    fn test_query_prompt_contains_grounding() {
        let schema = sample_schema();
        let ctx = QueryContext {
            dialect: "SQLite",
            row_limit: 10,
            schema: &schema,
        };
        let prompt = build_query_system_prompt(&ctx, false);

        assert!(prompt.contains("syntactically correct SQLite query"));
        assert!(prompt.contains("at most 10 results"));
        assert!(prompt.contains("Table: customers"));
        assert!(!prompt.contains("sql_database"));
    }

    #[test]
    fn test_query_prompt_tool_instruction() {
        let schema = Schema::new();
        let ctx = QueryContext {
            dialect: "PostgreSQL",
            row_limit: 5,
            schema: &schema,
        };
        assert!(build_query_system_prompt(&ctx, true).contains("sql_database tool"));
    }

    #[test]
    fn test_query_messages_without_history() {
        let schema = Schema::new();
        let ctx = QueryContext {
            dialect: "PostgreSQL",
            row_limit: 10,
            schema: &schema,
        };
        let messages = build_query_messages(&ctx, "", "List all customers", false);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "Question: List all customers");
    }

    #[test]
    fn test_query_messages_with_history() {
        let schema = Schema::new();
        let ctx = QueryContext {
            dialect: "PostgreSQL",
            row_limit: 10,
            schema: &schema,
        };
        let messages = build_query_messages(
            &ctx,
            "User: How many customers?\nAnswer: 3\n",
            "Which countries are they from?",
            false,
        );

        let user = &messages[1].content;
        assert!(user.starts_with("Conversation so far:\nUser: How many customers?"));
        assert!(user.ends_with("Question: Which countries are they from?"));
    }

    #[test]
    fn test_answer_messages() {
        let messages = build_answer_messages("", "How many unicorns are registered?", "[]");

        assert!(messages[0].content.contains("no information was found"));
        assert_eq!(
            messages[1].content,
            "Question: How many unicorns are registered?\nSQL Result: []"
        );
    }
}
