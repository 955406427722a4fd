//! LLM integration for sqlsage.
//!
//! Provides the `LlmClient` trait and implementations for the supported
//! providers. Every provider supports free-text completion, schema-constrained
//! structured output and tool calling.

pub mod anthropic;
pub mod factory;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod prompt;
pub mod structured;
pub mod tools;
pub mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use factory::create_client;
pub use mock::MockLlmClient;
pub use ollama::{OllamaClient, OllamaConfig};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use structured::{
    generate_structured, parse_structured, OutputSchema, QueryOutput, StructuredOutput,
};
pub use tools::{sql_database_tool, ToolDefinition, SQL_DATABASE_TOOL};
pub use types::{LlmResponse, Message, Role, ToolCall};

use async_trait::async_trait;
use std::str::FromStr;

use crate::error::Result;

/// Trait for LLM clients.
///
/// Implementations must be thread-safe (Send + Sync) to support async operations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generates a free-text completion for the given messages.
    async fn complete(&self, messages: &[Message]) -> Result<String>;

    /// Generates a JSON object constrained to the given schema.
    ///
    /// Providers enforce the schema as far as their API allows; callers must
    /// still validate the returned value (see [`generate_structured`]).
    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<serde_json::Value>;

    /// Generates a response in which the model is required to call one of
    /// the offered tools.
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse>;
}

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// OpenAI (GPT-4o, etc.)
    #[default]
    OpenAi,
    /// Anthropic (Claude)
    Anthropic,
    /// Local Ollama instance
    Ollama,
    /// Mock client for testing (no API key required)
    Mock,
}

impl LlmProvider {
    /// Returns the provider as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
            Self::Mock => "mock",
        }
    }

    /// Returns the environment variable holding this provider's API key.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama | Self::Mock => None,
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            "mock" => Ok(Self::Mock),
            _ => Err(format!(
                "Unknown LLM provider: {s}. Expected: openai, anthropic, ollama, or mock"
            )),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_str() {
        assert_eq!("openai".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert_eq!(
            "anthropic".parse::<LlmProvider>().unwrap(),
            LlmProvider::Anthropic
        );
        assert_eq!("ollama".parse::<LlmProvider>().unwrap(), LlmProvider::Ollama);
        assert!("unknown".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_provider_api_key_env() {
        assert_eq!(LlmProvider::OpenAi.api_key_env(), Some("OPENAI_API_KEY"));
        assert_eq!(LlmProvider::Ollama.api_key_env(), None);
    }

    #[test]
    fn test_provider_display() {
        assert_eq!(format!("{}", LlmProvider::Anthropic), "anthropic");
        assert_eq!(LlmProvider::default(), LlmProvider::OpenAi);
    }

    #[tokio::test]
    async fn test_mock_client_implements_trait() {
        let client: Box<dyn LlmClient> = Box::new(MockLlmClient::new());
        let value = client
            .complete_structured(
                &[Message::user("Question: List all customers")],
                &QueryOutput::output_schema(),
            )
            .await
            .unwrap();
        assert!(value["query"].as_str().unwrap().contains("SELECT"));
    }
}
