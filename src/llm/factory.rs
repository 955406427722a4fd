//! LLM client factory.
//!
//! Centralizes provider-specific logic for creating LLM clients.

use crate::error::{Result, SageError};
use crate::llm::{
    anthropic, ollama, openai, AnthropicClient, AnthropicConfig, LlmClient, LlmProvider,
    MockLlmClient, OllamaClient, OllamaConfig, OpenAiClient, OpenAiConfig,
};

/// Creates an LLM client for the given provider.
///
/// The API key is resolved from `api_key`, then the provider's environment
/// variable (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`). A missing key is a
/// configuration error, reported at startup.
///
/// The model is resolved from `model`, then `OPENAI_MODEL` / `ANTHROPIC_MODEL`
/// / `OLLAMA_MODEL`, then the provider default. Ollama's address comes from
/// `OLLAMA_URL`.
pub fn create_client(
    provider: LlmProvider,
    model: Option<String>,
    api_key: Option<String>,
) -> Result<Box<dyn LlmClient>> {
    create_client_with_env(provider, model, api_key, |name| std::env::var(name).ok())
}

fn create_client_with_env<F>(
    provider: LlmProvider,
    model: Option<String>,
    api_key: Option<String>,
    env: F,
) -> Result<Box<dyn LlmClient>>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
    let model_or = |var: &str, default: &str| {
        non_empty(model.clone())
            .or_else(|| non_empty(env(var)))
            .unwrap_or_else(|| default.to_string())
    };
    let key = || -> Result<String> {
        let var = provider.api_key_env().unwrap_or_default();
        non_empty(api_key.clone())
            .or_else(|| non_empty(env(var)))
            .ok_or_else(|| SageError::config(format!("{var} is not set")))
    };

    match provider {
        LlmProvider::OpenAi => {
            let config = OpenAiConfig::new(key()?, model_or("OPENAI_MODEL", openai::DEFAULT_MODEL));
            Ok(Box::new(OpenAiClient::new(config)?))
        }
        LlmProvider::Anthropic => {
            let config = AnthropicConfig::new(
                key()?,
                model_or("ANTHROPIC_MODEL", anthropic::DEFAULT_MODEL),
            );
            Ok(Box::new(AnthropicClient::new(config)?))
        }
        LlmProvider::Ollama => {
            let mut config = OllamaConfig::new(model_or("OLLAMA_MODEL", ollama::DEFAULT_MODEL));
            if let Some(url) = non_empty(env("OLLAMA_URL")) {
                config = config.with_url(url);
            }
            Ok(Box::new(OllamaClient::new(config)?))
        }
        LlmProvider::Mock => Ok(Box::new(MockLlmClient::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_create_mock_client() {
        assert!(create_client_with_env(LlmProvider::Mock, None, None, no_env).is_ok());
    }

    #[test]
    fn test_create_openai_without_key_fails() {
        let err = create_client_with_env(LlmProvider::OpenAi, None, None, no_env)
            .err()
            .unwrap();
        assert!(matches!(err, SageError::Config(_)));
        assert!(err.to_string().contains("OPENAI_API_KEY is not set"));
    }

    #[test]
    fn test_create_openai_blank_key_fails() {
        let env = |name: &str| (name == "OPENAI_API_KEY").then(|| "  ".to_string());
        assert!(create_client_with_env(LlmProvider::OpenAi, None, None, env).is_err());
    }

    #[test]
    fn test_create_openai_with_env_key() {
        let env = |name: &str| (name == "OPENAI_API_KEY").then(|| "sk-test".to_string());
        assert!(create_client_with_env(LlmProvider::OpenAi, None, None, env).is_ok());
    }

    #[test]
    fn test_create_anthropic_without_key_fails() {
        let err = create_client_with_env(LlmProvider::Anthropic, None, None, no_env)
            .err()
            .unwrap();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_create_anthropic_with_provided_key() {
        let result = create_client_with_env(
            LlmProvider::Anthropic,
            Some("claude-3-5-haiku-latest".to_string()),
            Some("test-key".to_string()),
            no_env,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_create_ollama_needs_no_key() {
        assert!(create_client_with_env(LlmProvider::Ollama, None, None, no_env).is_ok());
    }
}
