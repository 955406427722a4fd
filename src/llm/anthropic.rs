//! Anthropic LLM client implementation.
//!
//! Implements the LlmClient trait for Anthropic's Messages API (Claude models).
//! Structured output is obtained by forcing a call to a single tool whose
//! input schema is the requested output schema.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, SageError};
use crate::llm::structured::OutputSchema;
use crate::llm::tools::ToolDefinition;
use crate::llm::types::{split_system, LlmResponse, Message, Role, ToolCall};
use crate::llm::LlmClient;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Anthropic API base URL.
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version header.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default model.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";

/// Maximum tokens to generate.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Maximum number of retry attempts for transient errors.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Anthropic client configuration.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Model to use (e.g., "claude-3-5-sonnet-latest").
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl AnthropicConfig {
    /// Creates a new config with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Sets the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Anthropic LLM client.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicClient {
    /// Creates a new Anthropic client with the given configuration.
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SageError::llm(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Extracts the system prompt and converts remaining messages to Anthropic format.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
        let (system, rest) = split_system(messages);
        let converted = rest
            .into_iter()
            .map(|m| AnthropicMessage {
                role: match m.role {
                    Role::Assistant => "assistant",
                    _ => "user",
                }
                .to_string(),
                content: m.content.clone(),
            })
            .collect();
        (system, converted)
    }

    fn request(&self, messages: &[Message]) -> AnthropicRequest {
        let (system, messages) = Self::convert_messages(messages);
        AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: 0.0,
            system,
            messages,
            tools: None,
            tool_choice: None,
        }
    }

    /// Parses an API error response and returns (error, is_retryable).
    fn parse_error(status: reqwest::StatusCode, body: &str) -> (SageError, bool) {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return (
                SageError::llm("Authentication failed. Check your ANTHROPIC_API_KEY."),
                false,
            );
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return (
                SageError::llm("Rate limited. Please wait and try again."),
                true,
            );
        }

        // 529 is "overloaded"
        let is_retryable = status.is_server_error() || status.as_u16() == 529;

        if let Ok(error_response) = serde_json::from_str::<AnthropicErrorResponse>(body) {
            return (
                SageError::llm(format!(
                    "Anthropic API error: {}",
                    error_response.error.message
                )),
                is_retryable,
            );
        }

        (
            SageError::llm(format!("Anthropic API error ({status}): {body}")),
            is_retryable,
        )
    }

    /// Sends a request, retrying transient failures.
    async fn send(&self, request: &AnthropicRequest) -> Result<AnthropicResponse> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!(
                "Anthropic API request attempt {} of {}",
                attempt, MAX_RETRY_ATTEMPTS
            );

            let result = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(request)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response
                        .text()
                        .await
                        .map_err(|e| SageError::llm(format!("Failed to read response: {e}")))?;

                    if status.is_success() {
                        return serde_json::from_str(&body).map_err(|e| {
                            SageError::llm(format!("Failed to parse response: {e}"))
                        });
                    }

                    let (error, is_retryable) = Self::parse_error(status, &body);
                    last_error = Some(error);

                    if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        break;
                    }

                    warn!(
                        "Anthropic API request failed (attempt {}), retrying in {:?}: {}",
                        attempt, delay, status
                    );
                }
                Err(e) => {
                    let is_retryable = e.is_timeout() || e.is_connect();
                    let error = if e.is_timeout() {
                        SageError::llm("Request timed out. Try again.")
                    } else if e.is_connect() {
                        SageError::llm("Failed to connect to Anthropic API. Check your network.")
                    } else {
                        SageError::llm(format!("Request failed: {e}"))
                    };
                    last_error = Some(error);

                    if !is_retryable || attempt >= MAX_RETRY_ATTEMPTS {
                        break;
                    }

                    warn!(
                        "Anthropic API request failed (attempt {}), retrying in {:?}",
                        attempt, delay
                    );
                }
            }

            tokio::time::sleep(delay).await;
            delay *= 2;
        }

        Err(last_error.unwrap_or_else(|| SageError::llm("No request was sent to Anthropic")))
    }
}

fn anthropic_tool(name: &str, description: &str, schema: &serde_json::Value) -> serde_json::Value {
    json!({
        "name": name,
        "description": description,
        "input_schema": schema
    })
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let response = self.send(&self.request(messages)).await?;
        let text = response.text();
        if text.is_empty() {
            return Err(SageError::llm("No response from Anthropic"));
        }
        Ok(text)
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<serde_json::Value> {
        let mut request = self.request(messages);
        request.tools = Some(vec![anthropic_tool(
            &schema.name,
            &schema.description,
            &schema.schema,
        )]);
        request.tool_choice = Some(json!({ "type": "tool", "name": schema.name }));

        let response = self.send(&request).await?;
        response
            .content
            .into_iter()
            .find(|block| block.content_type == "tool_use" && block.name == schema.name)
            .and_then(|block| block.input)
            .ok_or_else(|| {
                SageError::llm(format!("Model did not return a {} object", schema.name))
            })
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        let mut request = self.request(messages);
        request.tools = Some(
            tools
                .iter()
                .map(|tool| anthropic_tool(&tool.name, &tool.description, &tool.parameters))
                .collect(),
        );
        request.tool_choice = Some(json!({ "type": "any" }));

        let response = self.send(&request).await?;
        let text = response.text();
        let tool_calls = response
            .content
            .into_iter()
            .filter(|block| block.content_type == "tool_use")
            .map(|block| {
                let arguments = block.input.unwrap_or_default().to_string();
                ToolCall::new(block.id, block.name, arguments)
            })
            .collect();

        Ok(LlmResponse::with_tool_calls(text, tool_calls))
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

impl AnthropicResponse {
    /// Concatenates all text blocks.
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.content_type == "text")
            .map(|block| block.text.as_str())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: AnthropicError,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    message: String,
}
