//! Schema-constrained model output.
//!
//! A [`StructuredOutput`] type declares the JSON schema the model must fill
//! in. [`generate_structured`] asks a provider for that shape and rejects
//! anything that does not deserialize and validate; output is never coerced.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Result, SageError};
use crate::llm::types::Message;
use crate::llm::LlmClient;

/// A named JSON schema handed to the provider.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
}

/// A type the model can be asked to produce directly.
pub trait StructuredOutput: DeserializeOwned {
    /// Returns the schema describing this type.
    fn output_schema() -> OutputSchema;

    /// Checks constraints the schema cannot express.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Generated SQL query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryOutput {
    /// Syntactically valid SQL query.
    pub query: String,
}

impl StructuredOutput for QueryOutput {
    fn output_schema() -> OutputSchema {
        OutputSchema {
            name: "QueryOutput".to_string(),
            description: "Generated SQL query.".to_string(),
            schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Syntactically valid SQL query."
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(SageError::llm("Model returned an empty query"));
        }
        Ok(())
    }
}

/// Deserializes and validates a model-produced JSON value as `T`.
pub fn parse_structured<T: StructuredOutput>(value: serde_json::Value) -> Result<T> {
    let name = T::output_schema().name;
    let output: T = serde_json::from_value(value).map_err(|e| {
        SageError::llm(format!("Model output does not match {name}: {e}"))
    })?;
    output.validate()?;
    Ok(output)
}

/// Asks the model for a `T` and validates what comes back.
pub async fn generate_structured<T: StructuredOutput>(
    client: &dyn LlmClient,
    messages: &[Message],
) -> Result<T> {
    let schema = T::output_schema();
    let value = client.complete_structured(messages, &schema).await?;
    parse_structured(value)
}

/// Parses the text body of a structured response.
///
/// Providers that return the object as message text still have to return
/// exactly one JSON object; prose around it is rejected.
pub(crate) fn parse_json_text(text: &str) -> Result<serde_json::Value> {
    serde_json::from_str(text.trim())
        .map_err(|e| SageError::llm(format!("Model did not return valid JSON: {e}")))
}
