//! Error types for sqlsage.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for sqlsage operations.
#[derive(Error, Debug)]
pub enum SageError {
    /// Database or warehouse connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (syntax errors, failed or aborted statements, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// LLM API errors (rate limits, auth, timeouts, non-conforming output, etc.)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration errors (missing environment values, contradictory settings, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Input the pipeline cannot act on, such as a blank question.
    #[error("Invalid input: {0}")]
    Input(String),
}

impl SageError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Creates an invalid-input error with the given message.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Llm(_) => "LLM Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
            Self::Input(_) => "Input Error",
        }
    }

    /// Returns true if this error should stop the process rather than a single turn.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Internal(_))
    }
}

/// Result type alias using SageError.
pub type Result<T> = std::result::Result<T, SageError>;
