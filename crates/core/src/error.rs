//! Error types for the LLLM domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the agent crate composes them.

use thiserror::Error;

/// The top-level error type for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Log error: {0}")]
    Log(#[from] LogError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// The dialog cannot be expressed in the provider's wire format.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The provider produced a response that violates the prompt's output
    /// contract and chose to raise instead of attaching `execution_errors`.
    #[error("Response rejected: {0}")]
    Semantic(String),
}

impl ProviderError {
    /// Whether this failure should be treated as rate limiting.
    ///
    /// Besides the explicit variant, some gateways only signal rate limits
    /// through the error text.
    pub fn is_rate_limit(&self) -> bool {
        if matches!(self, Self::RateLimited { .. }) {
            return true;
        }
        let text = self.to_string();
        text.contains("Please wait and try again later.") || text.contains("Rate limit is exceeded.")
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("Missing value for placeholder '{placeholder}' in prompt '{path}'")]
    MissingArgument { path: String, placeholder: String },

    #[error("Malformed template in prompt '{path}': {reason}")]
    MalformedTemplate { path: String, reason: String },

    #[error("Function '{function}' of prompt '{path}' is not linked")]
    UnlinkedFunction { path: String, function: String },

    #[error("Prompt '{path}': {template} template must contain '{{{placeholder}}}'")]
    MissingHandlerPlaceholder {
        path: String,
        template: &'static str,
        placeholder: &'static str,
    },

    #[error("Prompt '{0}' is already registered")]
    Duplicate(String),

    #[error("Prompt '{path}' not found. Registered: {registered:?}")]
    NotFound { path: String, registered: Vec<String> },

    #[error("Prompt '{path}' has no function named '{function}'")]
    UnknownFunction { path: String, function: String },

    #[error("Prompt path cannot be empty")]
    EmptyPath,
}

/// A response failed the prompt's output contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ParseError(pub String);

/// A linked function returned an error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct FunctionError(pub String);

impl FunctionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Log storage error at {path}: {reason}")]
    Storage { path: String, reason: String },

    #[error("Log serialization failed: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Model card for '{0}' not found")]
    UnknownModel(String),

    #[error("Argument '{arg}' not supported by model '{model}'")]
    UnsupportedArgument { model: String, arg: String },

    #[error("Model '{0}' does not support classification")]
    ClassificationUnsupported(String),

    #[error("Classes {0:?} cannot be tokenized into single tokens")]
    MultiTokenClasses(Vec<String>),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Invalid snapshot date '{0}', expected YYYY-MM-DD")]
    InvalidSnapshotDate(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 500,
            message: "Internal".into(),
        });
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("Internal"));
    }

    #[test]
    fn rate_limit_detection() {
        assert!(ProviderError::RateLimited { retry_after_secs: 5 }.is_rate_limit());
        assert!(
            ProviderError::ApiError {
                status_code: 400,
                message: "Rate limit is exceeded. Try again in 7 seconds.".into(),
            }
            .is_rate_limit()
        );
        assert!(!ProviderError::Network("connection reset".into()).is_rate_limit());
        assert!(!ProviderError::Semantic("missing tag".into()).is_rate_limit());
    }

    #[test]
    fn handler_placeholder_error_mentions_braces() {
        let err = PromptError::MissingHandlerPlaceholder {
            path: "demo".into(),
            template: "exception",
            placeholder: "error_message",
        };
        assert!(err.to_string().contains("{error_message}"));
    }
}
