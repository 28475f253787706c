//! Provider trait: the abstraction over chat-completion backends.
//!
//! A Provider receives the whole dialog plus the prompt the next response
//! must satisfy, and returns a single [`Message`]. When the response text fails
//! the prompt's parser, the provider attaches the failure to
//! `Message::execution_errors` (or returns [`ProviderError::Semantic`]); the
//! agent loop treats both as a content failure and retries.
//!
//! Implementations: OpenAI-compatible endpoints, scripted (for testing).

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::dialog::Dialog;
use crate::error::ProviderError;
use crate::message::Message;
use crate::prompt::Prompt;

/// Everything a provider needs for one completion.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCall<'a> {
    /// Transcript so far, including the turn that asked for this response
    pub dialog: &'a Dialog,

    /// The prompt whose contract (functions, parser, format) applies
    pub prompt: &'a Prompt,

    /// Model id as sent to the API (normally a pinned snapshot)
    pub model: &'a str,

    pub model_args: &'a Map<String, Value>,

    /// Extra arguments forwarded to the prompt's parser
    pub parser_args: &'a Map<String, Value>,

    /// Creator tag for the produced message
    pub responder: &'a str,

    /// Metadata copied onto the produced message
    pub extra: &'a Map<String, Value>,
}

/// The core Provider trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider name (e.g., "openai").
    fn name(&self) -> &str;

    /// Produce the next message of the dialog.
    async fn call(&self, request: ProviderCall<'_>) -> std::result::Result<Message, ProviderError>;

    /// Check if the provider is reachable and configured correctly.
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
