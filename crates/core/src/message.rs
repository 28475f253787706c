//! Message domain types.
//!
//! A [`Message`] is one turn of a [`Dialog`](crate::dialog::Dialog): produced either by
//! the provider (assistant / tool-call turns) or by the dialog itself when a prompt is
//! sent (system / user / tool turns).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::function::FunctionCall;

/// The role of a message sender in a dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System instructions (always the first turn of a dialog)
    System,
    /// The model's textual answer
    Assistant,
    /// The end user, or the agent acting on its behalf
    User,
    /// Result of a tool execution
    Tool,
    /// The model asked for one or more tool executions
    ToolCall,
}

impl Role {
    /// Roles whose messages are generated by the model and therefore carry usage.
    pub fn is_llm_side(self) -> bool {
        matches!(self, Self::Assistant | Self::ToolCall)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Assistant => "assistant",
            Self::User => "user",
            Self::Tool => "tool",
            Self::ToolCall => "tool_call",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of payload `content` holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    #[default]
    Text,
    /// `content` is a base64-encoded image
    Image,
    FunctionCall,
}

/// Upstream wire protocol style the message belongs to.
///
/// Completion-style APIs carry tool results as `tool` turns; response-style APIs
/// carry them as plain `user` turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    #[default]
    Completion,
    Response,
}

/// Token usage reported by the provider for one completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    /// Portion of `prompt_tokens` served from the provider's prompt cache
    #[serde(default)]
    pub cached_prompt_tokens: u64,
}

impl Usage {
    pub fn is_empty(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0 && self.total_tokens == 0
    }
}

/// One alternative token with its log-probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopLogprob {
    pub token: String,
    pub logprob: f64,
}

/// Log-probability information for one generated token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenLogprob {
    pub token: String,
    pub logprob: f64,
    #[serde(default)]
    pub top_logprobs: Vec<TopLogprob>,
}

/// A single turn in a dialog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// Text content, or base64 data for image messages
    pub content: String,

    /// Free-form origin tag: "system", "user", "function", "exception", or an agent name
    pub creator: String,

    /// Tool invocations requested by the model (non-empty iff this is a tool-call turn)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_calls: Vec<FunctionCall>,

    #[serde(default)]
    pub modality: Modality,

    /// Per-token log-probabilities, only for model-side messages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logprobs: Vec<TokenLogprob>,

    /// Structured output extracted by the prompt's parser
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parsed: Map<String, Value>,

    /// Model (snapshot) that produced the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub usage: Usage,

    /// Arguments the model was invoked with
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub model_args: Map<String, Value>,

    /// Arbitrary metadata (dialog id, tool call id, frontend replay info, ...)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,

    #[serde(default)]
    pub api_type: ApiType,

    /// Parser failures against the prompt's output contract. Non-empty means the turn failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execution_errors: Vec<String>,

    /// Rejected responses that preceded this one within the same round
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execution_attempts: Vec<Message>,

    /// Raw provider payload, kept in memory only
    #[serde(skip)]
    pub raw_response: Option<Value>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, creator: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            creator: creator.into(),
            function_calls: Vec::new(),
            modality: Modality::Text,
            logprobs: Vec::new(),
            parsed: Map::new(),
            model: None,
            usage: Usage::default(),
            model_args: Map::new(),
            extra: Map::new(),
            api_type: ApiType::Completion,
            execution_errors: Vec::new(),
            execution_attempts: Vec::new(),
            raw_response: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, "system")
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, "user")
    }

    /// Create an assistant message attributed to `creator`.
    pub fn assistant(content: impl Into<String>, creator: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, creator)
    }

    /// Create a tool-call message. The modality is forced to `FunctionCall`.
    pub fn tool_call(
        content: impl Into<String>,
        creator: impl Into<String>,
        calls: Vec<FunctionCall>,
    ) -> Self {
        let mut msg = Self::new(Role::ToolCall, content, creator);
        msg.function_calls = calls;
        msg.modality = Modality::FunctionCall;
        msg
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_api_type(mut self, api_type: ApiType) -> Self {
        self.api_type = api_type;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Attach a parse failure; the agent loop will treat this turn as failed.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.execution_errors.push(error.into());
        self
    }

    pub fn is_function_call(&self) -> bool {
        !self.function_calls.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.execution_errors.is_empty()
    }

    /// All parse failures joined, one per line.
    pub fn error_message(&self) -> String {
        self.execution_errors.join("\n")
    }

    pub fn from_llm_side(&self) -> bool {
        self.role.is_llm_side()
    }

    /// One-line preview used by dialog overviews and the CLI.
    pub fn overview(&self, max_length: usize) -> String {
        let content = self.content.replace('\n', "\\n ");
        if self.modality == Modality::Image {
            let head: String = content.chars().take(20).collect();
            return match self.extra.get("caption").and_then(Value::as_str) {
                Some(caption) => format!("Base64 encoded image: {caption} ({head}...)"),
                None => format!("Base64 encoded image ({head}...)"),
            };
        }
        if content.chars().count() <= max_length {
            content
        } else {
            let head: String = content.chars().take(max_length).collect();
            format!("{head}...")
        }
    }

    /// Metadata stored alongside the content when the message is logged.
    pub fn log_metadata(&self) -> Value {
        let mut meta = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        meta.remove("content");
        meta.remove("function_calls");
        if self.is_function_call() {
            let calls: Vec<Value> = self
                .function_calls
                .iter()
                .map(|c| serde_json::json!({"id": c.id, "name": c.name, "arguments": c.arguments}))
                .collect();
            meta.insert("function_calls".into(), Value::Array(calls));
        }
        Value::Object(meta)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} ({})]:\n\n{}", self.creator, self.role, self.content)
    }
}
