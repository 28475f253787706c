//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, Together AI, Ollama, vLLM, llama.cpp and any
//! endpoint exposing `/v1/chat/completions`.
//!
//! Supports:
//! - Dialog conversion (text, images, tool calls and tool results)
//! - Tool declarations from the prompt's functions
//! - Structured output via `response_format` when the prompt declares a schema
//! - Log-probabilities, usage accounting, and response parsing

use std::sync::Arc;

use async_trait::async_trait;
use lllm_core::error::ProviderError;
use lllm_core::function::FunctionCall;
use lllm_core::message::{ApiType, Message, Modality, Role, TokenLogprob, Usage};
use lllm_core::model_card::ModelCatalog;
use lllm_core::provider::{Provider, ProviderCall};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::response;

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Used when a 429 response carries no `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    system_role: &'static str,
    catalog: Arc<ModelCatalog>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            system_role: "system",
            catalog: Arc::new(ModelCatalog::with_defaults()),
            client: http_client(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// OpenAI itself. System turns are sent with the `developer` role.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key).with_system_role("developer")
    }

    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new("ollama", base_url.unwrap_or("http://localhost:11434/v1"), "ollama")
    }

    /// Role name used for system turns (`system` or `developer`).
    pub fn with_system_role(mut self, role: &'static str) -> Self {
        self.system_role = role;
        self
    }

    /// Model cards consulted for reasoning defaults and per-model base URLs.
    pub fn with_catalog(mut self, catalog: Arc<ModelCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.client = http_client(secs);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL for `model`: the card's override, else the provider's.
    fn url_for(&self, model: &str) -> String {
        let base = self
            .catalog
            .find(model)
            .ok()
            .and_then(|card| card.base_url.as_deref())
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or(&self.base_url);
        format!("{base}/chat/completions")
    }

    /// Convert a dialog transcript into chat messages.
    fn to_api_messages(messages: &[Message], system_role: &'static str) -> Result<Vec<ApiMessage>, ProviderError> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::Assistant | Role::ToolCall => Ok(ApiMessage {
                    role: "assistant",
                    content: Value::String(m.content.clone()),
                    tool_calls: (!m.function_calls.is_empty())
                        .then(|| m.function_calls.iter().map(ApiToolCall::from_call).collect()),
                    tool_call_id: None,
                }),
                Role::Tool => {
                    let id = m.extra.get("tool_call_id").and_then(Value::as_str).ok_or_else(|| {
                        ProviderError::InvalidRequest(format!(
                            "Tool message without a tool_call_id in extra: {}",
                            m.overview(120)
                        ))
                    })?;
                    Ok(ApiMessage {
                        role: "tool",
                        content: Value::String(m.content.clone()),
                        tool_calls: None,
                        tool_call_id: Some(id.to_string()),
                    })
                }
                Role::System | Role::User => {
                    let role = if m.role == Role::System { system_role } else { "user" };
                    let content = match m.modality {
                        Modality::Image => image_parts(m),
                        Modality::Text | Modality::FunctionCall => Value::String(m.content.clone()),
                    };
                    Ok(ApiMessage {
                        role,
                        content,
                        tool_calls: None,
                        tool_call_id: None,
                    })
                }
            })
            .collect()
    }

    /// Build the request body. Returns the body, the effective model arguments, and the API style.
    fn build_body(&self, call: &ProviderCall<'_>) -> Result<(Value, Map<String, Value>, ApiType), ProviderError> {
        let mut args = call.model_args.clone();

        let api_type = match &call.prompt.format {
            Some(schema) => {
                args.insert("response_format".into(), response_format(&call.prompt.path, schema));
                ApiType::Response
            }
            None => ApiType::Completion,
        };

        let is_reasoning = self.catalog.find(call.model).is_ok_and(|card| card.is_reasoning);
        if is_reasoning && !args.contains_key("temperature") {
            args.insert("temperature".into(), json!(1));
        }

        let mut body = Map::new();
        body.insert("model".into(), Value::String(call.model.to_string()));
        let messages = Self::to_api_messages(call.dialog.messages(), self.system_role)?;
        body.insert(
            "messages".into(),
            serde_json::to_value(messages).map_err(|e| ProviderError::InvalidRequest(e.to_string()))?,
        );
        if call.prompt.has_functions() {
            let tools: Vec<Value> = call.prompt.functions().iter().map(|f| f.to_tool_schema()).collect();
            body.insert("tools".into(), Value::Array(tools));
        }
        for (key, value) in &args {
            body.insert(key.clone(), value.clone());
        }
        Ok((Value::Object(body), args, api_type))
    }

    /// Turn a decoded completion into a dialog message.
    fn to_message(call: &ProviderCall<'_>, raw: Value, args: Map<String, Value>, api_type: ApiType) -> Result<Message, ProviderError> {
        let api_response: ApiResponse = serde_json::from_value(raw.clone()).map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;
        let choice = api_response.choices.into_iter().next().ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "No choices in response".into(),
        })?;

        let tool_calls = choice.message.tool_calls.unwrap_or_default();
        let is_tool_call = choice.finish_reason.as_deref() == Some("tool_calls") || !tool_calls.is_empty();

        let request = ProviderCall { model_args: &args, ..*call };
        let mut message = if is_tool_call {
            let mut errors = Vec::new();
            let calls = tool_calls
                .into_iter()
                .map(|tc| {
                    let arguments = match serde_json::from_str::<Value>(&tc.function.arguments) {
                        Ok(Value::Object(map)) => map,
                        Ok(_) | Err(_) => {
                            errors.push(format!(
                                "Arguments of function {} are not a JSON object: {}",
                                tc.function.name, tc.function.arguments
                            ));
                            Map::new()
                        }
                    };
                    FunctionCall::new(tc.id, tc.function.name, arguments)
                })
                .collect();
            let mut message = response::tool_call_message(&request, calls, api_type);
            message.execution_errors = errors;
            message
        } else if call.prompt.format.is_some() {
            if let Some(refusal) = choice.message.refusal {
                return Err(ProviderError::Semantic(format!("Model refused: {refusal}")));
            }
            response::structured_message(&request, choice.message.content.unwrap_or_default())
        } else {
            let mut message =
                response::assistant_message(&request, choice.message.content.unwrap_or_default(), api_type);
            message.logprobs = choice.logprobs.and_then(|l| l.content).unwrap_or_default();
            message
        };

        if let Some(usage) = api_response.usage {
            message.usage = usage.into();
        }
        if let Some(model) = api_response.model {
            message.model = Some(model);
        }
        message.raw_response = Some(raw);
        Ok(message)
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value, ProviderError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, request: ProviderCall<'_>) -> Result<Message, ProviderError> {
        let (body, args, api_type) = self.build_body(&request)?;
        let url = self.url_for(request.model);

        debug!(
            provider = %self.name,
            model = %request.model,
            prompt = %request.prompt.path,
            messages = request.dialog.len(),
            "Sending completion request"
        );

        let raw = self.post(&url, &body).await?;
        let message = Self::to_message(&request, raw, args, api_type)?;

        debug!(
            provider = %self.name,
            role = %message.role,
            tokens = message.usage.total_tokens,
            errors = message.execution_errors.len(),
            "Completion received"
        );
        Ok(message)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(transport_error)?;

        Ok(response.status().is_success())
    }
}

fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Image turns become an optional caption part followed by a data-URL part.
fn image_parts(message: &Message) -> Value {
    let mut parts = Vec::new();
    if let Some(caption) = message.extra.get("caption").and_then(Value::as_str) {
        parts.push(json!({"type": "text", "text": caption}));
    }
    parts.push(json!({
        "type": "image_url",
        "image_url": {"url": format!("data:image/jpeg;base64,{}", message.content)},
    }));
    Value::Array(parts)
}

/// Wrap a bare JSON schema as a `json_schema` response format.
fn response_format(prompt_path: &str, schema: &Value) -> Value {
    if schema.get("type").and_then(Value::as_str) == Some("json_schema") {
        return schema.clone();
    }
    let name: String = prompt_path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    json!({
        "type": "json_schema",
        "json_schema": {"name": name, "schema": schema, "strict": true},
    })
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

impl ApiToolCall {
    fn from_call(call: &FunctionCall) -> Self {
        Self {
            id: call.id.clone(),
            r#type: function_type(),
            function: ApiFunction {
                name: call.name.clone(),
                arguments: call.arguments_str(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    logprobs: Option<ApiLogprobs>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiLogprobs {
    #[serde(default)]
    content: Option<Vec<TokenLogprob>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<ApiPromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct ApiPromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            cached_prompt_tokens: u.prompt_tokens_details.map(|d| d.cached_tokens).unwrap_or(0),
        }
    }
}
