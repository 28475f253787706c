//! Building response messages from provider output.
//!
//! Every provider ends a call the same way: either a tool-call turn listing the
//! requested calls, or an assistant turn whose text has been run through the
//! active prompt's parser. Parser failures are attached to
//! `execution_errors` instead of being returned.

use lllm_core::function::FunctionCall;
use lllm_core::message::{ApiType, Message, Role};
use lllm_core::provider::ProviderCall;
use serde_json::{Map, Value};

/// Assistant turn for `content`, parsed against the call's prompt.
pub fn assistant_message(call: &ProviderCall<'_>, content: String, api_type: ApiType) -> Message {
    let mut message = base_message(call, Role::Assistant, content, api_type);
    match call.prompt.parse(&message.content, call.parser_args) {
        Ok(parsed) => message.parsed = parsed,
        Err(e) => {
            message.execution_errors.push(e.to_string());
            message.parsed = raw_only(&message.content);
        }
    }
    message
}

/// Assistant turn for structured output: `content` must be a JSON object.
pub fn structured_message(call: &ProviderCall<'_>, content: String) -> Message {
    let mut message = base_message(call, Role::Assistant, content, ApiType::Response);
    match serde_json::from_str::<Value>(&message.content) {
        Ok(Value::Object(parsed)) => message.parsed = parsed,
        Ok(other) => message
            .execution_errors
            .push(format!("Expected a JSON object as structured output, got: {other}")),
        Err(e) => message
            .execution_errors
            .push(format!("Structured output is not valid JSON: {e}")),
    }
    message
}

/// Tool-call turn requesting `calls`.
pub fn tool_call_message(call: &ProviderCall<'_>, calls: Vec<FunctionCall>, api_type: ApiType) -> Message {
    let mut message = base_message(call, Role::ToolCall, tool_calls_summary(&calls), api_type);
    message.modality = lllm_core::message::Modality::FunctionCall;
    message.function_calls = calls;
    message
}

/// Content of a tool-call turn: `Tool calls:` followed by one numbered line per call.
pub fn tool_calls_summary(calls: &[FunctionCall]) -> String {
    let lines: Vec<String> = calls
        .iter()
        .enumerate()
        .map(|(idx, call)| format!("{idx}. {}: {}", call.name, call.arguments_str()))
        .collect();
    format!("Tool calls:\n\n{}", lines.join("\n"))
}

fn base_message(call: &ProviderCall<'_>, role: Role, content: String, api_type: ApiType) -> Message {
    let mut message = Message::new(role, content, call.responder)
        .with_model(call.model)
        .with_api_type(api_type);
    message.model_args = call.model_args.clone();
    message.extra = call.extra.clone();
    message
}

fn raw_only(content: &str) -> Map<String, Value> {
    let mut parsed = Map::new();
    parsed.insert("raw".into(), Value::String(content.to_string()));
    parsed
}
