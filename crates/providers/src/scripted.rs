//! Scripted provider: replays a fixed sequence of responses.
//!
//! Used by tests and offline demos. Each call consumes the next [`ScriptStep`]
//! (or asks a responder closure), builds the message exactly as a network
//! provider would (parser included), and records what it was asked.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use lllm_core::error::ProviderError;
use lllm_core::function::FunctionCall;
use lllm_core::message::{ApiType, Message, Role};
use lllm_core::provider::{Provider, ProviderCall};
use serde_json::{Map, Value};

use crate::response;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Assistant text, run through the prompt's parser
    Text(String),
    /// A tool-call turn requesting `(function name, arguments)` in order
    ToolCalls(Vec<(String, Map<String, Value>)>),
    /// Fail the call
    Fail(ProviderError),
    /// Return this message as-is (creator and extra are still filled in)
    Message(Message),
}

impl ScriptStep {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// A single tool call. `arguments` should be a JSON object.
    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        Self::ToolCalls(vec![(name.into(), object(arguments))])
    }

    pub fn tool_calls<N: Into<String>>(calls: impl IntoIterator<Item = (N, Value)>) -> Self {
        Self::ToolCalls(
            calls
                .into_iter()
                .map(|(name, args)| (name.into(), object(args)))
                .collect(),
        )
    }
}

/// What the provider was asked on one call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt_path: String,
    pub model: String,
    pub model_args: Map<String, Value>,
    pub message_count: usize,
    /// Role and content of the dialog's last turn
    pub last_role: Option<Role>,
    pub last_content: Option<String>,
}

/// Decides the reply from the incoming call.
pub type Responder = Arc<dyn Fn(&ProviderCall<'_>) -> ScriptStep + Send + Sync>;

enum Script {
    Queue(VecDeque<ScriptStep>),
    Responder(Responder),
}

pub struct ScriptedProvider {
    name: String,
    api_type: ApiType,
    script: Mutex<Script>,
    calls: Mutex<Vec<RecordedCall>>,
    next_call_id: Mutex<usize>,
}

impl ScriptedProvider {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self::with_script(Script::Queue(steps.into_iter().collect()))
    }

    /// Reply with each text in turn.
    pub fn texts<S: Into<String>>(texts: impl IntoIterator<Item = S>) -> Self {
        Self::new(texts.into_iter().map(|t| ScriptStep::Text(t.into())))
    }

    /// Decide every reply with `responder`; the script never runs out.
    pub fn from_fn(responder: impl Fn(&ProviderCall<'_>) -> ScriptStep + Send + Sync + 'static) -> Self {
        Self::with_script(Script::Responder(Arc::new(responder)))
    }

    fn with_script(script: Script) -> Self {
        Self {
            name: "scripted".into(),
            api_type: ApiType::Completion,
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
            next_call_id: Mutex::new(0),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// API style stamped on produced messages.
    pub fn with_api_type(mut self, api_type: ApiType) -> Self {
        self.api_type = api_type;
        self
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Every call received so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Steps not yet consumed (always 0 for responder scripts).
    pub fn remaining(&self) -> usize {
        match &*lock(&self.script) {
            Script::Queue(steps) => steps.len(),
            Script::Responder(_) => 0,
        }
    }

    fn next_step(&self, request: &ProviderCall<'_>) -> Option<ScriptStep> {
        match &mut *lock(&self.script) {
            Script::Queue(steps) => steps.pop_front(),
            Script::Responder(responder) => Some(responder(request)),
        }
    }

    fn function_call(&self, name: String, arguments: Map<String, Value>) -> FunctionCall {
        let mut next = lock(&self.next_call_id);
        *next += 1;
        FunctionCall::new(format!("call_{}", *next), name, arguments)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, request: ProviderCall<'_>) -> Result<Message, ProviderError> {
        let tail = request.dialog.tail();
        lock(&self.calls).push(RecordedCall {
            prompt_path: request.prompt.path.clone(),
            model: request.model.to_string(),
            model_args: request.model_args.clone(),
            message_count: request.dialog.len(),
            last_role: tail.map(|m| m.role),
            last_content: tail.map(|m| m.content.clone()),
        });

        let step = self
            .next_step(&request)
            .ok_or_else(|| ProviderError::NotConfigured(format!("{}: script exhausted", self.name)))?;

        match step {
            ScriptStep::Text(text) => Ok(response::assistant_message(&request, text, self.api_type)),
            ScriptStep::ToolCalls(calls) => {
                let calls = calls
                    .into_iter()
                    .map(|(name, arguments)| self.function_call(name, arguments))
                    .collect();
                Ok(response::tool_call_message(&request, calls, self.api_type))
            }
            ScriptStep::Fail(error) => Err(error),
            ScriptStep::Message(mut message) => {
                message.creator = request.responder.to_string();
                message.extra.extend(request.extra.clone());
                Ok(message)
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
