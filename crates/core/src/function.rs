//! Function (tool) declarations and invocation records.
//!
//! A [`Function`] is declared on a prompt and becomes callable once a
//! [`FunctionHandler`] is linked to it. Each request the model makes is captured
//! as a [`FunctionCall`], which is executed once and carries its own result.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FunctionError;

/// One invocation of a function requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Provider-supplied call id (e.g. OpenAI `tool_call_id`)
    pub id: String,

    /// Name of the requested function
    pub name: String,

    /// Arguments as sent by the model
    #[serde(default)]
    pub arguments: Map<String, Value>,

    /// Raw return value of the linked handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Text fed back to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_str: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl FunctionCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            result: None,
            result_str: None,
            error_message: None,
        }
    }

    /// True iff the call produced a result and no error.
    pub fn success(&self) -> bool {
        self.error_message.is_none() && self.result_str.is_some()
    }

    /// Same function name and the same set of key/value pairs.
    ///
    /// Key order does not matter. Values are compared exactly, so `"1"` and `1`
    /// are different arguments.
    pub fn equals(&self, other: &FunctionCall) -> bool {
        self.name == other.name
            && self.arguments.len() == other.arguments.len()
            && self
                .arguments
                .iter()
                .all(|(k, v)| other.arguments.get(k) == Some(v))
    }

    pub fn is_repeated(&self, history: &[FunctionCall]) -> bool {
        history.iter().any(|call| self.equals(call))
    }

    /// Arguments rendered the way they are shown to the model.
    pub fn arguments_str(&self) -> String {
        Value::Object(self.arguments.clone()).to_string()
    }
}

impl std::fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Calling function: {} with arguments: {}",
            self.name,
            self.arguments_str()
        )?;
        if let (true, Some(result)) = (self.success(), &self.result_str) {
            write!(f, "Return:\n\n---\n{result}\n---\n")?;
        }
        Ok(())
    }
}

/// The callable side of a [`Function`].
///
/// Implemented for any `Fn(&Map<String, Value>) -> Result<Value, E>` closure, so
/// simple handlers can be linked directly.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<Value, FunctionError>;
}

#[async_trait]
impl<F, E> FunctionHandler for F
where
    F: Fn(&Map<String, Value>) -> Result<Value, E> + Send + Sync,
    E: std::fmt::Display,
{
    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<Value, FunctionError> {
        self(arguments).map_err(|e| FunctionError(e.to_string()))
    }
}

/// Turns a handler's return value into the text shown to the model.
pub type ResultProcessor = Arc<dyn Fn(&Value, &FunctionCall) -> String + Send + Sync>;

/// Default result text: the call, its arguments, and the result between rules.
pub fn default_result_processor(result: &Value, call: &FunctionCall) -> String {
    let result = match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!(
        "Return of calling function {} with arguments {}:\n---\n{}\n---\n",
        call.name,
        call.arguments_str(),
        result
    )
}

fn default_true() -> bool {
    true
}

/// A tool declaration attached to a prompt.
#[derive(Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,

    pub description: String,

    /// JSON schema of each parameter, keyed by parameter name
    #[serde(default)]
    pub properties: Map<String, Value>,

    #[serde(default)]
    pub required: Vec<String>,

    #[serde(default)]
    pub additional_properties: bool,

    #[serde(default = "default_true")]
    pub strict: bool,

    #[serde(skip)]
    handler: Option<Arc<dyn FunctionHandler>>,

    #[serde(skip)]
    processor: Option<ResultProcessor>,
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("properties", &self.properties)
            .field("required", &self.required)
            .field("linked", &self.is_linked())
            .finish()
    }
}

impl Function {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            properties: Map::new(),
            required: Vec::new(),
            additional_properties: false,
            strict: true,
            handler: None,
            processor: None,
        }
    }

    /// Declare a parameter. `required` parameters are listed in the schema's `required` array.
    pub fn with_param(mut self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    pub fn with_handler(mut self, handler: impl FunctionHandler + 'static) -> Self {
        self.link(Arc::new(handler));
        self
    }

    pub fn with_processor(mut self, processor: ResultProcessor) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn link(&mut self, handler: Arc<dyn FunctionHandler>) {
        self.handler = Some(handler);
    }

    pub fn is_linked(&self) -> bool {
        self.handler.is_some()
    }

    /// OpenAI-style tool declaration.
    pub fn to_tool_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": self.properties,
                    "required": self.required,
                    "additionalProperties": self.additional_properties,
                },
                "strict": self.strict,
            }
        })
    }

    /// Execute `call` against the linked handler, filling in its result fields.
    ///
    /// A handler error is captured on the call and never returned; the only
    /// error is calling a function that was never linked.
    pub async fn execute(&self, mut call: FunctionCall) -> Result<FunctionCall, FunctionError> {
        let handler = self
            .handler
            .as_ref()
            .ok_or_else(|| FunctionError(format!("Function {} is not linked", self.name)))?;

        match handler.invoke(&call.arguments).await {
            Ok(result) => {
                let text = match &self.processor {
                    Some(processor) => processor(&result, &call),
                    None => default_result_processor(&result, &call),
                };
                call.result = Some(result);
                call.result_str = Some(text);
            }
            Err(e) => {
                call.result_str = Some(format!("Error: {e}"));
                call.error_message = Some(e.0);
            }
        }
        Ok(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn equality_ignores_key_order() {
        let a = FunctionCall::new("1", "f", args(json!({"a": 1, "b": 2})));
        let b = FunctionCall::new("2", "f", args(json!({"b": 2, "a": 1})));
        assert!(a.equals(&b));
        assert!(b.equals(&a));
    }

    #[test]
    fn equality_rejects_changed_value_or_keys() {
        let a = FunctionCall::new("1", "f", args(json!({"a": 1, "b": 2})));
        let changed = FunctionCall::new("2", "f", args(json!({"a": 1, "b": 3})));
        let subset = FunctionCall::new("3", "f", args(json!({"a": 1})));
        let superset = FunctionCall::new("4", "f", args(json!({"a": 1, "b": 2, "c": 3})));
        let renamed = FunctionCall::new("5", "g", args(json!({"a": 1, "b": 2})));
        assert!(!a.equals(&changed));
        assert!(!a.equals(&subset));
        assert!(!subset.equals(&a));
        assert!(!a.equals(&superset));
        assert!(!a.equals(&renamed));
    }

    #[test]
    fn equality_does_not_coerce_types() {
        let number = FunctionCall::new("1", "f", args(json!({"a": 1})));
        let string = FunctionCall::new("2", "f", args(json!({"a": "1"})));
        assert!(!number.equals(&string));
    }

    #[test]
    fn is_repeated_scans_history() {
        let history = vec![
            FunctionCall::new("1", "f", args(json!({"q": "rust"}))),
            FunctionCall::new("2", "g", args(json!({}))),
        ];
        assert!(FunctionCall::new("3", "g", Map::new()).is_repeated(&history));
        assert!(!FunctionCall::new("3", "f", args(json!({"q": "go"}))).is_repeated(&history));
        assert!(!FunctionCall::new("3", "f", Map::new()).is_repeated(&[]));
    }

    #[test]
    fn success_requires_result_and_no_error() {
        let mut call = FunctionCall::new("1", "f", Map::new());
        assert!(!call.success());
        call.result_str = Some("ok".into());
        assert!(call.success());
        call.error_message = Some("boom".into());
        assert!(!call.success());
    }

    #[tokio::test]
    async fn execute_uses_default_processor() {
        let func = Function::new("echo", "Echo text")
            .with_param("text", json!({"type": "string"}), true)
            .with_handler(|a: &Map<String, Value>| -> Result<Value, String> {
                Ok(a.get("text").cloned().unwrap_or(Value::Null))
            });
        let call = FunctionCall::new("c1", "echo", args(json!({"text": "hi"})));
        let done = func.execute(call).await.unwrap();
        assert!(done.success());
        assert_eq!(done.result, Some(json!("hi")));
        assert_eq!(
            done.result_str.as_deref(),
            Some("Return of calling function echo with arguments {\"text\":\"hi\"}:\n---\nhi\n---\n")
        );
    }

    #[tokio::test]
    async fn execute_captures_handler_errors() {
        let func = Function::new("fail", "Always fails")
            .with_handler(|_: &Map<String, Value>| -> Result<Value, String> { Err("disk full".into()) });
        let done = func.execute(FunctionCall::new("c1", "fail", Map::new())).await.unwrap();
        assert!(!done.success());
        assert_eq!(done.error_message.as_deref(), Some("disk full"));
        assert_eq!(done.result_str.as_deref(), Some("Error: disk full"));
        assert!(done.result.is_none());
    }

    #[tokio::test]
    async fn execute_custom_processor() {
        let func = Function::new("count", "Count")
            .with_handler(|_: &Map<String, Value>| -> Result<Value, String> { Ok(json!(3)) })
            .with_processor(Arc::new(|v: &Value, c: &FunctionCall| format!("{} -> {v}", c.name)));
        let done = func.execute(FunctionCall::new("c1", "count", Map::new())).await.unwrap();
        assert_eq!(done.result_str.as_deref(), Some("count -> 3"));
    }

    #[tokio::test]
    async fn execute_unlinked_fails() {
        let func = Function::new("ghost", "Not linked");
        assert!(!func.is_linked());
        let err = func.execute(FunctionCall::new("c1", "ghost", Map::new())).await.unwrap_err();
        assert!(err.to_string().contains("not linked"));
    }

    #[test]
    fn tool_schema_shape() {
        let func = Function::new("search", "Search the web")
            .with_param("query", json!({"type": "string"}), true);
        let schema = func.to_tool_schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "search");
        assert_eq!(schema["function"]["parameters"]["required"], json!(["query"]));
        assert_eq!(schema["function"]["parameters"]["additionalProperties"], json!(false));
        assert_eq!(schema["function"]["strict"], json!(true));
    }

    #[test]
    fn declaration_deserializes_without_handler() {
        let func: Function = serde_json::from_value(json!({
            "name": "lookup",
            "description": "Look up a ticker",
            "properties": {"ticker": {"type": "string"}},
            "required": ["ticker"]
        }))
        .unwrap();
        assert_eq!(func.name, "lookup");
        assert!(func.strict);
        assert!(!func.is_linked());
    }
}
