//! Prompts: named templates with tool declarations and handler templates.
//!
//! Besides its own template, every prompt carries three auxiliary templates used
//! by the agent loop. [`derive_handler_prompt`] turns a prompt into a transient
//! handler prompt that shares all configuration but speaks a different template.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{ParseError, PromptError};
use crate::function::{Function, FunctionHandler};
use crate::parser::{ResponseParser, TagParser};

pub const DEFAULT_EXCEPTION_PROMPT: &str = "There is an unexpected error from your response. \nHere is the error message:\n\n---\n{error_message}\n---\n\nPlease fix the error. Remember to follow the instructions from the user message.\n";

pub const DEFAULT_INTERRUPT_PROMPT: &str = "The return of the function call is as follows:\n\n---\n{call_results}\n---\n\nYou can choose to make more function calls, or you can provide your final response.\n";

pub const DEFAULT_INTERRUPT_FINAL_PROMPT: &str = "Please provide your final response.";

/// Which handler variant of a prompt to derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Sent after a response failed the prompt's output contract
    Exception,
    /// Carries one function result back to the model
    Interrupt,
    /// Forces a final answer; offers no functions
    InterruptFinal,
}

impl HandlerKind {
    fn suffix(self) -> &'static str {
        match self {
            Self::Exception => "exception_handler",
            Self::Interrupt => "interrupt_handler",
            Self::InterruptFinal => "interrupt_handler_final",
        }
    }
}

/// A named template bound to optional tool declarations.
#[derive(Clone)]
pub struct Prompt {
    /// Unique identifier, e.g. `analyst/system`
    pub path: String,

    /// Template with `{name}` placeholders (`{{` and `}}` are literal braces)
    pub template: String,

    functions: Vec<Function>,
    function_index: HashMap<String, usize>,

    parser: Option<ResponseParser>,

    /// Tag contract used when no custom parser is set
    pub tags: TagParser,

    /// Template for the exception handler, must contain `{error_message}`
    pub exception_prompt: String,

    /// Template for the interrupt handler, must contain `{call_results}`
    pub interrupt_prompt: String,

    pub interrupt_final_prompt: String,

    /// JSON schema for structured output, if the prompt requests one
    pub format: Option<Value>,
}

impl std::fmt::Debug for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prompt")
            .field("path", &self.path)
            .field("template", &self.template)
            .field("functions", &self.functions)
            .field("custom_parser", &self.parser.is_some())
            .field("tags", &self.tags)
            .field("format", &self.format)
            .finish()
    }
}

impl Prompt {
    pub fn new(path: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            template: template.into(),
            functions: Vec::new(),
            function_index: HashMap::new(),
            parser: None,
            tags: TagParser::default(),
            exception_prompt: DEFAULT_EXCEPTION_PROMPT.to_string(),
            interrupt_prompt: DEFAULT_INTERRUPT_PROMPT.to_string(),
            interrupt_final_prompt: DEFAULT_INTERRUPT_FINAL_PROMPT.to_string(),
            format: None,
        }
    }

    /// Add a function declaration. A function with the same name is replaced.
    pub fn with_function(mut self, function: Function) -> Self {
        self.add_function(function);
        self
    }

    pub fn with_parser(mut self, parser: ResponseParser) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_tags(mut self, tags: TagParser) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_exception_prompt(mut self, template: impl Into<String>) -> Self {
        self.exception_prompt = template.into();
        self
    }

    pub fn with_interrupt_prompt(mut self, template: impl Into<String>) -> Self {
        self.interrupt_prompt = template.into();
        self
    }

    pub fn with_format(mut self, schema: Value) -> Self {
        self.format = Some(schema);
        self
    }

    fn add_function(&mut self, function: Function) {
        match self.function_index.get(&function.name) {
            Some(&idx) => self.functions[idx] = function,
            None => {
                self.function_index
                    .insert(function.name.clone(), self.functions.len());
                self.functions.push(function);
            }
        }
    }

    /// Declared functions, in declaration order.
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.function_index.get(name).map(|&idx| &self.functions[idx])
    }

    pub fn has_functions(&self) -> bool {
        !self.functions.is_empty()
    }

    pub fn link_function(
        &mut self,
        name: &str,
        handler: Arc<dyn FunctionHandler>,
    ) -> Result<(), PromptError> {
        let idx = *self
            .function_index
            .get(name)
            .ok_or_else(|| PromptError::UnknownFunction {
                path: self.path.clone(),
                function: name.to_string(),
            })?;
        self.functions[idx].link(handler);
        Ok(())
    }

    /// Check the handler templates carry the placeholders the agent fills in.
    pub fn validate(&self) -> Result<(), PromptError> {
        if self.path.is_empty() {
            return Err(PromptError::EmptyPath);
        }
        if !self.exception_prompt.contains("{error_message}") {
            return Err(PromptError::MissingHandlerPlaceholder {
                path: self.path.clone(),
                template: "exception",
                placeholder: "error_message",
            });
        }
        if !self.interrupt_prompt.contains("{call_results}") {
            return Err(PromptError::MissingHandlerPlaceholder {
                path: self.path.clone(),
                template: "interrupt",
                placeholder: "call_results",
            });
        }
        Ok(())
    }

    /// Fill the template. With no arguments the raw template is returned untouched.
    ///
    /// Fails if any declared function has not been linked, so a prompt can never
    /// offer the model a tool that cannot run.
    pub fn render(&self, args: &Map<String, Value>) -> Result<String, PromptError> {
        if let Some(unlinked) = self.functions.iter().find(|f| !f.is_linked()) {
            return Err(PromptError::UnlinkedFunction {
                path: self.path.clone(),
                function: unlinked.name.clone(),
            });
        }
        if args.is_empty() {
            return Ok(self.template.clone());
        }
        format_template(&self.path, &self.template, args)
    }

    /// Run the prompt's parser over response text.
    ///
    /// Uses the custom parser when set, otherwise the tag contract.
    pub fn parse(&self, text: &str, parser_args: &Map<String, Value>) -> Result<Map<String, Value>, ParseError> {
        match &self.parser {
            Some(parser) => parser(text, parser_args),
            None => self.tags.parse(text),
        }
    }

    pub fn exception_handler(&self) -> Prompt {
        derive_handler_prompt(self, HandlerKind::Exception)
    }

    pub fn interrupt_handler(&self) -> Prompt {
        derive_handler_prompt(self, HandlerKind::Interrupt)
    }

    pub fn interrupt_handler_final(&self) -> Prompt {
        derive_handler_prompt(self, HandlerKind::InterruptFinal)
    }

    /// True for prompts produced by [`derive_handler_prompt`].
    pub fn is_handler(&self) -> bool {
        self.path.starts_with("__")
            && [HandlerKind::Exception, HandlerKind::Interrupt, HandlerKind::InterruptFinal]
                .into_iter()
                .any(|kind| self.path.ends_with(&format!("_{}", kind.suffix())))
    }
}

/// Build a transient handler prompt from `base`.
///
/// All tool, parser, and format configuration is shared; only the path and the
/// active template change. The final-answer variant drops every function so the
/// model cannot request another tool call.
pub fn derive_handler_prompt(base: &Prompt, kind: HandlerKind) -> Prompt {
    let template = match kind {
        HandlerKind::Exception => base.exception_prompt.clone(),
        HandlerKind::Interrupt => base.interrupt_prompt.clone(),
        HandlerKind::InterruptFinal => base.interrupt_final_prompt.clone(),
    };
    let mut derived = base.clone();
    derived.path = format!("__{}_{}", base.path, kind.suffix());
    derived.template = template;
    if kind == HandlerKind::InterruptFinal {
        derived.functions.clear();
        derived.function_index.clear();
    }
    derived
}

/// Python-style `{name}` substitution with `{{`/`}}` escapes.
pub fn format_template(
    path: &str,
    template: &str,
    args: &Map<String, Value>,
) -> Result<String, PromptError> {
    let malformed = |reason: &str| PromptError::MalformedTemplate {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') => return Err(malformed("nested '{' in placeholder")),
                        Some(ch) => name.push(ch),
                        None => return Err(malformed("unclosed '{'")),
                    }
                }
                let value = args.get(name.trim()).ok_or_else(|| PromptError::MissingArgument {
                    path: path.to_string(),
                    placeholder: name.clone(),
                })?;
                match value {
                    Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
            }
            '}' => return Err(malformed("single '}' encountered")),
            other => out.push(other),
        }
    }
    Ok(out)
}
