//! The agent call loop.
//!
//! An [`Agent`] binds a system prompt, a pinned model snapshot, and a
//! provider. [`Agent::call`] drives the provider until the dialog's active
//! prompt gets a final (non-tool) answer:
//!
//! 1. **Fork** the dialog for the round; contract violations are retried on
//!    the fork through the prompt's exception handler, so failed attempts
//!    never reach the canonical transcript
//! 2. **Accept** the first clean response and append it to the dialog
//! 3. **If tool calls**: dispatch them in order, feed each result back through
//!    the interrupt handler, and start the next round
//! 4. **Else**: return the response
//!
//! On the last permitted interrupt round the final-answer prompt is sent,
//! which offers no tools.

use std::collections::BTreeMap;
use std::sync::Arc;

use lllm_core::dialog::Dialog;
use lllm_core::function::FunctionCall;
use lllm_core::log::LogBase;
use lllm_core::message::{ApiType, Message, Role};
use lllm_core::model_card::{ModelCard, ModelCatalog, Tokenizer};
use lllm_core::prompt::Prompt;
use lllm_core::provider::{Provider, ProviderCall};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::dispatch;
use crate::error::AgentError;
use crate::outcome::CallOutcome;
use crate::policy::{BackoffPolicy, RetryLimits};

/// Per-call inputs besides the dialog.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Metadata copied onto every produced message (e.g. frontend replay info)
    pub extra: Map<String, Value>,
    /// Model arguments overriding the agent's for this call
    pub args: Map<String, Value>,
    /// Arguments forwarded to the prompt's parser
    pub parser_args: Map<String, Value>,
}

/// The final response of a call and every function call dispatched on the way.
#[derive(Debug, Clone)]
pub struct CallResult {
    pub response: Message,
    pub interrupts: Vec<FunctionCall>,
}

/// Outcome of [`Agent::classify`].
#[derive(Debug, Clone)]
pub struct Classification {
    /// Probability of every alternative token the model reported
    pub top_probs: BTreeMap<String, f64>,
    pub response: Message,
}

impl Classification {
    /// The most probable of `classes`.
    pub fn best<'a>(&self, classes: &'a [String]) -> Option<&'a str> {
        classes
            .iter()
            .filter_map(|c| self.top_probs.get(c).map(|p| (c.as_str(), *p)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, _)| c)
    }
}

pub struct Agent {
    name: String,
    system_prompt: Arc<Prompt>,
    /// Snapshot actually sent to the provider
    model: String,
    model_card: ModelCard,
    model_args: Map<String, Value>,
    provider: Arc<dyn Provider>,
    log_base: Arc<dyn LogBase>,
    limits: RetryLimits,
    backoff: BackoffPolicy,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("system_prompt", &self.system_prompt.path)
            .field("model", &self.model)
            .field("model_args", &self.model_args)
            .field("provider", &self.provider.name())
            .field("limits", &self.limits)
            .finish()
    }
}

/// Builds an [`Agent`], resolving its model card.
pub struct AgentBuilder {
    name: String,
    system_prompt: Arc<Prompt>,
    model: String,
    model_args: Map<String, Value>,
    provider: Arc<dyn Provider>,
    log_base: Arc<dyn LogBase>,
    catalog: Option<ModelCatalog>,
    limits: RetryLimits,
    backoff: BackoffPolicy,
}

impl AgentBuilder {
    pub fn model_args(mut self, args: Map<String, Value>) -> Self {
        self.model_args = args;
        self
    }

    /// Catalog used to resolve the model (built-in cards by default).
    pub fn catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn limits(mut self, limits: RetryLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn max_exception_retry(mut self, n: u32) -> Self {
        self.limits.max_exception_retry = n;
        self
    }

    pub fn max_interrupt_times(mut self, n: u32) -> Self {
        self.limits.max_interrupt_times = n;
        self
    }

    pub fn max_llm_recall(mut self, n: u32) -> Self {
        self.limits.max_llm_recall = n;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Resolve the model card, check the model arguments, and pin the latest snapshot.
    pub fn build(self) -> Result<Agent, AgentError> {
        let catalog = self.catalog.unwrap_or_else(ModelCatalog::with_defaults);
        let model_card = catalog.find(&self.model)?.clone();
        model_card.check_args(&self.model_args)?;
        let model = model_card.latest_snapshot().to_string();
        debug!(agent = %self.name, model = %model, "Agent ready");

        Ok(Agent {
            name: self.name,
            system_prompt: self.system_prompt,
            model,
            model_card,
            model_args: self.model_args,
            provider: self.provider,
            log_base: self.log_base,
            limits: self.limits,
            backoff: self.backoff,
        })
    }
}

impl Agent {
    pub fn builder(
        name: impl Into<String>,
        system_prompt: Arc<Prompt>,
        model: impl Into<String>,
        provider: Arc<dyn Provider>,
        log_base: Arc<dyn LogBase>,
    ) -> AgentBuilder {
        AgentBuilder {
            name: name.into(),
            system_prompt,
            model: model.into(),
            model_args: Map::new(),
            provider,
            log_base,
            catalog: None,
            limits: RetryLimits::default(),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pinned snapshot sent to the provider.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn model_card(&self) -> &ModelCard {
        &self.model_card
    }

    pub fn model_args(&self) -> &Map<String, Value> {
        &self.model_args
    }

    pub fn limits(&self) -> RetryLimits {
        self.limits
    }

    pub fn system_prompt(&self) -> &Arc<Prompt> {
        &self.system_prompt
    }

    /// Swap the system prompt used by future dialogs.
    pub fn reload_system(&mut self, system_prompt: Arc<Prompt>) {
        self.system_prompt = system_prompt;
    }

    /// Start a dialog whose first turn is the rendered system prompt.
    ///
    /// Without a session name one is generated from the current time.
    pub fn init_dialog(&self, prompt_args: &Map<String, Value>, session_name: Option<&str>) -> Result<Dialog, AgentError> {
        let session_name = session_name.map(String::from).unwrap_or_else(default_session_name);
        let mut dialog = Dialog::new(Arc::clone(&self.log_base), session_name, None);
        dialog.send_message(
            Arc::clone(&self.system_prompt),
            prompt_args,
            Role::System,
            "system",
            Map::new(),
        )?;
        Ok(dialog)
    }

    /// Send `prompt` as a user turn, making it the prompt the next call answers.
    pub fn send_message<'d>(
        &self,
        dialog: &'d mut Dialog,
        prompt: Arc<Prompt>,
        prompt_args: &Map<String, Value>,
    ) -> Result<&'d Message, AgentError> {
        Ok(dialog.send_message(prompt, prompt_args, Role::User, "internal", Map::new())?)
    }

    /// Run the call loop with default options.
    pub async fn call(&self, dialog: &mut Dialog) -> Result<CallResult, AgentError> {
        self.call_with(dialog, &CallOptions::default()).await
    }

    /// Drive the provider until the dialog's active prompt gets a final answer.
    ///
    /// Every accepted response is appended to `dialog`, along with the
    /// interrupt turns carrying function results.
    pub async fn call_with(&self, dialog: &mut Dialog, options: &CallOptions) -> Result<CallResult, AgentError> {
        let mut current_prompt = active_prompt(dialog)?;
        let mut interrupts: Vec<FunctionCall> = Vec::new();

        let mut model_args = self.model_args.clone();
        model_args.extend(options.args.clone());

        let rounds = self.limits.rounds();
        for round in 0..rounds {
            let (mut response, attempts) = self
                .respond(dialog, &mut current_prompt, &model_args, options, round)
                .await?;
            response.execution_attempts = attempts;
            dialog.append(response.clone());

            if !response.is_function_call() {
                if round > 0 {
                    info!(agent = %self.name, interrupts = round, "Stopped calling functions");
                }
                return Ok(CallResult { response, interrupts });
            }
            if round + 1 == rounds {
                warn!(agent = %self.name, rounds, "Function call after the final-answer prompt");
                break;
            }

            let names: Vec<&str> = response.function_calls.iter().map(|c| c.name.as_str()).collect();
            info!(
                agent = %self.name,
                round = round + 1,
                max = self.limits.max_interrupt_times,
                functions = ?names,
                "Handling function calls"
            );

            let role = if response.api_type == ApiType::Completion { Role::Tool } else { Role::User };
            let interrupt_prompt = Arc::new(current_prompt.interrupt_handler());
            for call in response.function_calls.iter().cloned() {
                let call_id = call.id.clone();
                let dispatched = dispatch::dispatch(&current_prompt, call, &interrupts).await?;

                let mut args = Map::new();
                args.insert("call_results".into(), Value::String(dispatched.result_str));
                let mut extra = Map::new();
                extra.insert("tool_call_id".into(), Value::String(call_id));
                dialog.send_message(Arc::clone(&interrupt_prompt), &args, role, "function", extra)?;

                if !dispatched.repeated {
                    interrupts.push(dispatched.call);
                }
            }

            if self.limits.is_last_interrupt(round) {
                debug!(agent = %self.name, round = round + 1, "Interrupt budget spent, asking for the final response");
                dialog.send_message(
                    Arc::new(current_prompt.interrupt_handler_final()),
                    &Map::new(),
                    Role::User,
                    "function",
                    Map::new(),
                )?;
            }
            current_prompt = active_prompt(dialog)?;
        }

        Err(AgentError::InterruptBudgetExhausted { rounds })
    }

    /// One round: retry on a fork until the provider returns a clean response.
    ///
    /// Returns the accepted response and every rejected response before it.
    async fn respond(
        &self,
        dialog: &Dialog,
        current_prompt: &mut Arc<Prompt>,
        model_args: &Map<String, Value>,
        options: &CallOptions,
        round: usize,
    ) -> Result<(Message, Vec<Message>), AgentError> {
        let mut llm_recall = self.limits.max_llm_recall;
        let mut exception_retry = self.limits.max_exception_retry;
        let mut working = dialog.fork();
        let mut attempts = Vec::new();

        loop {
            let request = ProviderCall {
                dialog: &working,
                prompt: &**current_prompt,
                model: &self.model,
                model_args,
                parser_args: &options.parser_args,
                responder: &self.name,
                extra: &options.extra,
            };
            debug!(agent = %self.name, round, prompt = %current_prompt.path, "Calling provider");

            match CallOutcome::from(self.provider.call(request).await) {
                CallOutcome::Accepted(response) => return Ok((response, attempts)),

                CallOutcome::SemanticFailure { response, error } => {
                    if let Some(response) = response {
                        working.append(response.clone());
                        attempts.push(response);
                    }
                    if exception_retry == 0 {
                        return Err(AgentError::Semantic {
                            agent: self.name.clone(),
                            message: error,
                        });
                    }
                    exception_retry -= 1;
                    warn!(
                        agent = %self.name,
                        round,
                        retry = self.limits.max_exception_retry - exception_retry,
                        max = self.limits.max_exception_retry,
                        error = %error,
                        "Handling response exception"
                    );

                    let mut args = Map::new();
                    args.insert("error_message".into(), Value::String(error));
                    working.send_message(
                        Arc::new(current_prompt.exception_handler()),
                        &args,
                        Role::User,
                        "exception",
                        Map::new(),
                    )?;
                    // the handler is a one-shot detour
                    *current_prompt = active_prompt(dialog)?;
                }

                CallOutcome::TransientFailure(error) => {
                    if error.is_rate_limit() {
                        let delay = self.backoff.rate_limit_delay();
                        warn!(agent = %self.name, delay_ms = delay.as_millis() as u64, error = %error, "Rate limited, backing off");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    if llm_recall == 0 {
                        return Err(AgentError::Provider(error));
                    }
                    llm_recall -= 1;
                    warn!(agent = %self.name, remaining = llm_recall, error = %error, "Provider call failed, retrying");
                    tokio::time::sleep(self.backoff.recall_delay).await;
                }
            }
        }
    }

    /// Force a single-token answer drawn from `classes`.
    ///
    /// Sends `classifier_prompt` (or a default listing the classes), calls with
    /// the model card's classifier arguments, and reads the alternatives of the
    /// one generated token. Bad answers are retried on a fork under the
    /// exception budget; only the accepted answer reaches `dialog`.
    pub async fn classify(
        &self,
        dialog: &mut Dialog,
        classes: &[String],
        tokenizer: &dyn Tokenizer,
        classifier_prompt: Option<&str>,
        strength: i32,
    ) -> Result<Classification, AgentError> {
        let classifier_args = self.model_card.make_classifier(tokenizer, classes, strength)?;
        let prompt_text = classifier_prompt.map(String::from).unwrap_or_else(|| {
            let quoted: Vec<String> = classes.iter().map(|c| format!("\"{c}\"")).collect();
            format!("Please respond with one and only one word from {}.", quoted.join(" or "))
        });
        dialog.send_text(prompt_text, Role::User, "internal");

        let options = CallOptions {
            args: classifier_args,
            ..CallOptions::default()
        };
        let mut working = dialog.fork();
        let mut llm_recall = self.limits.max_llm_recall;
        let mut exception_retry = self.limits.max_exception_retry;

        loop {
            let error = match self.call_with(&mut working, &options).await {
                Ok(result) => match read_top_probs(&result.response, classes) {
                    Ok(top_probs) => {
                        dialog.append(result.response.clone());
                        return Ok(Classification {
                            top_probs,
                            response: result.response,
                        });
                    }
                    Err(e) => e,
                },
                Err(e) => e,
            };

            match error {
                AgentError::Classification { .. } if exception_retry > 0 => {
                    exception_retry -= 1;
                    warn!(
                        agent = %self.name,
                        retry = self.limits.max_exception_retry - exception_retry,
                        max = self.limits.max_exception_retry,
                        error = %error,
                        "Retrying classification"
                    );
                    working.send_text(
                        format!("Please respond with one and only one word from {classes:?}"),
                        Role::User,
                        "internal",
                    );
                }
                AgentError::Classification { .. } => return Err(error),
                other if llm_recall > 0 => {
                    llm_recall -= 1;
                    warn!(agent = %self.name, remaining = llm_recall, error = %other, "Classification call failed, retrying");
                    tokio::time::sleep(self.backoff.recall_delay).await;
                }
                other => return Err(other),
            }
        }
    }
}

/// Alternatives of the single generated token, checked to cover every class.
fn read_top_probs(response: &Message, classes: &[String]) -> Result<BTreeMap<String, f64>, AgentError> {
    let [token] = response.logprobs.as_slice() else {
        return Err(AgentError::Classification {
            message: format!(
                "Failed to classify the proposition, not only one token ({})",
                response.logprobs.len()
            ),
            top_probs: BTreeMap::new(),
        });
    };

    let top_probs: BTreeMap<String, f64> = token
        .top_logprobs
        .iter()
        .map(|alt| (alt.token.clone(), alt.logprob.exp()))
        .collect();

    let missing: Vec<String> = classes
        .iter()
        .filter(|c| !top_probs.contains_key(c.as_str()))
        .map(|c| format!("Token {c} not found in the top logprobs"))
        .collect();
    if !missing.is_empty() {
        return Err(AgentError::Classification {
            message: format!("Failed to classify the proposition:\n{}", missing.join("\n")),
            top_probs,
        });
    }
    Ok(top_probs)
}

fn active_prompt(dialog: &Dialog) -> Result<Arc<Prompt>, AgentError> {
    dialog.top_prompt().cloned().ok_or(AgentError::NoActivePrompt)
}

fn default_session_name() -> String {
    let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(6).collect();
    format!("{}_{suffix}", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}
