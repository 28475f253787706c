//! End-to-end behavior of `Agent::call` against a scripted provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lllm_agent::{Agent, AgentError, RetryLimits};
use lllm_core::dialog::Dialog;
use lllm_core::error::ProviderError;
use lllm_core::function::{Function, FunctionCall};
use lllm_core::log::{InMemoryLog, LogBase};
use lllm_core::message::{ApiType, Message, Role};
use lllm_core::parser::TagParser;
use lllm_core::prompt::{DEFAULT_INTERRUPT_FINAL_PROMPT, Prompt};
use lllm_core::provider::Provider;
use lllm_providers::{ScriptStep, ScriptedProvider};
use serde_json::{Map, Value, json};

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn system_prompt() -> Arc<Prompt> {
    Arc::new(Prompt::new("test/system", "You are a tester."))
}

fn build_agent(provider: Arc<ScriptedProvider>, limits: RetryLimits) -> Agent {
    let log: Arc<dyn LogBase> = Arc::new(InMemoryLog::new());
    Agent::builder("tester", system_prompt(), "gpt-4.1", provider as Arc<dyn Provider>, log)
        .limits(limits)
        .build()
        .unwrap()
}

/// System turn plus one task turn sent under `task`.
fn start(agent: &Agent, task: Prompt, task_args: Value) -> Dialog {
    let mut dialog = agent.init_dialog(&Map::new(), Some("test-session")).unwrap();
    agent.send_message(&mut dialog, Arc::new(task), &args(task_args)).unwrap();
    dialog
}

fn task_prompt() -> Prompt {
    Prompt::new("test/task", "User task: {task}")
}

fn answer_prompt() -> Prompt {
    task_prompt().with_tags(TagParser {
        xml_tags: vec!["answer".into()],
        ..TagParser::default()
    })
}

#[tokio::test]
async fn plain_answer_is_returned_verbatim() {
    let provider = Arc::new(ScriptedProvider::texts(["All done!"]));
    let agent = build_agent(Arc::clone(&provider), RetryLimits::default());
    let mut dialog = start(&agent, task_prompt(), json!({"task": "demo"}));
    assert_eq!(dialog.messages()[1].content, "User task: demo");

    let result = agent.call(&mut dialog).await.unwrap();

    assert_eq!(result.response.content, "All done!");
    assert!(result.interrupts.is_empty());
    assert_eq!(provider.call_count(), 1);
    assert_eq!(dialog.len(), 3);
    let tail = dialog.tail().unwrap();
    assert_eq!(tail.content, result.response.content);
    assert_eq!(tail.creator, "tester");
    assert_eq!(tail.role, Role::Assistant);
}

#[tokio::test]
async fn provider_sees_pinned_snapshot_and_active_prompt() {
    let provider = Arc::new(ScriptedProvider::texts(["ok"]));
    let agent = build_agent(Arc::clone(&provider), RetryLimits::default());
    let mut dialog = start(&agent, task_prompt(), json!({"task": "demo"}));
    agent.call(&mut dialog).await.unwrap();

    let call = &provider.calls()[0];
    assert_eq!(call.model, "gpt-4.1-2025-04-14");
    assert_eq!(call.prompt_path, "test/task");
    assert_eq!(call.message_count, 2);
    assert_eq!(call.last_content.as_deref(), Some("User task: demo"));
}

#[tokio::test]
async fn contract_violations_retry_on_a_fork() {
    let provider = Arc::new(ScriptedProvider::texts([
        "I forgot the tags",
        "Still no tags",
        "<answer>42</answer>",
    ]));
    let agent = build_agent(Arc::clone(&provider), RetryLimits::default());
    let mut dialog = start(&agent, answer_prompt(), json!({"task": "compute"}));

    let result = agent.call(&mut dialog).await.unwrap();

    assert_eq!(provider.call_count(), 3);
    assert_eq!(result.response.content, "<answer>42</answer>");
    assert_eq!(result.response.parsed["xml_tags"]["answer"], json!(["42"]));

    // only the accepted response reaches the transcript
    assert_eq!(dialog.len(), 3);
    assert!(dialog.messages().iter().all(|m| !m.content.contains("unexpected error")));
    let attempts = &dialog.tail().unwrap().execution_attempts;
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].content, "I forgot the tags");
    assert!(attempts.iter().all(Message::has_errors));

    // retries answer the original prompt, with the handler text as the last turn
    let calls = provider.calls();
    assert_eq!(calls[1].prompt_path, "test/task");
    assert_eq!(calls[1].message_count, 4);
    assert!(calls[1].last_content.as_deref().unwrap().contains("No answer tags found"));
    assert_eq!(calls[2].message_count, 6);
}

#[tokio::test]
async fn exhausted_exception_budget_raises() {
    let provider = Arc::new(ScriptedProvider::texts(["no", "no", "no"]));
    let limits = RetryLimits {
        max_exception_retry: 2,
        ..RetryLimits::default()
    };
    let agent = build_agent(Arc::clone(&provider), limits);
    let mut dialog = start(&agent, answer_prompt(), json!({"task": "compute"}));

    let err = agent.call(&mut dialog).await.unwrap_err();

    assert!(err.is_semantic());
    assert!(err.to_string().contains("No answer tags found"));
    assert_eq!(provider.call_count(), 3);
    assert_eq!(dialog.len(), 2);
}

#[tokio::test]
async fn raised_semantic_errors_share_the_exception_budget() {
    let provider = Arc::new(ScriptedProvider::new([
        ScriptStep::Fail(ProviderError::Semantic("refused to answer".into())),
        ScriptStep::text("fine"),
    ]));
    let agent = build_agent(Arc::clone(&provider), RetryLimits::default());
    let mut dialog = start(&agent, task_prompt(), json!({"task": "demo"}));

    let result = agent.call(&mut dialog).await.unwrap();
    assert_eq!(result.response.content, "fine");
    assert!(result.response.execution_attempts.is_empty());
    assert!(provider.calls()[1].last_content.as_deref().unwrap().contains("refused to answer"));
}

#[tokio::test]
async fn tool_calls_run_in_request_order() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let record = |name: &'static str, trace: Arc<Mutex<Vec<String>>>| {
        Function::new(name, "Record the call").with_handler(move |a: &Map<String, Value>| {
            trace.lock().unwrap().push(format!("{name}:{}", a["step"]));
            Ok::<_, String>(json!(name))
        })
    };
    let prompt = task_prompt()
        .with_function(record("first", Arc::clone(&trace)))
        .with_function(record("second", Arc::clone(&trace)));

    let provider = Arc::new(ScriptedProvider::new([
        ScriptStep::tool_calls([("first", json!({"step": 1})), ("second", json!({"step": 2}))]),
        ScriptStep::text("both done"),
    ]));
    let agent = build_agent(Arc::clone(&provider), RetryLimits::default());
    let mut dialog = start(&agent, prompt, json!({"task": "demo"}));

    let result = agent.call(&mut dialog).await.unwrap();

    assert_eq!(*trace.lock().unwrap(), vec!["first:1", "second:2"]);
    assert_eq!(result.response.content, "both done");
    assert_eq!(result.interrupts.len(), 2);
    assert_eq!(result.interrupts[0].name, "first");
    assert!(result.interrupts.iter().all(FunctionCall::success));

    // system, task, tool call, two tool results, final answer
    let messages = dialog.messages();
    assert_eq!(messages.len(), 6);
    assert_eq!(messages[2].role, Role::ToolCall);
    for (message, id) in messages[3..5].iter().zip(["call_1", "call_2"]) {
        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.creator, "function");
        assert_eq!(message.extra["tool_call_id"], json!(id));
    }
    assert!(messages[3].content.contains("Return of calling function first"));
    assert!(messages[4].content.contains("Return of calling function second"));

    // the follow-up call answers the interrupt handler
    assert_eq!(provider.calls()[1].prompt_path, "__test/task_interrupt_handler");
}

#[tokio::test]
async fn response_style_results_are_user_turns() {
    let prompt = task_prompt().with_function(
        Function::new("ping", "Ping").with_handler(|_: &Map<String, Value>| Ok::<_, String>(json!("pong"))),
    );
    let provider = Arc::new(
        ScriptedProvider::new([ScriptStep::tool_call("ping", json!({})), ScriptStep::text("done")])
            .with_api_type(ApiType::Response),
    );
    let agent = build_agent(Arc::clone(&provider), RetryLimits::default());
    let mut dialog = start(&agent, prompt, json!({"task": "demo"}));

    agent.call(&mut dialog).await.unwrap();
    assert_eq!(dialog.messages()[3].role, Role::User);
}

#[tokio::test]
async fn repeated_calls_are_not_executed_again() {
    let counter = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&counter);
    let prompt = task_prompt().with_function(Function::new("lookup", "Look something up").with_handler(
        move |_: &Map<String, Value>| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(json!("found"))
        },
    ));
    let provider = Arc::new(ScriptedProvider::new([
        ScriptStep::tool_call("lookup", json!({"q": "rust", "page": 1})),
        ScriptStep::tool_call("lookup", json!({"page": 1, "q": "rust"})),
        ScriptStep::text("answer"),
    ]));
    let agent = build_agent(Arc::clone(&provider), RetryLimits::default());
    let mut dialog = start(&agent, prompt, json!({"task": "demo"}));

    let result = agent.call(&mut dialog).await.unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(result.interrupts.len(), 1);
    let notice = &dialog.messages()[5].content;
    assert!(notice.contains("has been called earlier"));
}

#[tokio::test]
async fn final_prompt_is_forced_on_the_last_interrupt() {
    let counter = Arc::new(AtomicUsize::new(0));
    let prompt = task_prompt().with_function(
        Function::new("step", "Take a step").with_handler(|a: &Map<String, Value>| Ok::<_, String>(a["n"].clone())),
    );

    // keeps calling tools while any are offered
    let provider = Arc::new(ScriptedProvider::from_fn(move |call| {
        if call.prompt.has_functions() {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            ScriptStep::tool_call("step", json!({ "n": n }))
        } else {
            ScriptStep::text("final answer")
        }
    }));
    let limits = RetryLimits {
        max_interrupt_times: 2,
        ..RetryLimits::default()
    };
    let agent = build_agent(Arc::clone(&provider), limits);
    let mut dialog = start(&agent, prompt, json!({"task": "demo"}));

    let result = agent.call(&mut dialog).await.unwrap();

    assert_eq!(result.response.content, "final answer");
    assert_eq!(result.interrupts.len(), 2);
    assert_eq!(provider.call_count(), 3);
    let finals = dialog
        .messages()
        .iter()
        .filter(|m| m.content == DEFAULT_INTERRUPT_FINAL_PROMPT)
        .count();
    assert_eq!(finals, 1);
    assert_eq!(provider.calls()[2].prompt_path, "__test/task_interrupt_handler_final");
}

#[tokio::test]
async fn tool_call_after_the_final_prompt_exhausts_the_budget() {
    let counter = Arc::new(AtomicUsize::new(0));
    let prompt = task_prompt().with_function(
        Function::new("step", "Take a step").with_handler(|a: &Map<String, Value>| Ok::<_, String>(a["n"].clone())),
    );

    // ignores the final-answer prompt
    let provider = Arc::new(ScriptedProvider::from_fn(move |_| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        ScriptStep::tool_call("step", json!({ "n": n }))
    }));
    let limits = RetryLimits {
        max_interrupt_times: 1,
        ..RetryLimits::default()
    };
    let agent = build_agent(Arc::clone(&provider), limits);
    let mut dialog = start(&agent, prompt, json!({"task": "demo"}));

    let err = agent.call(&mut dialog).await.unwrap_err();

    assert!(matches!(err, AgentError::InterruptBudgetExhausted { rounds: 2 }));
    assert_eq!(provider.call_count(), 2);
    assert_eq!(provider.calls()[1].prompt_path, "__test/task_interrupt_handler_final");
    // the last request is logged but never executed
    assert!(dialog.tail().unwrap().is_function_call());
    let interrupts = dialog
        .messages()
        .iter()
        .filter(|m| m.creator == "function")
        .count();
    assert_eq!(interrupts, 2);
}

#[tokio::test]
async fn handler_errors_are_fed_back_to_the_model() {
    let prompt = task_prompt().with_function(
        Function::new("explode", "Always fails")
            .with_handler(|_: &Map<String, Value>| Err::<Value, _>("boom".to_string())),
    );
    let provider = Arc::new(ScriptedProvider::new([
        ScriptStep::tool_call("explode", json!({})),
        ScriptStep::text("recovered"),
    ]));
    let agent = build_agent(Arc::clone(&provider), RetryLimits::default());
    let mut dialog = start(&agent, prompt, json!({"task": "demo"}));

    let result = agent.call(&mut dialog).await.unwrap();
    assert_eq!(result.response.content, "recovered");
    assert_eq!(result.interrupts[0].error_message.as_deref(), Some("boom"));
    assert!(dialog.messages()[3].content.contains("Error: boom"));
}

#[tokio::test]
async fn unknown_function_is_not_retried() {
    let provider = Arc::new(ScriptedProvider::new([ScriptStep::tool_call("ghost", json!({}))]));
    let agent = build_agent(Arc::clone(&provider), RetryLimits::default());
    let mut dialog = start(&agent, task_prompt(), json!({"task": "demo"}));

    let err = agent.call(&mut dialog).await.unwrap_err();
    assert!(matches!(err, AgentError::UnknownFunction { ref function, .. } if function == "ghost"));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_use_the_recall_budget() {
    let provider = Arc::new(ScriptedProvider::new([
        ScriptStep::Fail(ProviderError::Network("connection reset".into())),
        ScriptStep::text("back online"),
    ]));
    let limits = RetryLimits {
        max_llm_recall: 1,
        ..RetryLimits::default()
    };
    let agent = build_agent(Arc::clone(&provider), limits);
    let mut dialog = start(&agent, task_prompt(), json!({"task": "demo"}));

    let result = agent.call(&mut dialog).await.unwrap();
    assert_eq!(result.response.content, "back online");
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_propagates_unchanged_without_budget() {
    let provider = Arc::new(ScriptedProvider::new([
        ScriptStep::Fail(ProviderError::Timeout("30s".into())),
        ScriptStep::text("never reached"),
    ]));
    let agent = build_agent(Arc::clone(&provider), RetryLimits::default());
    let mut dialog = start(&agent, task_prompt(), json!({"task": "demo"}));

    let err = agent.call(&mut dialog).await.unwrap_err();
    assert!(matches!(err, AgentError::Provider(ProviderError::Timeout(_))));
    assert_eq!(err.to_string(), "Request timed out: 30s");
    assert_eq!(provider.call_count(), 1);
    assert_eq!(dialog.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn rate_limits_back_off_without_a_budget() {
    let limited = || ScriptStep::Fail(ProviderError::RateLimited { retry_after_secs: 5 });
    let provider = Arc::new(ScriptedProvider::new([
        limited(),
        limited(),
        limited(),
        limited(),
        ScriptStep::text("finally"),
    ]));
    let agent = build_agent(Arc::clone(&provider), RetryLimits::default());
    let mut dialog = start(&agent, task_prompt(), json!({"task": "demo"}));

    let started = tokio::time::Instant::now();
    let result = agent.call(&mut dialog).await.unwrap();

    assert_eq!(result.response.content, "finally");
    assert_eq!(provider.call_count(), 5);
    assert!(started.elapsed() >= std::time::Duration::from_secs(4));
}

#[tokio::test]
async fn call_options_override_model_args() {
    let provider = Arc::new(ScriptedProvider::texts(["ok"]));
    let log: Arc<dyn LogBase> = Arc::new(InMemoryLog::new());
    let agent = Agent::builder("tester", system_prompt(), "gpt-4.1", Arc::clone(&provider) as Arc<dyn Provider>, log)
        .model_args(args(json!({"temperature": 0.2, "max_completion_tokens": 50})))
        .build()
        .unwrap();
    let mut dialog = start(&agent, task_prompt(), json!({"task": "demo"}));

    let options = lllm_agent::CallOptions {
        args: args(json!({"temperature": 0.9})),
        extra: args(json!({"frontend": "cli"})),
        ..Default::default()
    };
    let result = agent.call_with(&mut dialog, &options).await.unwrap();

    let call = &provider.calls()[0];
    assert_eq!(call.model_args["temperature"], json!(0.9));
    assert_eq!(call.model_args["max_completion_tokens"], json!(50));
    assert_eq!(result.response.extra["frontend"], json!("cli"));
}

#[test]
fn forks_do_not_alias_the_original() {
    let mut dialog = Dialog::new(Arc::new(InMemoryLog::new()), "s", None);
    dialog.send_text("hello", Role::User, "user");

    let mut fork = dialog.fork();
    fork.send_text("only in the fork", Role::User, "user");
    dialog.send_text("only in the original", Role::User, "user");

    assert_eq!(fork.len(), 2);
    assert_eq!(dialog.len(), 2);
    assert_eq!(fork.tail().unwrap().content, "only in the fork");
    assert_eq!(dialog.tail().unwrap().content, "only in the original");
    assert_eq!(fork.parent(), Some(dialog.id()));
}

#[test]
fn function_call_equality_ignores_key_order_only() {
    let base = FunctionCall::new("1", "f", args(json!({"a": 1, "b": 2})));
    assert!(base.equals(&FunctionCall::new("2", "f", args(json!({"b": 2, "a": 1})))));
    assert!(!base.equals(&FunctionCall::new("3", "f", args(json!({"a": 1, "b": 3})))));
    assert!(!base.equals(&FunctionCall::new("4", "f", args(json!({"a": 1})))));
    assert!(!base.equals(&FunctionCall::new("5", "f", args(json!({"a": 1, "b": 2, "c": 3})))));
    assert!(!base.equals(&FunctionCall::new("6", "g", args(json!({"a": 1, "b": 2})))));
    // no coercion between strings and numbers
    assert!(!base.equals(&FunctionCall::new("7", "f", args(json!({"a": "1", "b": 2})))));
}
