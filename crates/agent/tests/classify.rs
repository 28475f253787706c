//! Single-token classification through `Agent::classify`.

use std::sync::Arc;

use lllm_agent::{Agent, AgentError, RetryLimits};
use lllm_core::error::ModelError;
use lllm_core::log::{InMemoryLog, LogBase};
use lllm_core::message::{Message, TokenLogprob, TopLogprob};
use lllm_core::model_card::Tokenizer;
use lllm_core::prompt::Prompt;
use lllm_core::provider::Provider;
use lllm_providers::{ScriptStep, ScriptedProvider};
use serde_json::{Map, json};

/// One token per whitespace-separated word.
struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, ModelError> {
        Ok(text
            .split_whitespace()
            .map(|w| w.bytes().map(u32::from).sum())
            .collect())
    }
}

fn classes() -> Vec<String> {
    vec!["yes".to_string(), "no".to_string()]
}

fn answer(token: &str, alternatives: &[(&str, f64)]) -> ScriptStep {
    let mut message = Message::assistant(token, "model");
    message.logprobs = vec![TokenLogprob {
        token: token.to_string(),
        logprob: alternatives.first().map(|a| a.1).unwrap_or(0.0),
        top_logprobs: alternatives
            .iter()
            .map(|(t, lp)| TopLogprob {
                token: t.to_string(),
                logprob: *lp,
            })
            .collect(),
    }];
    ScriptStep::Message(message)
}

fn setup(steps: Vec<ScriptStep>, limits: RetryLimits) -> (Agent, Arc<ScriptedProvider>) {
    let provider = Arc::new(ScriptedProvider::new(steps));
    let log: Arc<dyn LogBase> = Arc::new(InMemoryLog::new());
    let agent = Agent::builder(
        "judge",
        Arc::new(Prompt::new("judge/system", "Judge the claim.")),
        "gpt-4.1",
        Arc::clone(&provider) as Arc<dyn Provider>,
        log,
    )
    .limits(limits)
    .build()
    .unwrap();
    (agent, provider)
}

#[tokio::test]
async fn reads_class_probabilities() {
    let (agent, provider) = setup(
        vec![answer("yes", &[("yes", -0.1), ("no", -2.5)])],
        RetryLimits::default(),
    );
    let mut dialog = agent.init_dialog(&Map::new(), Some("s")).unwrap();

    let result = agent
        .classify(&mut dialog, &classes(), &WordTokenizer, None, 10)
        .await
        .unwrap();

    assert!((result.top_probs["yes"] - (-0.1f64).exp()).abs() < 1e-9);
    assert_eq!(result.best(&classes()), Some("yes"));

    let call = &provider.calls()[0];
    assert_eq!(call.model_args["max_completion_tokens"], json!(1));
    assert_eq!(call.model_args["logit_bias"].as_object().unwrap().len(), 2);
    assert_eq!(
        call.last_content.as_deref(),
        Some("Please respond with one and only one word from \"yes\" or \"no\".")
    );

    // system, classifier question, answer
    assert_eq!(dialog.len(), 3);
    assert_eq!(dialog.tail().unwrap().content, "yes");
}

#[tokio::test]
async fn missing_class_is_retried_with_a_reminder() {
    let (agent, provider) = setup(
        vec![
            answer("maybe", &[("maybe", -0.2), ("yes", -1.0)]),
            answer("no", &[("no", -0.3), ("yes", -1.4)]),
        ],
        RetryLimits::default(),
    );
    let mut dialog = agent.init_dialog(&Map::new(), Some("s")).unwrap();

    let result = agent
        .classify(&mut dialog, &classes(), &WordTokenizer, Some("Is the claim true?"), 10)
        .await
        .unwrap();

    assert_eq!(result.best(&classes()), Some("no"));
    assert_eq!(provider.call_count(), 2);
    assert!(provider.calls()[1]
        .last_content
        .as_deref()
        .unwrap()
        .starts_with("Please respond with one and only one word from"));

    // the rejected answer stays on the fork
    assert_eq!(dialog.len(), 3);
    assert_eq!(dialog.messages()[1].content, "Is the claim true?");
}

#[tokio::test]
async fn classification_errors_exhaust_the_exception_budget() {
    let (agent, provider) = setup(
        vec![
            answer("maybe", &[("maybe", -0.2)]),
            answer("maybe", &[("maybe", -0.2)]),
        ],
        RetryLimits {
            max_exception_retry: 1,
            ..RetryLimits::default()
        },
    );
    let mut dialog = agent.init_dialog(&Map::new(), Some("s")).unwrap();

    let err = agent
        .classify(&mut dialog, &classes(), &WordTokenizer, None, 10)
        .await
        .unwrap_err();

    assert!(err.is_classification());
    assert!(err.to_string().contains("Token yes not found in the top logprobs"));
    match err {
        AgentError::Classification { top_probs, .. } => assert!(top_probs.contains_key("maybe")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn multi_token_classes_are_rejected_up_front() {
    let (agent, provider) = setup(vec![], RetryLimits::default());
    let mut dialog = agent.init_dialog(&Map::new(), Some("s")).unwrap();

    struct Splitter;
    impl Tokenizer for Splitter {
        fn encode(&self, text: &str) -> Result<Vec<u32>, ModelError> {
            Ok(text.bytes().map(u32::from).collect())
        }
    }

    let err = agent
        .classify(&mut dialog, &classes(), &Splitter, None, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Model(ModelError::MultiTokenClasses(_))));
    assert_eq!(provider.call_count(), 0);
}
