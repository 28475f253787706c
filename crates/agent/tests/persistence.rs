//! What a call leaves in a file-backed log.

use std::sync::Arc;

use lllm_agent::{Agent, RetryLimits};
use lllm_core::log::LogBase;
use lllm_core::parser::TagParser;
use lllm_core::prompt::Prompt;
use lllm_core::provider::Provider;
use lllm_log::{ActivityKind, LocalFileLog, ReplaySession};
use lllm_providers::ScriptedProvider;
use serde_json::{Map, Value, json};

#[tokio::test]
async fn accepted_messages_are_logged_once_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let log: Arc<dyn LogBase> = Arc::new(LocalFileLog::new(tmp.path(), "agents").unwrap());
    let provider = Arc::new(ScriptedProvider::texts(["no tags here", "<answer>7</answer>"]));
    let agent = Agent::builder(
        "tester",
        Arc::new(Prompt::new("t/system", "You are a tester.")),
        "gpt-4.1",
        Arc::clone(&provider) as Arc<dyn Provider>,
        Arc::clone(&log),
    )
    .limits(RetryLimits::default())
    .build()
    .unwrap();

    let task = Prompt::new("t/task", "User task: {task}").with_tags(TagParser {
        xml_tags: vec!["answer".into()],
        ..TagParser::default()
    });
    let mut dialog = agent.init_dialog(&Map::new(), Some("run-1")).unwrap();
    let task_args: Map<String, Value> = json!({"task": "count"}).as_object().cloned().unwrap();
    agent.send_message(&mut dialog, Arc::new(task), &task_args).unwrap();
    agent.call(&mut dialog).await.unwrap();

    let replay = ReplaySession::load(log.as_ref(), "run-1").unwrap();
    let canonical: Vec<&str> = replay.messages[dialog.id()].iter().map(|r| r.value.as_str()).collect();
    assert_eq!(canonical, vec!["You are a tester.", "User task: count", "<answer>7</answer>"]);

    // the retry happened on a fork, logged under its own dialog
    let forks: Vec<&str> = replay
        .dialogs
        .iter()
        .map(|d| d.value.as_str())
        .filter(|id| replay.parent_of(id) == Some(dialog.id()))
        .collect();
    assert_eq!(forks.len(), 1);
    let fork_values: Vec<&str> = replay.messages[forks[0]].iter().map(|r| r.value.as_str()).collect();
    assert_eq!(fork_values.len(), 2);
    assert_eq!(fork_values[0], "no tags here");
    assert!(fork_values[1].contains("No answer tags found"));

    assert!(replay.activities().iter().all(|a| matches!(a.kind, ActivityKind::Message { .. })));
}
