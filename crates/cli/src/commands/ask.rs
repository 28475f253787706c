//! `lllm ask`: Run one agent call against a prompt.

use std::path::Path;

use lllm_agent::AgentGroup;
use lllm_providers::ProviderRegistry;
use serde_json::{Map, Value};

pub async fn run(
    config_path: Option<&Path>,
    agent_name: &str,
    prompt_path: &str,
    args: Vec<(String, Value)>,
    session: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let prompts = super::load_prompts(&config)?;
    let group = AgentGroup::from_config(&config, &prompts, &ProviderRegistry::with_defaults())?;
    let agent = group.agent(agent_name)?;
    let prompt = prompts.get(prompt_path)?;

    let prompt_args: Map<String, Value> = args.into_iter().collect();
    let mut dialog = agent.init_dialog(&prompt_args, session)?;
    agent.send_message(&mut dialog, prompt, &prompt_args)?;

    eprint!("  Thinking...");
    let result = agent.call(&mut dialog).await;
    eprint!("\r              \r");
    let result = result?;

    println!("{}", result.response.content);
    let cost = dialog.cost(&config.model_catalog());
    eprintln!();
    eprintln!("  Session:    {}", dialog.session_name());
    eprintln!("  Model:      {}", agent.model());
    eprintln!("  Functions:  {} call(s)", result.interrupts.len());
    eprintln!(
        "  Tokens:     {} in / {} out (${:.6})",
        cost.prompt_tokens, cost.completion_tokens, cost.cost
    );
    Ok(())
}

/// Parse `key=value`; the value is JSON when it parses as JSON, else a string.
pub fn parse_arg(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
