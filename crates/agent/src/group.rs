//! Agents built from the `[agents.*]` tables of the configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use lllm_config::LllmConfig;
use lllm_core::log::LogBase;
use lllm_core::provider::Provider;
use lllm_core::registry::PromptRegistry;
use lllm_providers::ProviderRegistry;
use tracing::info;

use crate::agent::Agent;
use crate::error::AgentError;
use crate::policy::RetryLimits;

/// Named agents sharing one provider and one log base.
pub struct AgentGroup {
    agents: BTreeMap<String, Agent>,
    log_base: Arc<dyn LogBase>,
}

impl AgentGroup {
    /// Build every configured agent against an existing provider and log base.
    pub fn from_parts(
        config: &LllmConfig,
        prompts: &PromptRegistry,
        provider: Arc<dyn Provider>,
        log_base: Arc<dyn LogBase>,
    ) -> Result<Self, AgentError> {
        let catalog = config.model_catalog();
        let limits = RetryLimits::from_config(config);
        let mut agents = BTreeMap::new();

        for (name, agent_config) in &config.agents {
            let system_prompt = prompts.get(&agent_config.system_prompt_path)?;
            let agent = Agent::builder(
                name.clone(),
                system_prompt,
                agent_config.model_name.clone(),
                Arc::clone(&provider),
                Arc::clone(&log_base),
            )
            .model_args(agent_config.model_args.clone())
            .catalog(catalog.clone())
            .limits(limits)
            .build()?;
            agents.insert(name.clone(), agent);
        }

        info!(agents = agents.len(), provider = provider.name(), "Agents ready");
        Ok(Self { agents, log_base })
    }

    /// Build the log base and provider from `config`, then every agent.
    pub fn from_config(
        config: &LllmConfig,
        prompts: &PromptRegistry,
        providers: &ProviderRegistry,
    ) -> Result<Self, AgentError> {
        let log_base = lllm_log::build_log_base(config.log_type, &config.resolved_log_dir(), &config.log_base_name())?;
        let provider = providers.build_from_config(config)?;
        Self::from_parts(config, prompts, provider, log_base)
    }

    pub fn get(&self, name: &str) -> Option<&Agent> {
        self.agents.get(name)
    }

    /// Like [`get`](Self::get), failing for undefined names.
    pub fn agent(&self, name: &str) -> Result<&Agent, AgentError> {
        self.agents.get(name).ok_or_else(|| AgentError::UnknownAgent(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn log_base(&self) -> &Arc<dyn LogBase> {
        &self.log_base
    }
}
