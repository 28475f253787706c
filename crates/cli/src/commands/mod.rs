pub mod ask;
pub mod create;
pub mod prompts;
pub mod providers;
pub mod replay;

use std::path::Path;

use lllm_config::{ConfigError, LllmConfig};
use lllm_core::registry::PromptRegistry;

/// Load the config named on the command line, or discover one.
pub fn load_config(path: Option<&Path>) -> Result<LllmConfig, ConfigError> {
    match path {
        Some(dir) if dir.is_dir() => LllmConfig::load(Some(dir)),
        Some(file) => {
            let mut config = LllmConfig::load_from(file)?;
            config.apply_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            Ok(config)
        }
        None => LllmConfig::load(None),
    }
}

/// Every prompt in the config's prompt folders.
pub fn load_prompts(config: &LllmConfig) -> Result<PromptRegistry, ConfigError> {
    let mut registry = PromptRegistry::new();
    let count = lllm_config::load_prompt_folders(config, &mut registry)?;
    tracing::debug!(count, "Prompts loaded");
    Ok(registry)
}
