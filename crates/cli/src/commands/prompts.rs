//! `lllm prompts`: List the prompts a project defines.

use std::path::Path;

use lllm_core::registry::PromptRegistry;

pub fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let registry = super::load_prompts(&config)?;

    if registry.is_empty() {
        println!("No prompts found. Add folders under [prompts] in lllm.toml.");
        return Ok(());
    }
    for line in describe(&registry) {
        println!("{line}");
    }
    Ok(())
}

/// One line per prompt, sorted by path.
pub fn describe(registry: &PromptRegistry) -> Vec<String> {
    let mut paths = registry.paths();
    paths.sort_unstable();
    paths
        .into_iter()
        .filter_map(|path| registry.get(path).ok())
        .map(|prompt| {
            let functions: Vec<&str> = prompt.functions().iter().map(|f| f.name.as_str()).collect();
            if functions.is_empty() {
                prompt.path.clone()
            } else {
                format!("{}  [functions: {}]", prompt.path, functions.join(", "))
            }
        })
        .collect()
}
