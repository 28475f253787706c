//! `lllm providers`: List the provider names that can be configured.

use lllm_providers::ProviderRegistry;

pub fn run() {
    let registry = ProviderRegistry::with_defaults();
    println!("Providers (set `provider = \"<name>\"` in lllm.toml):");
    for name in registry.names() {
        println!("  {name}");
    }
    println!();
    println!("Environment: LLLM_API_KEY or OPENAI_API_KEY, LLLM_PROVIDER, LLLM_LOG_DIR");
}
