//! Provider registry: a builder map from provider name to constructor.
//!
//! Providers are resolved once at startup. Applications add their own
//! backends with [`ProviderRegistry::register`]; the defaults cover OpenAI
//! and the common OpenAI-compatible endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use lllm_config::LllmConfig;
use lllm_core::error::ProviderError;
use lllm_core::model_card::ModelCatalog;
use lllm_core::provider::Provider;

use crate::openai_compat::OpenAiCompatProvider;

/// Everything a builder gets to construct a provider.
#[derive(Clone)]
pub struct ProviderSettings {
    pub name: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub catalog: Arc<ModelCatalog>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("name", &self.name)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: None,
            base_url: None,
            timeout_secs: None,
            catalog: Arc::new(ModelCatalog::with_defaults()),
        }
    }

    /// Settings for `name` taken from the config's provider table.
    pub fn from_config(config: &LllmConfig, name: &str) -> Self {
        let table = config.providers.get(name);
        Self {
            name: name.to_string(),
            api_key: config.api_key_for(name),
            base_url: table.and_then(|p| p.api_url.clone()),
            timeout_secs: table.and_then(|p| p.timeout_secs),
            catalog: Arc::new(config.model_catalog()),
        }
    }
}

/// Constructs a provider from its settings.
pub type ProviderBuilder = Arc<dyn Fn(&ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync>;

/// Name → builder map.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    builders: BTreeMap<String, ProviderBuilder>,
}

impl ProviderRegistry {
    /// A registry with no builders.
    pub fn new() -> Self {
        Self::default()
    }

    /// OpenAI plus the well-known OpenAI-compatible endpoints.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("openai", Arc::new(build_openai));
        for name in ["openrouter", "together", "deepseek", "groq", "fireworks"] {
            registry.register(name, Arc::new(build_compatible_with_key));
        }
        for name in ["ollama", "vllm", "llamacpp"] {
            registry.register(name, Arc::new(build_compatible_keyless));
        }
        registry
    }

    /// Register (or replace) the builder for `name`.
    pub fn register(&mut self, name: impl Into<String>, builder: ProviderBuilder) {
        self.builders.insert(name.into(), builder);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }

    /// Build the provider named in `settings`.
    pub fn build(&self, settings: &ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> {
        let builder = self.builders.get(&settings.name).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider '{}'. Registered: {}",
                settings.name,
                self.names().join(", ")
            ))
        })?;
        let provider = builder(settings)?;
        tracing::debug!(provider = %settings.name, "Provider built");
        Ok(provider)
    }

    /// Build the config's active provider.
    pub fn build_from_config(&self, config: &LllmConfig) -> Result<Arc<dyn Provider>, ProviderError> {
        self.build(&ProviderSettings::from_config(config, &config.provider))
    }
}

fn build_openai(settings: &ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = require_key(settings)?;
    let base_url = settings
        .base_url
        .clone()
        .unwrap_or_else(|| default_base_url("openai"));
    let provider = OpenAiCompatProvider::new("openai", base_url, api_key)
        .with_system_role("developer")
        .with_catalog(Arc::clone(&settings.catalog));
    Ok(Arc::new(with_timeout(provider, settings)))
}

fn build_compatible_with_key(settings: &ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = require_key(settings)?;
    Ok(Arc::new(compatible(settings, api_key)))
}

fn build_compatible_keyless(settings: &ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = settings.api_key.clone().unwrap_or_else(|| settings.name.clone());
    Ok(Arc::new(compatible(settings, api_key)))
}

fn compatible(settings: &ProviderSettings, api_key: String) -> OpenAiCompatProvider {
    let base_url = settings
        .base_url
        .clone()
        .unwrap_or_else(|| default_base_url(&settings.name));
    let provider = OpenAiCompatProvider::new(&settings.name, base_url, api_key)
        .with_catalog(Arc::clone(&settings.catalog));
    with_timeout(provider, settings)
}

fn with_timeout(provider: OpenAiCompatProvider, settings: &ProviderSettings) -> OpenAiCompatProvider {
    match settings.timeout_secs {
        Some(secs) => provider.with_timeout(secs),
        None => provider,
    }
}

fn require_key(settings: &ProviderSettings) -> Result<String, ProviderError> {
    settings.api_key.clone().filter(|k| !k.is_empty()).ok_or_else(|| {
        ProviderError::NotConfigured(format!(
            "No API key for provider '{}' (set [providers.{}] api_key, LLLM_API_KEY or OPENAI_API_KEY)",
            settings.name, settings.name
        ))
    })
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
