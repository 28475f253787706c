//! Configuration loading, validation, and management for LLLM.
//!
//! Configuration lives in an `lllm.toml` found by [`find_config_file`], with
//! environment variable overrides. All settings are validated at load time.

pub mod prompts;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use lllm_core::model_card::{ModelCard, ModelCatalog};
use lllm_log::LogType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use prompts::{PromptDef, load_prompt_file, load_prompt_folders};

/// Env var pointing at a config file or a directory containing `lllm.toml`.
pub const CONFIG_ENV: &str = "LLLM_CONFIG";

/// File names tried in each directory, in order.
pub const CONFIG_FILENAMES: &[&str] = &["lllm.toml", ".lllm.toml", "LLLM.toml"];

/// Subdirectories searched in each directory besides the directory itself.
const CONFIG_SUBDIRS: &[&str] = &["", "template"];

/// Upper bound accepted for any retry budget.
const MAX_RETRY_LIMIT: u32 = 100;

/// Upper bound accepted for `max_interrupt_times`.
const MAX_INTERRUPT_LIMIT: u32 = 10_000;

/// The root configuration structure. Maps directly to `lllm.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct LllmConfig {
    /// Project name; the default log directory is `<log_dir>/<name>_default`
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub log_type: LogType,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Retries of one turn after a response fails the prompt's contract
    #[serde(default = "default_max_exception_retry")]
    pub max_exception_retry: u32,

    /// Tool-call rounds before a final answer is forced (0 = effectively unbounded)
    #[serde(default = "default_max_interrupt_times")]
    pub max_interrupt_times: u32,

    /// Retries of transient provider failures
    #[serde(default)]
    pub max_llm_recall: u32,

    /// Provider used by agents
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key shared by all providers unless overridden per provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub prompts: PromptsConfig,

    /// Agent definitions keyed by agent name
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,

    /// Custom model cards added to the built-in catalog
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ModelCard>,

    /// The file this config was loaded from, if any
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

fn default_name() -> String {
    "lllm".into()
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_max_exception_retry() -> u32 {
    3
}
fn default_max_interrupt_times() -> u32 {
    5
}
fn default_provider() -> String {
    "openai".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for LllmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LllmConfig")
            .field("name", &self.name)
            .field("log_type", &self.log_type)
            .field("log_dir", &self.log_dir)
            .field("max_exception_retry", &self.max_exception_retry)
            .field("max_interrupt_times", &self.max_interrupt_times)
            .field("max_llm_recall", &self.max_llm_recall)
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("providers", &self.providers)
            .field("prompts", &self.prompts)
            .field("agents", &self.agents)
            .field("models", &self.models.iter().map(|m| &m.name).collect::<Vec<_>>())
            .field("config_path", &self.config_path)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Folders of prompt TOML files, relative to the config file
    #[serde(default)]
    pub folders: Vec<PathBuf>,
}

/// One `[agents.<name>]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model card name or snapshot name
    pub model_name: String,

    /// Registry path of the agent's system prompt
    pub system_prompt_path: String,

    /// Remaining keys are model arguments (temperature, max_completion_tokens, ...)
    #[serde(flatten)]
    pub model_args: Map<String, Value>,
}

impl LllmConfig {
    /// Discover and load configuration, then apply environment overrides.
    ///
    /// Environment variables:
    /// - `LLLM_CONFIG`: config file or directory (skips the directory search)
    /// - `LLLM_API_KEY`, then `OPENAI_API_KEY`: API key when none is configured
    /// - `LLLM_PROVIDER`: overrides `provider`
    /// - `LLLM_LOG_DIR`: overrides `log_dir`
    pub fn load(start: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var(CONFIG_ENV).ok();
        let cwd = std::env::current_dir().ok();
        let mut config = match find_config_file_from(env_path.as_deref(), start, cwd.as_deref()) {
            Some(path) => Self::load_from(&path)?,
            None => {
                tracing::info!("No lllm.toml found, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.config_path = Some(path.to_path_buf());

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = var("LLLM_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        }
        if let Some(provider) = var("LLLM_PROVIDER") {
            self.provider = provider;
        }
        if let Some(dir) = var("LLLM_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError("name must not be empty".into()));
        }
        if self.max_exception_retry > MAX_RETRY_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "max_exception_retry must be at most {MAX_RETRY_LIMIT}"
            )));
        }
        if self.max_llm_recall > MAX_RETRY_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "max_llm_recall must be at most {MAX_RETRY_LIMIT}"
            )));
        }
        if self.max_interrupt_times > MAX_INTERRUPT_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "max_interrupt_times must be at most {MAX_INTERRUPT_LIMIT} (0 means unbounded)"
            )));
        }
        for (name, agent) in &self.agents {
            if agent.model_name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "agents.{name}.model_name must not be empty"
                )));
            }
            if agent.system_prompt_path.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "agents.{name}.system_prompt_path must not be empty"
                )));
            }
        }
        for card in &self.models {
            card.validate()
                .map_err(|e| ConfigError::ValidationError(format!("models.{}: {e}", card.name)))?;
        }
        Ok(())
    }

    /// Directory relative paths in the config are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        self.config_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve a config-relative path.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    /// Log directory resolved against the config file.
    pub fn resolved_log_dir(&self) -> PathBuf {
        self.resolve(&self.log_dir)
    }

    /// Base name of the default log: `<name>_default`.
    pub fn log_base_name(&self) -> String {
        format!("{}_default", self.name)
    }

    /// API key for `provider`: the provider table first, then the shared key.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Built-in model cards plus the `[[models]]` entries of this config.
    pub fn model_catalog(&self) -> ModelCatalog {
        let mut catalog = ModelCatalog::with_defaults();
        for card in &self.models {
            catalog.register(card.clone());
        }
        catalog
    }

    /// Serialize back to TOML (for `lllm create`).
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        Self::default().to_toml().unwrap_or_default()
    }
}

impl Default for LllmConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_type: LogType::default(),
            log_dir: default_log_dir(),
            max_exception_retry: default_max_exception_retry(),
            max_interrupt_times: default_max_interrupt_times(),
            max_llm_recall: 0,
            provider: default_provider(),
            api_key: None,
            providers: HashMap::new(),
            prompts: PromptsConfig::default(),
            agents: BTreeMap::new(),
            models: Vec::new(),
            config_path: None,
        }
    }
}

/// Locate the nearest config file.
///
/// Checks, in order:
/// 1. the `LLLM_CONFIG` environment variable (file or directory)
/// 2. `start` and its parents
/// 3. the current working directory and its parents
///
/// In each directory the names in [`CONFIG_FILENAMES`] are tried, both in the
/// directory itself and in its `template/` subdirectory.
pub fn find_config_file(start: Option<&Path>) -> Option<PathBuf> {
    let env_path = std::env::var(CONFIG_ENV).ok();
    let cwd = std::env::current_dir().ok();
    find_config_file_from(env_path.as_deref(), start, cwd.as_deref())
}

fn find_config_file_from(env_path: Option<&str>, start: Option<&Path>, cwd: Option<&Path>) -> Option<PathBuf> {
    if let Some(found) = env_path.filter(|p| !p.is_empty()).and_then(|p| resolve_candidate(Path::new(p))) {
        return Some(found);
    }
    for root in [start, cwd].into_iter().flatten() {
        for dir in root.ancestors() {
            for subdir in CONFIG_SUBDIRS {
                let base = if subdir.is_empty() { dir.to_path_buf() } else { dir.join(subdir) };
                for name in CONFIG_FILENAMES {
                    let candidate = base.join(name);
                    if candidate.is_file() {
                        return Some(candidate);
                    }
                }
            }
        }
    }
    None
}

fn resolve_candidate(path: &Path) -> Option<PathBuf> {
    let candidate = if path.is_dir() { path.join("lllm.toml") } else { path.to_path_buf() };
    candidate.is_file().then_some(candidate)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid prompt in {path}: {reason}")]
    PromptError { path: PathBuf, reason: String },
}
