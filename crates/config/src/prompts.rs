//! Prompt files: `[[prompts]]` tables loaded into a [`PromptRegistry`].
//!
//! ```toml
//! [[prompts]]
//! path = "system"                 # registered as "<file stem>/system"
//! prompt = "You are {role}."
//! xml_tags = ["answer"]
//! required_xml_tags = ["answer"]
//!
//! [[prompts.functions]]
//! name = "search"
//! description = "Search the corpus"
//! required = ["query"]
//! properties = { query = { type = "string" } }
//! ```
//!
//! Files whose name starts with `_` are skipped. Handlers are linked in code
//! afterwards through [`PromptRegistry::link_function`].

use std::path::{Path, PathBuf};

use lllm_core::function::Function;
use lllm_core::parser::TagParser;
use lllm_core::prompt::Prompt;
use lllm_core::registry::PromptRegistry;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{ConfigError, LllmConfig};

#[derive(Debug, Default, Deserialize)]
struct PromptFile {
    #[serde(default)]
    prompts: Vec<PromptDef>,
}

/// One `[[prompts]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptDef {
    pub path: String,

    pub prompt: String,

    #[serde(flatten)]
    pub tags: TagParser,

    #[serde(default)]
    pub exception_prompt: Option<String>,

    #[serde(default)]
    pub interrupt_prompt: Option<String>,

    #[serde(default)]
    pub interrupt_final_prompt: Option<String>,

    /// JSON schema requested as structured output
    #[serde(default)]
    pub format: Option<Value>,

    #[serde(default)]
    pub functions: Vec<Function>,
}

impl PromptDef {
    /// Build the prompt. A path without `/` is prefixed with `namespace`.
    pub fn into_prompt(self, namespace: &str) -> Prompt {
        let path = if self.path.contains('/') || namespace.is_empty() {
            self.path
        } else {
            format!("{namespace}/{}", self.path)
        };
        let mut prompt = Prompt::new(path, self.prompt).with_tags(self.tags);
        if let Some(template) = self.exception_prompt {
            prompt = prompt.with_exception_prompt(template);
        }
        if let Some(template) = self.interrupt_prompt {
            prompt = prompt.with_interrupt_prompt(template);
        }
        if let Some(template) = self.interrupt_final_prompt {
            prompt.interrupt_final_prompt = template;
        }
        if let Some(schema) = self.format {
            prompt = prompt.with_format(schema);
        }
        for function in self.functions {
            prompt = prompt.with_function(function);
        }
        prompt
    }
}

/// Register every prompt of one file. Returns the number registered.
pub fn load_prompt_file(path: &Path, registry: &mut PromptRegistry) -> Result<usize, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let file: PromptFile = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let namespace = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let count = file.prompts.len();
    for def in file.prompts {
        registry
            .register(def.into_prompt(namespace))
            .map_err(|e| ConfigError::PromptError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
    }
    debug!(path = %path.display(), count, "Loaded prompt file");
    Ok(count)
}

/// Load every prompt file under the configured `[prompts] folders`.
///
/// Folders are resolved against the config file's directory and walked
/// recursively in sorted order. Missing folders are skipped with a warning.
pub fn load_prompt_folders(config: &LllmConfig, registry: &mut PromptRegistry) -> Result<usize, ConfigError> {
    let mut total = 0;
    for folder in &config.prompts.folders {
        let folder = config.resolve(folder);
        if !folder.is_dir() {
            warn!(path = %folder.display(), "Prompt folder not found, skipping");
            continue;
        }
        for file in prompt_files(&folder)? {
            total += load_prompt_file(&file, registry)?;
        }
    }
    Ok(total)
}

fn prompt_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::ReadError {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut paths: Vec<PathBuf> = entries.filter_map(|entry| entry.ok().map(|e| e.path())).collect();
    paths.sort();

    let mut files = Vec::new();
    for path in paths {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('_'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            files.extend(prompt_files(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            files.push(path);
        }
    }
    Ok(files)
}
