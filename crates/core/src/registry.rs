//! Prompt registry: an explicit, owned map from prompt path to prompt.
//!
//! Applications build one registry at startup (usually from prompt files via
//! `lllm-config`), link function handlers, then hand it to agents. Nothing
//! here is global; dropping the registry drops every prompt it owns.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::PromptError;
use crate::function::FunctionHandler;
use crate::prompt::Prompt;

#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    prompts: BTreeMap<String, Arc<Prompt>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a prompt. Paths are unique.
    pub fn register(&mut self, prompt: Prompt) -> Result<Arc<Prompt>, PromptError> {
        prompt.validate()?;
        if self.prompts.contains_key(&prompt.path) {
            return Err(PromptError::Duplicate(prompt.path));
        }
        let prompt = Arc::new(prompt);
        self.prompts.insert(prompt.path.clone(), Arc::clone(&prompt));
        Ok(prompt)
    }

    pub fn get(&self, path: &str) -> Result<Arc<Prompt>, PromptError> {
        self.prompts
            .get(path)
            .cloned()
            .ok_or_else(|| PromptError::NotFound {
                path: path.to_string(),
                registered: self.paths().into_iter().map(String::from).collect(),
            })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.prompts.contains_key(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<Arc<Prompt>> {
        self.prompts.remove(path)
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        self.prompts.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Prompt>> {
        self.prompts.values()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Link a handler to a function declared on a registered prompt.
    ///
    /// Copies already handed out keep their previous state, so link before
    /// building agents.
    pub fn link_function(
        &mut self,
        path: &str,
        function: &str,
        handler: Arc<dyn FunctionHandler>,
    ) -> Result<(), PromptError> {
        let registered: Vec<String> = self.prompts.keys().cloned().collect();
        let prompt = self
            .prompts
            .get_mut(path)
            .ok_or_else(|| PromptError::NotFound { path: path.to_string(), registered })?;
        Arc::make_mut(prompt).link_function(function, handler)
    }

    /// Link `handler` to every registered prompt declaring `function`.
    /// Returns how many prompts were linked.
    pub fn link_everywhere(&mut self, function: &str, handler: Arc<dyn FunctionHandler>) -> usize {
        let mut linked = 0;
        for prompt in self.prompts.values_mut() {
            if prompt.function(function).is_some()
                && Arc::make_mut(prompt)
                    .link_function(function, Arc::clone(&handler))
                    .is_ok()
            {
                linked += 1;
            }
        }
        linked
    }

    /// A view that resolves names relative to `root`.
    pub fn scoped<'a>(&'a self, root: &str) -> ScopedPrompts<'a> {
        ScopedPrompts {
            registry: self,
            root: root.trim_end_matches('/').to_string(),
        }
    }
}

/// Lookups under a namespace, e.g. `scoped("analyst").get("system")` → `analyst/system`.
#[derive(Debug, Clone)]
pub struct ScopedPrompts<'a> {
    registry: &'a PromptRegistry,
    root: String,
}

impl ScopedPrompts<'_> {
    pub fn get(&self, name: &str) -> Result<Arc<Prompt>, PromptError> {
        self.registry.get(&format!("{}/{}", self.root, name))
    }

    /// Names (without the root) registered under this namespace.
    pub fn names(&self) -> Vec<&str> {
        let prefix = format!("{}/", self.root);
        self.registry
            .prompts
            .keys()
            .filter_map(|p| p.strip_prefix(prefix.as_str()))
            .collect()
    }
}
