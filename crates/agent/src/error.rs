//! Errors surfaced to callers of the agent.

use std::collections::BTreeMap;

use lllm_core::error::{FunctionError, LogError, ModelError, PromptError, ProviderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Responses kept failing the prompt's output contract after every retry.
    #[error("Agent '{agent}' could not produce a valid response: {message}")]
    Semantic { agent: String, message: String },

    /// The classification answer was not a single token covering every class.
    #[error("{message}")]
    Classification {
        message: String,
        top_probs: BTreeMap<String, f64>,
    },

    /// Provider failure, propagated unchanged once the recall budget is spent.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Prompt '{prompt}' has no function named '{function}'")]
    UnknownFunction { prompt: String, function: String },

    #[error("Function error: {0}")]
    Function(#[from] FunctionError),

    #[error("Dialog has no active prompt; send a message before calling the agent")]
    NoActivePrompt,

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error("Agent '{0}' is not defined")]
    UnknownAgent(String),

    /// The model still requested tools after the final-answer prompt.
    #[error("No final response after {rounds} rounds")]
    InterruptBudgetExhausted { rounds: usize },
}

impl AgentError {
    pub fn is_semantic(&self) -> bool {
        matches!(self, Self::Semantic { .. })
    }

    pub fn is_classification(&self) -> bool {
        matches!(self, Self::Classification { .. })
    }
}
