//! # LLLM Core
//!
//! Domain types, traits, and error definitions for the LLLM agent framework.
//! This crate has **no framework dependencies** and defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Collaborators are traits defined here ([`Provider`], [`LogBase`],
//! [`FunctionHandler`], [`Tokenizer`]); implementations live in their own
//! crates. State that other designs keep in globals (prompts, model cards)
//! lives in explicit objects ([`PromptRegistry`], [`ModelCatalog`]) that
//! callers own and pass in.

pub mod dialog;
pub mod error;
pub mod function;
pub mod log;
pub mod message;
pub mod model_card;
pub mod parser;
pub mod prompt;
pub mod provider;
pub mod registry;

// Re-export key types at crate root for ergonomics
pub use dialog::{Dialog, DialogRecord};
pub use error::{Error, FunctionError, LogError, ModelError, ParseError, PromptError, ProviderError, Result};
pub use function::{Function, FunctionCall, FunctionHandler, ResultProcessor};
pub use log::{Collection, InMemoryLog, LogBase, LogRecord, LogSession};
pub use message::{ApiType, Message, Modality, Role, TokenLogprob, TopLogprob, Usage};
pub use model_card::{CompletionCost, Feature, ModelCard, ModelCatalog, Snapshot, Tokenizer};
pub use parser::{ResponseParser, TagParser};
pub use prompt::{HandlerKind, Prompt, derive_handler_prompt};
pub use provider::{Provider, ProviderCall};
pub use registry::{PromptRegistry, ScopedPrompts};
