//! LLM Provider implementations for LLLM.
//!
//! All providers implement the `lllm_core::Provider` trait.
//! The registry builds the configured provider by name.

pub mod openai_compat;
pub mod registry;
pub mod response;
pub mod scripted;
#[cfg(feature = "hf-tokenizer")]
pub mod tokenizer;

pub use openai_compat::OpenAiCompatProvider;
pub use registry::{ProviderBuilder, ProviderRegistry, ProviderSettings};
pub use scripted::{RecordedCall, ScriptStep, ScriptedProvider};
#[cfg(feature = "hf-tokenizer")]
pub use tokenizer::HfTokenizer;
