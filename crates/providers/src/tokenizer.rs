//! Hugging Face tokenizer adapter for classification logit biases.
//!
//! Load the `tokenizer.json` matching the target model family; class labels
//! are encoded without special tokens.

use std::path::Path;

use lllm_core::error::ModelError;
use lllm_core::model_card::Tokenizer;

pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let inner = tokenizers::Tokenizer::from_file(path.as_ref())
            .map_err(|e| ModelError::Tokenizer(format!("{}: {e}", path.as_ref().display())))?;
        Ok(Self { inner })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        let inner = tokenizers::Tokenizer::from_bytes(bytes).map_err(|e| ModelError::Tokenizer(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl Tokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, ModelError> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| ModelError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }
}
