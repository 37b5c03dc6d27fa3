//! HuggingFace tokenizers implementation.

use async_trait::async_trait;

use super::TokenizerProvider;
use crate::error::{Result, SurprisalError};
use crate::types::TokenId;
use std::path::Path;

/// HuggingFace tokenizers implementation.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
    name: String,
}

impl HfTokenizer {
    /// Load tokenizer from HuggingFace Hub.
    ///
    /// Downloads the tokenizer if not cached locally.
    pub fn from_hub(repo_id: &str) -> Result<Self> {
        let api = hf_hub::api::sync::Api::new().map_err(|e| {
            SurprisalError::Configuration(format!("Failed to initialize HF API: {}", e))
        })?;

        let repo = api.model(repo_id.to_string());

        let tokenizer_path = repo.get("tokenizer.json").map_err(|e| {
            SurprisalError::Configuration(format!(
                "Failed to download tokenizer from {}: {}",
                repo_id, e
            ))
        })?;

        let mut tokenizer = Self::from_file(&tokenizer_path)?;
        tokenizer.name = repo_id.to_string();
        Ok(tokenizer)
    }

    /// Load tokenizer from local file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            SurprisalError::Configuration(format!(
                "Failed to load tokenizer from {:?}: {}",
                path, e
            ))
        })?;

        Ok(Self {
            inner,
            name: path.display().to_string(),
        })
    }
}

#[async_trait]
impl TokenizerProvider for HfTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn vocab_size(&self) -> Option<usize> {
        Some(self.inner.get_vocab_size(true))
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<TokenId>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| SurprisalError::DataError(format!("Tokenization failed: {}", e)))?;

        Ok(encoding.get_ids().to_vec())
    }

    async fn detokenize(&self, tokens: &[TokenId]) -> Result<String> {
        self.inner
            .decode(tokens, false)
            .map_err(|e| SurprisalError::DataError(format!("Detokenization failed: {}", e)))
    }
}
