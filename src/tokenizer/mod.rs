//! Tokenizers: text to token ids and back.
//!
//! Every tokenizer must round-trip well-formed text losslessly:
//! `detokenize(tokenize(t)) == t`. The character and byte tokenizers are
//! always available; HuggingFace tokenizers and the model-name registry
//! need the `local-inference` feature.

mod bytes;
mod chars;
#[cfg(feature = "local-inference")]
mod hf;

pub use bytes::ByteTokenizer;
pub use chars::CharTokenizer;
#[cfg(feature = "local-inference")]
pub use hf::HfTokenizer;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Token, TokenId};
#[cfg(feature = "local-inference")]
use std::collections::{HashMap, HashSet};
#[cfg(feature = "local-inference")]
use std::path::PathBuf;
#[cfg(feature = "local-inference")]
use std::sync::{Arc, RwLock};

/// Trait for tokenizer implementations.
///
/// Async so that remote tokenizers (e.g. the llama.cpp server's) fit the
/// same seam as local ones.
#[async_trait]
pub trait TokenizerProvider: Send + Sync {
    /// Tokenizer name for logging.
    fn name(&self) -> &str;

    /// Number of ids in the vocabulary, if known locally.
    fn vocab_size(&self) -> Option<usize>;

    /// Tokenize text into token IDs.
    async fn tokenize(&self, text: &str) -> Result<Vec<TokenId>>;

    /// Reconstruct text from token IDs.
    async fn detokenize(&self, tokens: &[TokenId]) -> Result<String>;

    /// Count tokens in the given text.
    async fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.tokenize(text).await?.len())
    }

    /// Display form of a single token.
    ///
    /// Tokens that are not valid text on their own (e.g. one byte of a
    /// multi-byte character) render as `<id>`.
    async fn token(&self, id: TokenId) -> Token {
        let text = self
            .detokenize(&[id])
            .await
            .unwrap_or_else(|_| format!("<{id}>"));
        Token::new(id, text)
    }
}

/// Source for a tokenizer model.
#[cfg(feature = "local-inference")]
#[derive(Debug, Clone)]
pub enum TokenizerSource {
    /// Load from HuggingFace Hub repository.
    HuggingFace { repo_id: String },
    /// Load from local file path.
    Local { path: PathBuf },
    /// Alias to another model's tokenizer.
    Alias { target: String },
}

/// Registry mapping model names to tokenizers.
///
/// Lets a results document name a model (e.g. `gpt2`) and get the matching
/// tokenizer, loaded lazily and cached for reuse.
#[cfg(feature = "local-inference")]
pub struct TokenizerRegistry {
    /// Loaded tokenizers cache.
    tokenizers: RwLock<HashMap<String, Arc<dyn TokenizerProvider>>>,
    /// Model pattern → tokenizer source mappings.
    model_mappings: HashMap<String, TokenizerSource>,
}

#[cfg(feature = "local-inference")]
impl TokenizerRegistry {
    /// Create a new registry with default model mappings.
    pub fn new() -> Self {
        let mut model_mappings = HashMap::new();

        for (pattern, repo_id) in [
            ("gpt2", "openai-community/gpt2"),
            ("distilgpt2", "distilbert/distilgpt2"),
            ("llama", "meta-llama/Llama-3.2-1B"),
            ("meta-llama", "meta-llama/Llama-3.2-1B"),
            ("mistral", "mistralai/Mistral-7B-v0.1"),
            ("qwen", "Qwen/Qwen2.5-0.5B"),
            ("smollm", "HuggingFaceTB/SmolLM2-135M"),
        ] {
            model_mappings.insert(
                pattern.to_string(),
                TokenizerSource::HuggingFace {
                    repo_id: repo_id.to_string(),
                },
            );
        }

        Self {
            tokenizers: RwLock::new(HashMap::new()),
            model_mappings,
        }
    }

    /// Register a custom model → tokenizer mapping.
    ///
    /// This allows users to override default mappings or add new ones.
    pub fn register(&mut self, model_pattern: impl Into<String>, source: TokenizerSource) {
        self.model_mappings.insert(model_pattern.into(), source);
    }

    /// Tokenizer for the given model, loaded lazily and cached.
    pub fn get(&self, model: &str) -> Result<Arc<dyn TokenizerProvider>> {
        // Fast path: already loaded
        if let Some(provider) = self.read_cache(model) {
            return Ok(provider);
        }

        // Slow path: need to load
        let source = self.resolve_source(model)?;
        let provider: Arc<dyn TokenizerProvider> = Arc::new(self.load_tokenizer(&source)?);

        let mut cache = self
            .tokenizers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Double-check after acquiring write lock
        if let Some(existing) = cache.get(model) {
            return Ok(Arc::clone(existing));
        }
        cache.insert(model.to_string(), Arc::clone(&provider));
        Ok(provider)
    }

    fn read_cache(&self, model: &str) -> Option<Arc<dyn TokenizerProvider>> {
        self.tokenizers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(model)
            .map(Arc::clone)
    }

    /// Resolve model name to tokenizer source.
    ///
    /// Exact matches win, then the longest registered prefix. Aliases are
    /// followed; a cycle is a configuration error.
    pub fn resolve_source(&self, model: &str) -> Result<TokenizerSource> {
        let mut visited = HashSet::new();
        self.resolve_inner(model, &mut visited)
    }

    fn resolve_inner(&self, model: &str, visited: &mut HashSet<String>) -> Result<TokenizerSource> {
        if !visited.insert(model.to_string()) {
            return Err(crate::error::SurprisalError::Configuration(format!(
                "Alias cycle detected at tokenizer mapping: {model}"
            )));
        }

        let source = self.model_mappings.get(model).or_else(|| {
            self.model_mappings
                .iter()
                .filter(|(pattern, _)| model.starts_with(pattern.as_str()))
                .max_by_key(|(pattern, _)| pattern.len())
                .map(|(_, source)| source)
        });

        match source {
            Some(TokenizerSource::Alias { target }) => self.resolve_inner(target, visited),
            Some(source) => Ok(source.clone()),
            None => Err(crate::error::SurprisalError::Configuration(format!(
                "No tokenizer configured for model: {model}"
            ))),
        }
    }

    /// Load a tokenizer from the given source.
    fn load_tokenizer(&self, source: &TokenizerSource) -> Result<HfTokenizer> {
        match source {
            TokenizerSource::HuggingFace { repo_id } => HfTokenizer::from_hub(repo_id),
            TokenizerSource::Local { path } => HfTokenizer::from_file(path),
            TokenizerSource::Alias { target } => Err(crate::error::SurprisalError::Configuration(
                format!("unresolved tokenizer alias: {target}"),
            )),
        }
    }
}

#[cfg(feature = "local-inference")]
impl Default for TokenizerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
