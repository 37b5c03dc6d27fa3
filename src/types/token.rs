//! Token types for tokenization results.

use serde::{Deserialize, Serialize};

/// Identifier of a token in a tokenizer's vocabulary.
pub type TokenId = u32;

/// A token paired with its human-readable text, for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    /// Token ID in the vocabulary.
    pub id: TokenId,
    /// Text representation of the token.
    pub text: String,
}

impl Token {
    /// Create a new token.
    pub fn new(id: TokenId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }

    /// Text with whitespace control characters made visible.
    pub fn display_text(&self) -> String {
        self.text
            .replace('\n', "\u{21b5}")
            .replace('\t', "\u{2192}")
            .replace('\r', "\u{240d}")
    }
}
