//! One token per Unicode scalar value.

use async_trait::async_trait;

use super::TokenizerProvider;
use crate::error::{Result, SurprisalError};
use crate::types::TokenId;

/// Number of Unicode code points (`U+0000..=U+10FFFF`).
pub const UNICODE_VOCAB_SIZE: usize = 0x11_0000;

/// Character tokenizer: the token id is the code point.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharTokenizer;

#[async_trait]
impl TokenizerProvider for CharTokenizer {
    fn name(&self) -> &str {
        "char"
    }

    fn vocab_size(&self) -> Option<usize> {
        Some(UNICODE_VOCAB_SIZE)
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<TokenId>> {
        Ok(text.chars().map(|c| c as TokenId).collect())
    }

    async fn detokenize(&self, tokens: &[TokenId]) -> Result<String> {
        tokens
            .iter()
            .map(|&id| {
                char::from_u32(id).ok_or_else(|| {
                    SurprisalError::DataError(format!("token {id} is not a Unicode scalar value"))
                })
            })
            .collect()
    }

    async fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(text.chars().count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ids_are_code_points() {
        assert_eq!(CharTokenizer.tokenize("aé").await.unwrap(), vec![0x61, 0xe9]);
        assert_eq!(CharTokenizer.count_tokens("aé").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn surrogate_is_rejected() {
        assert!(CharTokenizer.detokenize(&[0xd800]).await.is_err());
    }
}
