//! One token per UTF-8 byte.

use async_trait::async_trait;

use super::TokenizerProvider;
use crate::error::{Result, SurprisalError};
use crate::types::TokenId;

/// Byte tokenizer over the 256 possible byte values.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteTokenizer;

#[async_trait]
impl TokenizerProvider for ByteTokenizer {
    fn name(&self) -> &str {
        "byte"
    }

    fn vocab_size(&self) -> Option<usize> {
        Some(256)
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<TokenId>> {
        Ok(text.bytes().map(TokenId::from).collect())
    }

    async fn detokenize(&self, tokens: &[TokenId]) -> Result<String> {
        let bytes = tokens
            .iter()
            .map(|&id| {
                u8::try_from(id)
                    .map_err(|_| SurprisalError::DataError(format!("token {id} is not a byte")))
            })
            .collect::<Result<Vec<u8>>>()?;
        String::from_utf8(bytes)
            .map_err(|e| SurprisalError::DataError(format!("tokens are not valid UTF-8: {e}")))
    }
}
