//! Uniform oracle: the zero-knowledge baseline.

use async_trait::async_trait;

use super::ProbabilityOracle;
use crate::Result;
use crate::types::{Distribution, TokenId};

/// Assigns `1 / V` to every token regardless of history.
///
/// Every prediction costs exactly `log2(V)` bits.
#[derive(Debug, Clone)]
pub struct UniformOracle {
    vocab_size: usize,
}

impl UniformOracle {
    pub fn new(vocab_size: usize) -> Self {
        Self { vocab_size }
    }
}

#[async_trait]
impl ProbabilityOracle for UniformOracle {
    fn name(&self) -> &str {
        "uniform"
    }

    async fn next_token_distribution(&self, _prefix: &[TokenId]) -> Result<Distribution> {
        Distribution::uniform(self.vocab_size)
    }
}
