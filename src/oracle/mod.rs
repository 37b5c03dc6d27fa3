//! Probability oracles: token history in, next-token distribution out.
//!
//! Oracles must be pure with respect to the prefix they are given: the same
//! prefix always yields the same distribution. Sampling backends have to be
//! asked for exact (greedy) probabilities, otherwise scores are not
//! reproducible. That property is what makes [`CachingOracle`] sound.
//!
//! Implementations are loaded once by the caller and injected as
//! `Arc<dyn ProbabilityOracle>`; decorators wrap them:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use surprisal::oracle::{CacheConfig, CachingOracle, LlamaCppClient, RetryConfig, RetryingOracle};
//!
//! let client = Arc::new(LlamaCppClient::new("http://127.0.0.1:8080"));
//! let retrying = Arc::new(RetryingOracle::new(client, RetryConfig::new().max_attempts(5)));
//! let oracle = CachingOracle::new(retrying, &CacheConfig::new());
//! ```

pub mod cache;
pub mod llama_cpp;
pub mod ngram;
pub mod retry;
pub mod uniform;

use async_trait::async_trait;

use crate::Result;
use crate::types::{Distribution, TokenId};

pub use cache::{CacheConfig, CachingOracle};
pub use llama_cpp::LlamaCppClient;
pub use ngram::NgramOracle;
pub use retry::{RetryConfig, RetryingOracle};
pub use uniform::UniformOracle;

/// A model that predicts the next token from the tokens seen so far.
#[async_trait]
pub trait ProbabilityOracle: Send + Sync {
    /// Oracle name for logging and metric labels.
    fn name(&self) -> &str;

    /// Distribution over the token following `prefix`.
    ///
    /// `prefix` is never empty when called by the accumulator.
    async fn next_token_distribution(&self, prefix: &[TokenId]) -> Result<Distribution>;

    /// Distribution after `prefix` that defines the probability of `next`
    /// whenever the oracle can.
    ///
    /// Oracles answering with a truncated candidate list override this to
    /// widen the query when `next` is not among the candidates. Probabilities
    /// the two answers share are identical, so scores stay reproducible.
    async fn distribution_covering(
        &self,
        prefix: &[TokenId],
        _next: TokenId,
    ) -> Result<Distribution> {
        self.next_token_distribution(prefix).await
    }
}
