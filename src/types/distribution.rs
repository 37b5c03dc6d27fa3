//! Next-token probability distributions.

use std::collections::HashMap;

use super::token::TokenId;
use crate::{Result, SurprisalError};

/// Tolerance on the total probability mass of a distribution.
pub const DISTRIBUTION_TOLERANCE: f64 = 1e-6;

/// A probability distribution over the next token.
///
/// Produced fresh for each position by a [`ProbabilityOracle`](crate::oracle::ProbabilityOracle).
/// Constructors validate weights; queries never renormalise, so the value
/// returned by [`probability`](Self::probability) is exactly the one the
/// oracle produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    /// One weight per vocabulary id, summing to one.
    Dense(Vec<f64>),

    /// Only the listed tokens are defined (e.g. a top-N response from a
    /// remote model). Every other token has an undefined probability.
    Sparse(HashMap<TokenId, f64>),

    /// Listed tokens carry their own weight; every other id below
    /// `vocab_size` carries `fallback`.
    Smoothed {
        explicit: HashMap<TokenId, f64>,
        fallback: f64,
        vocab_size: usize,
    },
}

impl Distribution {
    /// Dense distribution over `weights.len()` tokens.
    pub fn dense(weights: Vec<f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(SurprisalError::InvalidDistribution(
                "empty vocabulary".to_string(),
            ));
        }
        validate_weights(weights.iter().copied())?;
        let mass: f64 = weights.iter().sum();
        if (mass - 1.0).abs() > DISTRIBUTION_TOLERANCE {
            return Err(SurprisalError::InvalidDistribution(format!(
                "weights sum to {mass}, expected 1"
            )));
        }
        Ok(Self::Dense(weights))
    }

    /// Partial distribution defined only on the given tokens.
    pub fn sparse(weights: HashMap<TokenId, f64>) -> Result<Self> {
        validate_weights(weights.values().copied())?;
        let mass: f64 = weights.values().sum();
        if mass > 1.0 + DISTRIBUTION_TOLERANCE {
            return Err(SurprisalError::InvalidDistribution(format!(
                "partial weights sum to {mass}, more than 1"
            )));
        }
        Ok(Self::Sparse(weights))
    }

    /// Distribution with explicit weights and a shared weight for the rest
    /// of the vocabulary.
    pub fn smoothed(
        explicit: HashMap<TokenId, f64>,
        fallback: f64,
        vocab_size: usize,
    ) -> Result<Self> {
        if vocab_size == 0 {
            return Err(SurprisalError::InvalidDistribution(
                "empty vocabulary".to_string(),
            ));
        }
        if let Some(id) = explicit.keys().find(|&&id| id as usize >= vocab_size) {
            return Err(SurprisalError::InvalidDistribution(format!(
                "token {id} outside vocabulary of size {vocab_size}"
            )));
        }
        validate_weights(explicit.values().copied().chain(std::iter::once(fallback)))?;
        let implicit = (vocab_size - explicit.len()) as f64;
        let mass = explicit.values().sum::<f64>() + fallback * implicit;
        if (mass - 1.0).abs() > DISTRIBUTION_TOLERANCE {
            return Err(SurprisalError::InvalidDistribution(format!(
                "weights sum to {mass}, expected 1"
            )));
        }
        Ok(Self::Smoothed {
            explicit,
            fallback,
            vocab_size,
        })
    }

    /// Uniform distribution over a vocabulary of `vocab_size` tokens.
    pub fn uniform(vocab_size: usize) -> Result<Self> {
        if vocab_size == 0 {
            return Err(SurprisalError::InvalidDistribution(
                "empty vocabulary".to_string(),
            ));
        }
        Ok(Self::Smoothed {
            explicit: HashMap::new(),
            fallback: 1.0 / vocab_size as f64,
            vocab_size,
        })
    }

    /// Partial distribution from natural-log probabilities.
    pub fn from_logprobs(logprobs: impl IntoIterator<Item = (TokenId, f64)>) -> Result<Self> {
        let weights = logprobs
            .into_iter()
            .map(|(id, lp)| (id, lp.exp()))
            .collect();
        Self::sparse(weights)
    }

    /// Probability of `token`, or `None` when the distribution does not
    /// define it.
    pub fn probability(&self, token: TokenId) -> Option<f64> {
        match self {
            Self::Dense(weights) => weights.get(token as usize).copied(),
            Self::Sparse(weights) => weights.get(&token).copied(),
            Self::Smoothed {
                explicit,
                fallback,
                vocab_size,
            } => explicit.get(&token).copied().or_else(|| {
                if (token as usize) < *vocab_size {
                    Some(*fallback)
                } else {
                    None
                }
            }),
        }
    }

    /// The `k` most probable tokens, descending, ties broken by lower id.
    ///
    /// For display only; the cost computation reads
    /// [`probability`](Self::probability) directly.
    pub fn top_k(&self, k: usize) -> Vec<(TokenId, f64)> {
        if k == 0 {
            return Vec::new();
        }
        let mut entries: Vec<(TokenId, f64)> = match self {
            Self::Dense(weights) => weights
                .iter()
                .enumerate()
                .map(|(id, &p)| (id as TokenId, p))
                .collect(),
            Self::Sparse(weights) => weights.iter().map(|(&id, &p)| (id, p)).collect(),
            Self::Smoothed {
                explicit,
                fallback,
                vocab_size,
            } => {
                let mut entries: Vec<(TokenId, f64)> =
                    explicit.iter().map(|(&id, &p)| (id, p)).collect();
                // Enough implicit ids to fill k slots; the rest tie with them.
                let implicit = (0..*vocab_size as u64)
                    .map(|id| id as TokenId)
                    .filter(|id| !explicit.contains_key(id))
                    .take(k)
                    .map(|id| (id, *fallback));
                entries.extend(implicit);
                entries
            }
        };
        entries.sort_by(|(a_id, a), (b_id, b)| {
            b.partial_cmp(a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a_id.cmp(b_id))
        });
        entries.truncate(k);
        entries
    }
}

fn validate_weights(weights: impl Iterator<Item = f64>) -> Result<()> {
    for w in weights {
        if !w.is_finite() || w < 0.0 {
            return Err(SurprisalError::InvalidDistribution(format!(
                "weight {w} is not a finite non-negative number"
            )));
        }
    }
    Ok(())
}
