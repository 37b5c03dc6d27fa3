//! Surprisal accumulation.
//!
//! Turns a token sequence plus a next-token distribution per position into
//! an [`AnalysisSummary`]. For each position `i` the distribution is
//! conditioned on `tokens[..=i]` and charged `-log2 p(tokens[i + 1])` bits.
//!
//! The fold performs no recovery: an undefined or out-of-range probability,
//! or any oracle error, aborts the pass without a partial summary. A pass
//! whose total is exactly zero bits is reported as
//! [`DegenerateReason::ZeroTotalBits`] rather than an infinite ratio.
//!
//! ```rust
//! use surprisal::{Distribution, ScoreOptions, accumulator::score_with};
//!
//! let tokens = [1, 1, 1, 1];
//! let summary = score_with(&tokens, 4, |_prefix| Distribution::uniform(2), &ScoreOptions::default())?;
//! assert_eq!(summary.total_bits, 3.0);
//! # Ok::<(), surprisal::SurprisalError>(())
//! ```

use tracing::{debug, trace};

use crate::error::DegenerateReason;
use crate::oracle::ProbabilityOracle;
use crate::types::{
    AnalysisSummary, BASELINE_BITS_PER_CHAR, Distribution, ScoreOptions, SurprisalRecord, TokenId,
};
use crate::{Result, SurprisalError};

/// Running state of one scoring pass.
///
/// Each text gets its own accumulator; nothing is shared between passes.
#[derive(Debug, Default)]
pub struct SurprisalAccumulator {
    options: ScoreOptions,
    total_bits: f64,
    predictions: usize,
    records: Vec<SurprisalRecord>,
}

impl SurprisalAccumulator {
    pub fn new(options: ScoreOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Charge the cost of observing `token` after `position` under `dist`.
    pub fn observe(
        &mut self,
        position: usize,
        token: TokenId,
        dist: &Distribution,
    ) -> Result<SurprisalRecord> {
        let probability = match dist.probability(token) {
            Some(p) if p.is_finite() && p > 0.0 && p <= 1.0 => p,
            other => {
                return Err(SurprisalError::InvalidProbability {
                    position,
                    token,
                    probability: other,
                });
            }
        };
        let bits = if probability == 1.0 {
            0.0
        } else {
            -probability.log2()
        };

        let record = SurprisalRecord {
            position,
            token,
            probability,
            bits,
            alternatives: dist.top_k(self.options.top_k),
        };
        trace!(
            position,
            token,
            probability,
            bits,
            alternatives = ?record.alternatives,
            "scored token"
        );

        self.total_bits += bits;
        self.predictions += 1;
        if self.options.keep_records {
            self.records.push(record.clone());
        }
        Ok(record)
    }

    /// Sum of surprisal charged so far.
    pub fn total_bits(&self) -> f64 {
        self.total_bits
    }

    /// Number of predictions charged so far.
    pub fn predictions(&self) -> usize {
        self.predictions
    }

    /// Derive the per-text summary.
    pub fn finish(self, num_tokens: usize, character_count: usize) -> Result<AnalysisSummary> {
        if character_count == 0 {
            return Err(SurprisalError::DegenerateInput(DegenerateReason::EmptyText));
        }
        if self.total_bits == 0.0 {
            return Err(SurprisalError::DegenerateInput(
                DegenerateReason::ZeroTotalBits,
            ));
        }
        let chars = character_count as f64;
        let summary = AnalysisSummary {
            num_tokens,
            character_count,
            total_bits: self.total_bits,
            bits_per_char: self.total_bits / chars,
            compression_ratio: BASELINE_BITS_PER_CHAR * chars / self.total_bits,
            records: self.records,
        };
        debug!(
            num_tokens,
            character_count,
            total_bits = summary.total_bits,
            bits_per_char = summary.bits_per_char,
            perplexity = summary.perplexity(),
            "scoring pass complete"
        );
        Ok(summary)
    }
}

/// Reject inputs that cannot produce a summary before any oracle call.
pub(crate) fn check_preconditions(tokens: &[TokenId], character_count: usize) -> Result<()> {
    if tokens.len() < 2 {
        return Err(SurprisalError::DegenerateInput(
            DegenerateReason::TooFewTokens {
                count: tokens.len(),
            },
        ));
    }
    if character_count == 0 {
        return Err(SurprisalError::DegenerateInput(DegenerateReason::EmptyText));
    }
    Ok(())
}

/// Score `tokens` with a synchronous distribution source.
///
/// `distribution_at` receives the prefix `tokens[..=i]` and returns the
/// distribution over `tokens[i + 1]`.
pub fn score_with<F>(
    tokens: &[TokenId],
    character_count: usize,
    mut distribution_at: F,
    options: &ScoreOptions,
) -> Result<AnalysisSummary>
where
    F: FnMut(&[TokenId]) -> Result<Distribution>,
{
    check_preconditions(tokens, character_count)?;
    let mut acc = SurprisalAccumulator::new(options.clone());
    for i in 0..tokens.len() - 1 {
        let dist = distribution_at(&tokens[..=i])?;
        acc.observe(i, tokens[i + 1], &dist)?;
    }
    acc.finish(tokens.len(), character_count)
}

/// Score `tokens` against a [`ProbabilityOracle`].
///
/// Queries are issued strictly in order: each depends on the full prefix.
pub async fn score(
    tokens: &[TokenId],
    character_count: usize,
    oracle: &dyn ProbabilityOracle,
    options: &ScoreOptions,
) -> Result<AnalysisSummary> {
    check_preconditions(tokens, character_count)?;
    let mut acc = SurprisalAccumulator::new(options.clone());
    for i in 0..tokens.len() - 1 {
        let dist = oracle
            .distribution_covering(&tokens[..=i], tokens[i + 1])
            .await?;
        acc.observe(i, tokens[i + 1], &dist)?;
    }
    acc.finish(tokens.len(), character_count)
}
