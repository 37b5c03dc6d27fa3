//! Per-position surprisal records and per-text summaries.

use serde::{Deserialize, Serialize};

use super::token::TokenId;

/// Bits per character of the fixed-width baseline encoding (one byte).
pub const BASELINE_BITS_PER_CHAR: f64 = 8.0;

/// Cost of one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurprisalRecord {
    /// Index of the last token of the conditioning prefix.
    pub position: usize,
    /// The token actually observed at `position + 1`.
    pub token: TokenId,
    /// Probability the oracle assigned to `token`.
    pub probability: f64,
    /// `-log2(probability)`.
    pub bits: f64,
    /// Most probable alternatives, for inspection only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<(TokenId, f64)>,
}

/// Aggregate cost of one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub num_tokens: usize,
    pub character_count: usize,
    pub total_bits: f64,
    pub bits_per_char: f64,
    pub compression_ratio: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<SurprisalRecord>,
}

impl AnalysisSummary {
    /// Number of predictions made (one fewer than the number of tokens).
    pub fn num_predictions(&self) -> usize {
        self.num_tokens.saturating_sub(1)
    }

    /// Average surprisal per predicted token.
    pub fn mean_bits_per_token(&self) -> f64 {
        self.total_bits / self.num_predictions().max(1) as f64
    }

    /// Per-token perplexity, `2^(mean bits per token)`.
    pub fn perplexity(&self) -> f64 {
        self.mean_bits_per_token().exp2()
    }
}
