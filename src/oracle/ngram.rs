//! Adaptive n-gram oracle.
//!
//! A local model that learns from the text as it is read: the distribution
//! for the next token is estimated from how often each token followed the
//! current context earlier in the same prefix, with add-α smoothing so that
//! every vocabulary token keeps a strictly positive probability:
//!
//! ```text
//! P(t | ctx) = (count(ctx, t) + α) / (count(ctx) + α·V)
//! ```
//!
//! The default α is `1 / V`: one pseudo-count spread over the whole
//! vocabulary, whatever its size.
//!
//! The answer depends only on the prefix. Count tables built for earlier
//! prefixes are kept and extended by the tokens a longer prefix adds, so
//! scoring a text position by position stays linear in its length.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::ProbabilityOracle;
use crate::types::{Distribution, TokenId};
use crate::{Result, SurprisalError};

/// Pseudo-counts the default smoothing spreads over the vocabulary.
pub const DEFAULT_PRIOR_COUNT: f64 = 1.0;

/// Texts whose count tables are kept between calls.
const MEMO_SLOTS: usize = 16;

/// Order-k context model with additive smoothing.
#[derive(Debug)]
pub struct NgramOracle {
    name: String,
    order: usize,
    alpha: f64,
    vocab_size: usize,
    memo: Mutex<Memo>,
}

/// Count tables for recently seen prefixes.
#[derive(Debug, Default)]
struct Memo {
    slots: Vec<CountTable>,
    clock: u64,
}

/// Continuation counts of every context in `history`.
#[derive(Debug, Default)]
struct CountTable {
    history: Vec<TokenId>,
    counts: HashMap<Vec<TokenId>, HashMap<TokenId, u64>>,
    last_used: u64,
}

impl CountTable {
    /// Fold in the tokens `prefix` adds beyond `history`.
    fn extend(&mut self, prefix: &[TokenId], order: usize) {
        for j in self.history.len()..prefix.len() {
            let context = prefix[j.saturating_sub(order)..j].to_vec();
            *self
                .counts
                .entry(context)
                .or_default()
                .entry(prefix[j])
                .or_insert(0) += 1;
        }
        self.history.extend_from_slice(&prefix[self.history.len()..]);
    }
}

impl Memo {
    /// The table with the longest history that `prefix` extends, or a fresh
    /// one replacing the least recently used.
    fn table_for(&mut self, prefix: &[TokenId]) -> &mut CountTable {
        self.clock += 1;
        let reusable = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, table)| prefix.starts_with(&table.history))
            .max_by_key(|(_, table)| table.history.len())
            .map(|(index, _)| index);

        let index = match reusable {
            Some(index) => index,
            None if self.slots.len() < MEMO_SLOTS => {
                self.slots.push(CountTable::default());
                self.slots.len() - 1
            }
            None => {
                let index = self
                    .slots
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, table)| table.last_used)
                    .map_or(0, |(index, _)| index);
                self.slots[index] = CountTable::default();
                index
            }
        };

        let table = &mut self.slots[index];
        table.last_used = self.clock;
        table
    }
}

impl NgramOracle {
    /// Model conditioning on the last `order` tokens (0 = unigram).
    pub fn new(order: usize, vocab_size: usize) -> Self {
        Self {
            name: format!("ngram-{order}"),
            order,
            alpha: DEFAULT_PRIOR_COUNT / vocab_size.max(1) as f64,
            vocab_size,
            memo: Mutex::new(Memo::default()),
        }
    }

    /// Set the smoothing constant. Must be positive.
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Counts of tokens that followed the prefix's trailing context.
    fn continuation_counts(&self, prefix: &[TokenId]) -> HashMap<TokenId, u64> {
        let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
        let table = memo.table_for(prefix);
        table.extend(prefix, self.order);

        let context = &prefix[prefix.len().saturating_sub(self.order)..];
        table.counts.get(context).cloned().unwrap_or_default()
    }

    fn distribution(&self, prefix: &[TokenId]) -> Result<Distribution> {
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(SurprisalError::Configuration(format!(
                "n-gram smoothing constant must be positive, got {}",
                self.alpha
            )));
        }
        let counts = self.continuation_counts(prefix);
        let seen: u64 = counts.values().sum();
        let denominator = seen as f64 + self.alpha * self.vocab_size as f64;
        let explicit = counts
            .into_iter()
            .map(|(token, count)| (token, (count as f64 + self.alpha) / denominator))
            .collect();
        Distribution::smoothed(explicit, self.alpha / denominator, self.vocab_size)
    }
}

#[async_trait]
impl ProbabilityOracle for NgramOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_token_distribution(&self, prefix: &[TokenId]) -> Result<Distribution> {
        self.distribution(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_is_uniform() {
        let oracle = NgramOracle::new(2, 4).alpha(1.0);
        // Context [3] has no earlier occurrence, so nothing is counted.
        let dist = oracle.distribution(&[3]).unwrap();
        for t in 0..4 {
            assert!((dist.probability(t).unwrap() - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn counts_follow_context() {
        let oracle = NgramOracle::new(1, 4).alpha(1.0);
        // After "1" we have seen "2" twice; current context is "1".
        let dist = oracle.distribution(&[1, 2, 1, 2, 1]).unwrap();
        // (2 + 1) / (2 + 4)
        assert!((dist.probability(2).unwrap() - 0.5).abs() < 1e-12);
        assert!((dist.probability(3).unwrap() - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn unigram_counts_whole_prefix() {
        let oracle = NgramOracle::new(0, 2).alpha(1.0);
        let dist = oracle.distribution(&[0, 0, 0]).unwrap();
        // (3 + 1) / (3 + 2)
        assert!((dist.probability(0).unwrap() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn token_outside_vocabulary_is_rejected() {
        let oracle = NgramOracle::new(0, 2);
        assert!(matches!(
            oracle.distribution(&[5]),
            Err(SurprisalError::InvalidDistribution(_))
        ));
    }

    #[test]
    fn non_positive_alpha_is_rejected() {
        let oracle = NgramOracle::new(1, 2).alpha(0.0);
        assert!(matches!(
            oracle.distribution(&[0]),
            Err(SurprisalError::Configuration(_))
        ));
    }

    #[test]
    fn default_smoothing_lets_repetition_dominate() {
        // A Unicode-scalar vocabulary; "abc" repeated three times.
        let oracle = NgramOracle::new(1, 0x11_0000);
        let text: Vec<TokenId> = "abcabcabc".chars().map(TokenId::from).collect();
        let dist = oracle.distribution(&text).unwrap();
        // "a" followed "c" twice: (2 + 1/V) / (2 + 1).
        assert!(dist.probability(TokenId::from('a')).unwrap() > 0.66);
    }

    #[test]
    fn reused_counts_match_fresh_counts() {
        let oracle = NgramOracle::new(2, 64);
        let texts: Vec<Vec<TokenId>> = (0..MEMO_SLOTS as u32 + 4)
            .map(|k| (0..40).map(|i| (k * 3 + i * i % 7) % 64).collect())
            .collect();

        // Interleave texts so tables are shared, extended and evicted.
        for end in 1..=40 {
            for text in &texts {
                let prefix = &text[..end];
                let fresh = NgramOracle::new(2, 64).distribution(prefix).unwrap();
                assert_eq!(oracle.distribution(prefix).unwrap(), fresh);
            }
        }
        // A shorter prefix after its extension was counted.
        let prefix = &texts[0][..10];
        let fresh = NgramOracle::new(2, 64).distribution(prefix).unwrap();
        assert_eq!(oracle.distribution(prefix).unwrap(), fresh);
    }

    #[test]
    fn name_includes_order() {
        assert_eq!(NgramOracle::new(3, 256).name(), "ngram-3");
    }
}
