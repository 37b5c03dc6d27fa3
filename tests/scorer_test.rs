//! Tests for single-text and batch scoring.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use surprisal::oracle::{NgramOracle, UniformOracle};
use surprisal::scorer::{Scorer, TextInput};
use surprisal::tokenizer::{ByteTokenizer, CharTokenizer};
use surprisal::{
    DegenerateReason, Distribution, ProbabilityOracle, Result, SurprisalError, TokenId,
};

/// Predicts a fixed token sequence with certainty.
struct PerfectOracle {
    tokens: Vec<TokenId>,
}

#[async_trait]
impl ProbabilityOracle for PerfectOracle {
    fn name(&self) -> &str {
        "perfect"
    }

    async fn next_token_distribution(&self, prefix: &[TokenId]) -> Result<Distribution> {
        Distribution::sparse(HashMap::from([(self.tokens[prefix.len()], 1.0)]))
    }
}

fn char_ngram_scorer() -> Scorer {
    Scorer::new(
        Arc::new(CharTokenizer),
        Arc::new(NgramOracle::new(2, 0x11_0000)),
    )
}

#[tokio::test]
async fn analyze_produces_matching_record_and_summary() {
    let scorer = char_ngram_scorer();
    let scored = scorer.analyze("pangram", "the quick brown fox").await.unwrap();

    assert_eq!(scored.record.text_name, "pangram");
    assert_eq!(scored.record.text_length, 19);
    assert_eq!(scored.record.num_tokens, 19);
    assert_eq!(scored.record.total_bits, scored.summary.total_bits);
    assert!(scored.record.bits_per_char > 0.0);
    assert!(
        (scored.record.compression_ratio * scored.record.bits_per_char - 8.0).abs() < 1e-9
    );
}

#[tokio::test]
async fn character_count_uses_unicode_scalars() {
    let scorer = Scorer::new(Arc::new(ByteTokenizer), Arc::new(UniformOracle::new(256)));
    let scored = scorer.analyze("jp", "日本語").await.unwrap();

    // Nine byte tokens, eight predictions of eight bits, three characters.
    assert_eq!(scored.record.num_tokens, 9);
    assert_eq!(scored.record.text_length, 3);
    assert_eq!(scored.record.total_bits, 64.0);
    assert!((scored.record.bits_per_char - 64.0 / 3.0).abs() < 1e-12);
}

#[tokio::test]
async fn empty_text_is_degenerate() {
    let err = char_ngram_scorer().analyze("empty", "").await.unwrap_err();
    assert!(matches!(
        err,
        SurprisalError::DegenerateInput(DegenerateReason::TooFewTokens { count: 0 })
    ));
}

#[tokio::test]
async fn batch_skips_failing_texts_and_keeps_order() {
    let scorer = char_ngram_scorer().model_name("ngram-test");
    let texts = vec![
        TextInput::new("first", "abracadabra"),
        TextInput::new("empty", ""),
        TextInput::new("single", "x"),
        TextInput::new("last", "mississippi"),
    ];

    let report = scorer.analyze_batch(&texts, 3).await;

    let names: Vec<_> = report
        .document
        .results
        .iter()
        .map(|r| r.text_name.as_str())
        .collect();
    assert_eq!(names, ["first", "last"]);
    assert_eq!(report.document.model, "ngram-test");

    let failed: Vec<_> = report.failures.iter().map(|f| f.text_name.as_str()).collect();
    assert_eq!(failed, ["empty", "single"]);
    assert!(report.failures.iter().all(|f| matches!(
        f.error,
        SurprisalError::DegenerateInput(DegenerateReason::TooFewTokens { .. })
    )));
}

#[tokio::test]
async fn batch_results_match_individual_scores() {
    let scorer = char_ngram_scorer();
    let texts: Vec<_> = (0..8)
        .map(|i| TextInput::new(format!("t{i}"), "ab".repeat(i + 2)))
        .collect();

    let report = scorer.analyze_batch(&texts, 4).await;
    assert!(report.failures.is_empty());

    for (input, record) in texts.iter().zip(&report.document.results) {
        let single = scorer.analyze(&input.name, &input.text).await.unwrap();
        assert_eq!(record, &single.record);
    }
}

#[tokio::test]
async fn zero_concurrency_still_scores() {
    let scorer = char_ngram_scorer();
    let report = scorer
        .analyze_batch(&[TextInput::new("a", "hello")], 0)
        .await;
    assert_eq!(report.document.results.len(), 1);
}

#[tokio::test]
async fn model_defaults_to_oracle_name() {
    assert_eq!(char_ngram_scorer().model(), "ngram-2");
}

#[tokio::test]
async fn inspect_lists_each_prediction() {
    let scorer = Scorer::new(Arc::new(ByteTokenizer), Arc::new(UniformOracle::new(256)));
    let inspection = scorer.inspect("abc", 2).await.unwrap();

    assert_eq!(inspection.first.text, "a");
    assert_eq!(inspection.tokens.len(), 2);
    assert_eq!(inspection.tokens[0].token.text, "b");
    assert_eq!(inspection.tokens[0].record.bits, 8.0);
    assert_eq!(inspection.total_bits, 16.0);
    assert_eq!(inspection.character_count, 3);

    // Ties are broken by ascending id.
    let alternative_ids: Vec<_> = inspection.tokens[1]
        .alternatives
        .iter()
        .map(|(token, _)| token.id)
        .collect();
    assert_eq!(alternative_ids, [0, 1]);
}

#[tokio::test]
async fn inspect_allows_perfect_prediction() {
    let text = "hello";
    let oracle = PerfectOracle {
        tokens: text.chars().map(|c| c as TokenId).collect(),
    };
    let scorer = Scorer::new(Arc::new(CharTokenizer), Arc::new(oracle));

    let inspection = scorer.inspect(text, 0).await.unwrap();
    assert_eq!(inspection.total_bits, 0.0);
    assert!(inspection.tokens.iter().all(|t| t.record.probability == 1.0));

    // Scoring the same text cannot produce a ratio.
    let err = scorer.analyze("hello", text).await.unwrap_err();
    assert!(matches!(
        err,
        SurprisalError::DegenerateInput(DegenerateReason::ZeroTotalBits)
    ));
}
