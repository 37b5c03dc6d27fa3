//! Text scoring: tokenizer + oracle + accumulator.
//!
//! [`Scorer`] owns the injected collaborators and turns raw text into
//! [`ResultRecord`]s. Batches run several texts concurrently, never
//! positions within one text, and a failing text is logged and skipped
//! rather than aborting the batch.

use std::sync::Arc;

use futures_util::{StreamExt, stream};
use tracing::{debug, warn};

use crate::accumulator::{self, SurprisalAccumulator};
use crate::oracle::ProbabilityOracle;
use crate::telemetry;
use crate::tokenizer::TokenizerProvider;
use crate::types::{
    AnalysisSummary, ResultRecord, ResultsDocument, ScoreOptions, SurprisalRecord, Token, TokenId,
};
use crate::{Result, SurprisalError};

/// A named text to score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextInput {
    pub name: String,
    pub text: String,
}

impl TextInput {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Outcome of scoring one text.
#[derive(Debug, Clone)]
pub struct ScoredText {
    pub record: ResultRecord,
    pub summary: AnalysisSummary,
}

/// A text that could not be scored.
#[derive(Debug)]
pub struct TextFailure {
    pub text_name: String,
    pub error: SurprisalError,
}

/// Outcome of a batch: results of the texts that scored, and the rest.
#[derive(Debug)]
pub struct BatchReport {
    pub document: ResultsDocument,
    pub failures: Vec<TextFailure>,
}

/// One predicted token with display text for it and its alternatives.
#[derive(Debug, Clone)]
pub struct InspectedToken {
    pub token: Token,
    pub record: SurprisalRecord,
    pub alternatives: Vec<(Token, f64)>,
}

/// Token-by-token view of a text.
///
/// Unlike [`AnalysisSummary`], an inspection is produced even when the
/// total is zero bits, so a perfectly predicted text can still be examined.
#[derive(Debug, Clone)]
pub struct Inspection {
    /// The first token, which is never predicted.
    pub first: Token,
    pub tokens: Vec<InspectedToken>,
    pub total_bits: f64,
    pub character_count: usize,
}

/// Scores texts with an injected tokenizer and oracle.
pub struct Scorer {
    tokenizer: Arc<dyn TokenizerProvider>,
    oracle: Arc<dyn ProbabilityOracle>,
    options: ScoreOptions,
    model_name: Option<String>,
}

impl Scorer {
    pub fn new(tokenizer: Arc<dyn TokenizerProvider>, oracle: Arc<dyn ProbabilityOracle>) -> Self {
        Self {
            tokenizer,
            oracle,
            options: ScoreOptions::default(),
            model_name: None,
        }
    }

    pub fn options(mut self, options: ScoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Model label for results documents (defaults to the oracle name).
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    pub fn model(&self) -> &str {
        self.model_name.as_deref().unwrap_or_else(|| self.oracle.name())
    }

    pub fn tokenizer(&self) -> &Arc<dyn TokenizerProvider> {
        &self.tokenizer
    }

    /// Tokenize and score one text.
    pub async fn analyze(&self, name: &str, text: &str) -> Result<ScoredText> {
        let tokens = self.tokenizer.tokenize(text).await?;
        self.analyze_tokens(name, text, &tokens).await
    }

    /// Score one text whose tokens were produced elsewhere.
    pub async fn analyze_tokens(
        &self,
        name: &str,
        text: &str,
        tokens: &[TokenId],
    ) -> Result<ScoredText> {
        let character_count = text.chars().count();
        debug!(
            text = name,
            character_count,
            num_tokens = tokens.len(),
            oracle = self.oracle.name(),
            "scoring text"
        );

        let result =
            accumulator::score(tokens, character_count, self.oracle.as_ref(), &self.options).await;

        let oracle = self.oracle.name().to_owned();
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::TEXTS_SCORED_TOTAL,
            "oracle" => oracle.clone(),
            "status" => status,
        )
        .increment(1);

        let summary = result?;
        metrics::counter!(telemetry::TOKENS_SCORED_TOTAL, "oracle" => oracle.clone())
            .increment(summary.num_predictions() as u64);
        metrics::histogram!(telemetry::BITS_PER_CHAR, "oracle" => oracle)
            .record(summary.bits_per_char);

        Ok(ScoredText {
            record: ResultRecord::from_summary(name, &summary),
            summary,
        })
    }

    /// Score many texts, at most `concurrency` at a time.
    ///
    /// Results keep input order. Failing texts are logged and reported in
    /// [`BatchReport::failures`]; they do not stop the batch.
    pub async fn analyze_batch(&self, texts: &[TextInput], concurrency: usize) -> BatchReport {
        let outcomes: Vec<(&str, Result<ScoredText>)> = stream::iter(texts)
            .map(|input| async move {
                (
                    input.name.as_str(),
                    self.analyze(&input.name, &input.text).await,
                )
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let mut document = ResultsDocument::new(self.model());
        let mut failures = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(scored) => document.push(scored.record),
                Err(error) => {
                    warn!(text = name, error = %error, "skipping text that failed to score");
                    failures.push(TextFailure {
                        text_name: name.to_string(),
                        error,
                    });
                }
            }
        }
        BatchReport { document, failures }
    }

    /// Score a text token by token, keeping display text and the `top_k`
    /// most probable alternatives at each position.
    pub async fn inspect(&self, text: &str, top_k: usize) -> Result<Inspection> {
        let tokens = self.tokenizer.tokenize(text).await?;
        let character_count = text.chars().count();
        accumulator::check_preconditions(&tokens, character_count)?;

        let mut acc = SurprisalAccumulator::new(ScoreOptions::new().top_k(top_k));
        let mut inspected = Vec::with_capacity(tokens.len() - 1);
        for i in 0..tokens.len() - 1 {
            let dist = self
                .oracle
                .distribution_covering(&tokens[..=i], tokens[i + 1])
                .await?;
            let record = acc.observe(i, tokens[i + 1], &dist)?;

            let mut alternatives = Vec::with_capacity(record.alternatives.len());
            for &(id, p) in &record.alternatives {
                alternatives.push((self.tokenizer.token(id).await, p));
            }
            inspected.push(InspectedToken {
                token: self.tokenizer.token(record.token).await,
                record,
                alternatives,
            });
        }

        Ok(Inspection {
            first: self.tokenizer.token(tokens[0]).await,
            tokens: inspected,
            total_bits: acc.total_bits(),
            character_count,
        })
    }
}
