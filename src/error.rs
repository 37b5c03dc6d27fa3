//! Surprisal error types

use std::fmt;
use std::time::Duration;

use crate::types::TokenId;

/// Why an input cannot produce a meaningful summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegenerateReason {
    /// The source text has no characters, so bits-per-character is undefined.
    EmptyText,
    /// Fewer than two tokens: nothing to predict.
    TooFewTokens { count: usize },
    /// Every prediction was certain, so the compression ratio is undefined.
    ZeroTotalBits,
}

impl fmt::Display for DegenerateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyText => write!(f, "text has zero characters"),
            Self::TooFewTokens { count } => {
                write!(f, "need at least 2 tokens to score, got {count}")
            }
            Self::ZeroTotalBits => write!(f, "total surprisal is zero bits"),
        }
    }
}

/// Surprisal error types
#[derive(Debug, thiserror::Error)]
pub enum SurprisalError {
    // Scoring errors
    /// The oracle assigned the observed token a probability that is
    /// undefined (`None`), non-positive, above one, or not finite.
    #[error("invalid probability for token {token} at position {position}: {}", fmt_probability(.probability))]
    InvalidProbability {
        position: usize,
        token: TokenId,
        probability: Option<f64>,
    },

    #[error("degenerate input: {0}")]
    DegenerateInput(DegenerateReason),

    #[error("invalid distribution: {0}")]
    InvalidDistribution(String),

    // Oracle/network errors
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data error: {0}")]
    DataError(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn fmt_probability(probability: &Option<f64>) -> String {
    match probability {
        Some(p) => p.to_string(),
        None => "undefined".to_string(),
    }
}

impl SurprisalError {
    /// Whether a retry of the same oracle request may succeed.
    ///
    /// Scoring and data errors are permanent: the same prefix yields the
    /// same answer.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::OracleUnavailable(_) | Self::Http(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SurprisalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            SurprisalError::OracleUnavailable(err.to_string())
        } else if err.is_decode() {
            SurprisalError::DataError(err.to_string())
        } else {
            SurprisalError::Http(err.to_string())
        }
    }
}

/// Result type alias for surprisal operations
pub type Result<T> = std::result::Result<T, SurprisalError>;
