//! Surprisal - compression-based measurement of how well a language model
//! predicts a text.
//!
//! A text is tokenized, a [`ProbabilityOracle`](oracle::ProbabilityOracle)
//! supplies the next-token distribution at every position, and the surprisal
//! `-log2 p` of each observed token is summed. The total is reported as
//! bits-per-character and as a compression ratio against 8 bits per
//! character.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use surprisal::oracle::NgramOracle;
//! use surprisal::scorer::Scorer;
//! use surprisal::tokenizer::ByteTokenizer;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> surprisal::Result<()> {
//! let scorer = Scorer::new(
//!     Arc::new(ByteTokenizer),
//!     Arc::new(NgramOracle::new(2, 256)),
//! );
//!
//! let scored = scorer.analyze("greeting", "hello hello hello").await?;
//! assert!(scored.record.bits_per_char > 0.0);
//! println!("{:.3} bits/char", scored.record.bits_per_char);
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
#[cfg(feature = "cli")]
pub mod config;
pub mod error;
pub mod oracle;
pub mod scorer;
pub mod telemetry;
pub mod tokenizer;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use error::{DegenerateReason, Result, SurprisalError};
pub use oracle::ProbabilityOracle;
pub use scorer::{BatchReport, Scorer, TextFailure, TextInput};
pub use tokenizer::TokenizerProvider;
pub use types::{
    AnalysisSummary, Distribution, ResultRecord, ResultsDocument, ScoreOptions, SurprisalRecord,
    Token, TokenId,
};
pub use version::{PKG_VERSION, version_string};
