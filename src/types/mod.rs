//! Public types for the surprisal API.

mod distribution;
mod options;
mod record;
mod results;
mod token;

pub use distribution::{DISTRIBUTION_TOLERANCE, Distribution};
pub use options::ScoreOptions;
pub use record::{AnalysisSummary, BASELINE_BITS_PER_CHAR, SurprisalRecord};
pub use results::{ResultRecord, ResultsDocument};
pub use token::{Token, TokenId};
