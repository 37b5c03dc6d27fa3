//! Scoring options

use serde::{Deserialize, Serialize};

/// Options for a scoring pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreOptions {
    /// Number of most probable alternatives to attach to each record.
    /// 0 disables the lookup. Never affects the cost.
    #[serde(default)]
    pub top_k: usize,
    /// Keep per-position records in the summary.
    #[serde(default)]
    pub keep_records: bool,
}

impl ScoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn keep_records(mut self, keep: bool) -> Self {
        self.keep_records = keep;
        self
    }
}
