//! Results documents read back by downstream tooling.
//!
//! Field names are a stable contract: `text_name`, `text_length`,
//! `num_tokens`, `bits_per_char`, `compression_ratio`, `total_bits`, grouped
//! under a document with `model`, `timestamp` and `results`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::AnalysisSummary;
use crate::Result;

/// Summary of one scored text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub text_name: String,
    /// Character count of the source text.
    pub text_length: usize,
    pub num_tokens: usize,
    pub bits_per_char: f64,
    pub compression_ratio: f64,
    pub total_bits: f64,
}

impl ResultRecord {
    pub fn from_summary(text_name: impl Into<String>, summary: &AnalysisSummary) -> Self {
        Self {
            text_name: text_name.into(),
            text_length: summary.character_count,
            num_tokens: summary.num_tokens,
            bits_per_char: summary.bits_per_char,
            compression_ratio: summary.compression_ratio,
            total_bits: summary.total_bits,
        }
    }
}

/// A collection of result records for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsDocument {
    pub model: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub results: Vec<ResultRecord>,
}

impl ResultsDocument {
    /// Empty document stamped with the current time.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            timestamp: Utc::now(),
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, record: ResultRecord) {
        self.results.push(record);
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the document as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
