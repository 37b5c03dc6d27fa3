//! Telemetry metric name constants.
//!
//! Centralised metric names for scoring operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `surprisal_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`, `_bits`).
//!
//! # Common labels
//!
//! - `oracle`: oracle name (e.g. "llama-cpp", "ngram-3")
//! - `status`: outcome, "ok" or "error"

/// Total next-token requests sent to a remote oracle.
///
/// Labels: `oracle`, `status` ("ok" | "error").
pub const ORACLE_REQUESTS_TOTAL: &str = "surprisal_oracle_requests_total";

/// Remote oracle request duration in seconds.
///
/// Labels: `oracle`.
pub const ORACLE_REQUEST_DURATION_SECONDS: &str = "surprisal_oracle_request_duration_seconds";

/// Total repeated queries asking a remote oracle for its whole vocabulary
/// because the observed token was outside the top candidates.
///
/// Labels: `oracle`.
pub const ORACLE_FULL_VOCABULARY_QUERIES_TOTAL: &str =
    "surprisal_oracle_full_vocabulary_queries_total";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `oracle`.
pub const ORACLE_RETRIES_TOTAL: &str = "surprisal_oracle_retries_total";

/// Total texts scored.
///
/// Labels: `oracle`, `status` ("ok" | "error").
pub const TEXTS_SCORED_TOTAL: &str = "surprisal_texts_scored_total";

/// Total tokens predicted across scored texts.
///
/// Labels: `oracle`.
pub const TOKENS_SCORED_TOTAL: &str = "surprisal_tokens_scored_total";

/// Bits per character of each successfully scored text.
///
/// Labels: `oracle`.
pub const BITS_PER_CHAR: &str = "surprisal_bits_per_char";

/// Total distribution cache hits.
///
/// Labels: `oracle`.
pub const CACHE_HITS_TOTAL: &str = "surprisal_cache_hits_total";

/// Total distribution cache misses.
///
/// Labels: `oracle`.
pub const CACHE_MISSES_TOTAL: &str = "surprisal_cache_misses_total";
