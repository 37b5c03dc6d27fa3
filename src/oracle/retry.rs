//! Retry configuration, delay calculation, and the retrying oracle decorator.
//!
//! Retry policy lives in the oracle's transport layer, never in the
//! accumulator: [`RetryingOracle`] retries a single prefix query on transient
//! errors and, once attempts are exhausted, hands the last error to the
//! caller, which aborts the whole text.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::ProbabilityOracle;
use crate::telemetry;
use crate::types::{Distribution, TokenId};
use crate::{Result, SurprisalError};

/// Configuration for retry behaviour on transient errors.
///
/// ```rust
/// # use surprisal::oracle::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200))
///     .attempt_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 500ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
    /// Deadline for a single attempt. An elapsed attempt counts as
    /// `OracleUnavailable`. Default: none.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            attempt_timeout: None,
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the per-attempt deadline.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Uses exponential backoff: `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Calculate the effective delay, respecting server `retry_after` hints.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

/// Execute an async operation with retry logic.
///
/// Retries on transient errors (as classified by
/// [`SurprisalError::is_transient()`]) up to `config.max_attempts`.
/// Permanent errors are returned immediately.
pub(crate) async fn with_retry<F, Fut, T>(config: &RetryConfig, oracle_name: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts.max(1) {
        let outcome = match config.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, f()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(SurprisalError::OracleUnavailable(format!(
                    "no response within {limit:?}"
                ))),
            },
            None => f().await,
        };
        match outcome {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() => {
                if attempt + 1 < config.max_attempts {
                    metrics::counter!(telemetry::ORACLE_RETRIES_TOTAL,
                        "oracle" => oracle_name.to_owned(),
                    )
                    .increment(1);
                    let delay = config.effective_delay(attempt, e.retry_after());
                    warn!(
                        oracle = oracle_name,
                        attempt = attempt + 1,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e), // permanent error, no retry
        }
    }
    Err(last_err.unwrap_or_else(|| {
        SurprisalError::OracleUnavailable(format!("{oracle_name}: no attempts made"))
    }))
}

/// Decorator that wraps a [`ProbabilityOracle`] with retry and timeout logic.
pub struct RetryingOracle {
    inner: Arc<dyn ProbabilityOracle>,
    config: RetryConfig,
}

impl RetryingOracle {
    /// Wrap an oracle with retry logic.
    pub fn new(inner: Arc<dyn ProbabilityOracle>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl ProbabilityOracle for RetryingOracle {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn next_token_distribution(&self, prefix: &[TokenId]) -> Result<Distribution> {
        with_retry(&self.config, self.inner.name(), || {
            self.inner.next_token_distribution(prefix)
        })
        .await
    }

    async fn distribution_covering(
        &self,
        prefix: &[TokenId],
        next: TokenId,
    ) -> Result<Distribution> {
        with_retry(&self.config, self.inner.name(), || {
            self.inner.distribution_covering(prefix, next)
        })
        .await
    }
}
