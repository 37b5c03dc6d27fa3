//! Tests for the retry/timeout decorator.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use surprisal::oracle::{RetryConfig, RetryingOracle};
use surprisal::{Distribution, ProbabilityOracle, Result, SurprisalError, TokenId};

/// Fails with the given error for the first `failures` calls.
struct FlakyOracle {
    calls: AtomicU32,
    failures: u32,
    error: fn() -> SurprisalError,
}

impl FlakyOracle {
    fn new(failures: u32, error: fn() -> SurprisalError) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            failures,
            error,
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProbabilityOracle for FlakyOracle {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn next_token_distribution(&self, _prefix: &[TokenId]) -> Result<Distribution> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Err((self.error)())
        } else {
            Distribution::uniform(4)
        }
    }
}

/// Never answers within a reasonable time.
struct SlowOracle {
    calls: AtomicU32,
}

#[async_trait]
impl ProbabilityOracle for SlowOracle {
    fn name(&self) -> &str {
        "slow"
    }

    async fn next_token_distribution(&self, _prefix: &[TokenId]) -> Result<Distribution> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Distribution::uniform(4)
    }
}

fn unavailable() -> SurprisalError {
    SurprisalError::OracleUnavailable("connection refused".to_string())
}

fn fast_retries(max_attempts: u32) -> RetryConfig {
    RetryConfig::new()
        .max_attempts(max_attempts)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let inner = FlakyOracle::new(2, unavailable);
    let oracle = RetryingOracle::new(inner.clone(), fast_retries(3));

    let dist = oracle.next_token_distribution(&[1]).await.unwrap();
    assert_eq!(dist.probability(0), Some(0.25));
    assert_eq!(inner.calls(), 3);
}

#[tokio::test]
async fn exhausted_retries_return_last_error() {
    let inner = FlakyOracle::new(u32::MAX, unavailable);
    let oracle = RetryingOracle::new(inner.clone(), fast_retries(3));

    let err = oracle.next_token_distribution(&[1]).await.unwrap_err();
    assert!(matches!(err, SurprisalError::OracleUnavailable(_)));
    assert_eq!(inner.calls(), 3);
}

#[tokio::test]
async fn permanent_errors_are_not_retried() {
    let inner = FlakyOracle::new(u32::MAX, || SurprisalError::AuthenticationFailed);
    let oracle = RetryingOracle::new(inner.clone(), fast_retries(5));

    let err = oracle.next_token_distribution(&[1]).await.unwrap_err();
    assert!(matches!(err, SurprisalError::AuthenticationFailed));
    assert_eq!(inner.calls(), 1);
}

#[tokio::test]
async fn disabled_config_makes_one_attempt() {
    let inner = FlakyOracle::new(1, unavailable);
    let oracle = RetryingOracle::new(inner.clone(), RetryConfig::disabled());

    assert!(oracle.next_token_distribution(&[1]).await.is_err());
    assert_eq!(inner.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn elapsed_attempt_becomes_unavailable() {
    let inner = Arc::new(SlowOracle {
        calls: AtomicU32::new(0),
    });
    let oracle = RetryingOracle::new(
        inner.clone(),
        fast_retries(2).attempt_timeout(Duration::from_millis(50)),
    );

    let err = oracle.next_token_distribution(&[1]).await.unwrap_err();
    assert!(matches!(err, SurprisalError::OracleUnavailable(_)));
    assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_is_honoured() {
    let inner = FlakyOracle::new(1, || SurprisalError::RateLimited {
        retry_after: Some(Duration::from_secs(7)),
    });
    let oracle = RetryingOracle::new(inner.clone(), fast_retries(2));

    let start = tokio::time::Instant::now();
    oracle.next_token_distribution(&[1]).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(7));
    assert_eq!(inner.calls(), 2);
}

#[test]
fn effective_delay_prefers_server_hint() {
    let config = RetryConfig::new().initial_delay(Duration::from_millis(100));
    assert_eq!(config.effective_delay(0, None), Duration::from_millis(100));
    assert_eq!(
        config.effective_delay(0, Some(Duration::from_secs(3))),
        Duration::from_secs(3)
    );
}
