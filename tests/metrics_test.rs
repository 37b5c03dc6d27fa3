//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use surprisal::oracle::{
    CacheConfig, CachingOracle, LlamaCppClient, RetryConfig, RetryingOracle, UniformOracle,
};
use surprisal::scorer::Scorer;
use surprisal::telemetry;
use surprisal::tokenizer::ByteTokenizer;
use surprisal::{Distribution, ProbabilityOracle, Result, SurprisalError, TokenId};

// ============================================================================
// Mock oracles
// ============================================================================

/// Fails once, then answers uniformly.
struct FailOnceOracle {
    calls: AtomicU32,
}

#[async_trait]
impl ProbabilityOracle for FailOnceOracle {
    fn name(&self) -> &str {
        "fail-once"
    }

    async fn next_token_distribution(&self, _prefix: &[TokenId]) -> Result<Distribution> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(SurprisalError::OracleUnavailable("warming up".to_string()))
        } else {
            Distribution::uniform(256)
        }
    }
}

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Check if any histogram entries exist for a given metric name.
fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` ensures the sync `with_local_recorder` closure stays
/// on the current thread while `block_on` drives the inner async work.
fn record<F: Future>(future: F) -> (F::Output, Snapshotter) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let output = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
    });
    (output, snapshotter)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn scoring_records_text_and_token_metrics() {
    let (result, snapshotter) = record(async {
        let scorer = Scorer::new(Arc::new(ByteTokenizer), Arc::new(UniformOracle::new(256)));
        scorer.analyze("hello", "hello").await
    });
    assert!(result.is_ok());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::TEXTS_SCORED_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::TOKENS_SCORED_TOTAL), 4);
    assert!(has_histogram(&snapshot, telemetry::BITS_PER_CHAR));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn failed_text_is_counted() {
    let (result, snapshotter) = record(async {
        let scorer = Scorer::new(Arc::new(ByteTokenizer), Arc::new(UniformOracle::new(256)));
        scorer.analyze("single", "x").await
    });
    assert!(result.is_err());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::TEXTS_SCORED_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::TOKENS_SCORED_TOTAL), 0);
    assert!(!has_histogram(&snapshot, telemetry::BITS_PER_CHAR));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn cache_records_hits_and_misses() {
    let (_, snapshotter) = record(async {
        let cache = CachingOracle::new(Arc::new(UniformOracle::new(4)), &CacheConfig::new());
        let prefixes: [&[TokenId]; 4] = [&[1], &[1], &[1, 2], &[1]];
        for prefix in prefixes {
            cache.next_token_distribution(prefix).await.unwrap();
        }
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL), 2);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn retries_are_counted() {
    let (result, snapshotter) = record(async {
        let inner = Arc::new(FailOnceOracle {
            calls: AtomicU32::new(0),
        });
        let config = RetryConfig::new().initial_delay(Duration::from_millis(1));
        RetryingOracle::new(inner, config)
            .next_token_distribution(&[1])
            .await
    });
    assert!(result.is_ok());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::ORACLE_RETRIES_TOTAL), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn llama_cpp_requests_are_timed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "completion_probabilities": [{"top_logprobs": [{"id": 1, "logprob": -0.1}]}]
        })))
        .mount(&mock_server)
        .await;

    let (result, snapshotter) = record(async {
        LlamaCppClient::new(mock_server.uri())
            .next_token_distribution(&[0])
            .await
    });
    assert!(result.is_ok());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::ORACLE_REQUESTS_TOTAL), 1);
    assert!(has_histogram(
        &snapshot,
        telemetry::ORACLE_REQUEST_DURATION_SECONDS
    ));
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let scorer = Scorer::new(Arc::new(ByteTokenizer), Arc::new(UniformOracle::new(256)));
    scorer.analyze("hello", "hello").await.unwrap();
}
