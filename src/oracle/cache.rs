//! Opt-in distribution cache.
//!
//! Oracles are pure for a fixed prefix, so a distribution computed once can
//! be reused whenever the same prefix is queried again: re-scoring a text,
//! or texts that share a common header. [`CachingOracle`] sits in front of
//! any oracle (typically a [`RetryingOracle`](super::RetryingOracle)) and
//! short-circuits repeated queries.
//!
//! Keys are a content hash of (oracle name, prefix). Cached values are full
//! distributions, so capacity should be sized with the vocabulary in mind
//! when the inner oracle returns dense vectors.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use super::ProbabilityOracle;
use crate::Result;
use crate::telemetry;
use crate::types::{Distribution, TokenId};

/// Configuration for the distribution cache.
///
/// ```rust
/// # use surprisal::oracle::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(10_000)
///     .ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 4,096.
    pub max_entries: u64,
    /// Time-to-live for cached entries. Default: 1 hour.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 4_096,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Decorator caching distributions by prefix.
pub struct CachingOracle {
    inner: Arc<dyn ProbabilityOracle>,
    cache: Cache<u64, Distribution>,
}

impl CachingOracle {
    pub fn new(inner: Arc<dyn ProbabilityOracle>, config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();
        Self { inner, cache }
    }

    /// Number of cached distributions (approximate until pending
    /// maintenance runs).
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    fn record_hit(&self) {
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "oracle" => self.inner.name().to_owned())
            .increment(1);
    }

    fn record_miss(&self) {
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "oracle" => self.inner.name().to_owned())
            .increment(1);
    }
}

#[async_trait]
impl ProbabilityOracle for CachingOracle {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn next_token_distribution(&self, prefix: &[TokenId]) -> Result<Distribution> {
        let key = cache_key(self.inner.name(), prefix);
        if let Some(dist) = self.cache.get(&key).await {
            self.record_hit();
            return Ok(dist);
        }
        self.record_miss();

        // Errors are not cached.
        let dist = self.inner.next_token_distribution(prefix).await?;
        self.cache.insert(key, dist.clone()).await;
        Ok(dist)
    }

    /// A cached answer that leaves `next` undefined counts as a miss and is
    /// replaced by the wider answer.
    async fn distribution_covering(
        &self,
        prefix: &[TokenId],
        next: TokenId,
    ) -> Result<Distribution> {
        let key = cache_key(self.inner.name(), prefix);
        if let Some(dist) = self.cache.get(&key).await {
            if dist.probability(next).is_some() {
                self.record_hit();
                return Ok(dist);
            }
        }
        self.record_miss();

        let dist = self.inner.distribution_covering(prefix, next).await?;
        self.cache.insert(key, dist.clone()).await;
        Ok(dist)
    }
}

/// Compute a cache key from oracle name and prefix.
fn cache_key(oracle: &str, prefix: &[TokenId]) -> u64 {
    let mut hasher = DefaultHasher::new();
    oracle.hash(&mut hasher);
    prefix.hash(&mut hasher);
    hasher.finish()
}
