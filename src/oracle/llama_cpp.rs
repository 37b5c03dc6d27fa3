//! llama.cpp server client.
//!
//! Queries a running `llama-server` for next-token probabilities and exposes
//! the server's own tokenizer, so token ids always match the model's
//! vocabulary.
//!
//! Each query sends the prefix as a token array to `/completion` with
//! `n_predict = 1` and `n_probs = N`; the server answers with the `N` most
//! probable next tokens and their log-probabilities. The result is a
//! [`Distribution::Sparse`].
//!
//! When scoring, the observed token is usually among the top `N`. When it
//! is not, the same prefix is queried again with `n_probs` equal to the
//! model's vocabulary size (from `/v1/models`, or set explicitly), so the
//! cost always uses the exact probability. Both answers come from the same
//! full softmax and agree on every token they share.
//!
//! See: <https://github.com/ggml-org/llama.cpp/tree/master/tools/server>

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use super::ProbabilityOracle;
use crate::telemetry;
use crate::tokenizer::TokenizerProvider;
use crate::types::{Distribution, TokenId};
use crate::{Result, SurprisalError};

/// Default base URL of a local llama.cpp server.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// Default number of candidate tokens requested per position.
pub const DEFAULT_N_PROBS: usize = 100;

/// Client for the llama.cpp server HTTP API.
#[derive(Clone)]
pub struct LlamaCppClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    n_probs: usize,
    n_vocab: Arc<OnceCell<usize>>,
    name: String,
}

impl LlamaCppClient {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(60))
    }

    /// Create a client whose HTTP requests time out after `timeout`.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            n_probs: DEFAULT_N_PROBS,
            n_vocab: Arc::new(OnceCell::new()),
            name: "llama-cpp".to_string(),
        }
    }

    /// Send `Authorization: Bearer <key>` (server started with `--api-key`).
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Number of candidate tokens requested per position.
    pub fn n_probs(mut self, n: usize) -> Self {
        self.n_probs = n;
        self
    }

    /// Vocabulary size of the served model, instead of asking the server.
    pub fn known_vocab_size(mut self, n_vocab: usize) -> Self {
        self.n_vocab = Arc::new(OnceCell::new_with(Some(n_vocab)));
        self
    }

    /// Model label used in logs, metrics and results documents.
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Tokenize with the server's tokenizer, without special tokens.
    pub async fn tokenize(&self, text: &str) -> Result<Vec<TokenId>> {
        let response = self
            .post("/tokenize")
            .json(&TokenizeRequest {
                content: text,
                add_special: false,
            })
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: TokenizeResponse = response.json().await?;
        Ok(body.tokens)
    }

    /// Detokenize with the server's tokenizer.
    pub async fn detokenize(&self, tokens: &[TokenId]) -> Result<String> {
        let response = self
            .post("/detokenize")
            .json(&DetokenizeRequest { tokens })
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: DetokenizeResponse = response.json().await?;
        Ok(body.content)
    }

    /// Vocabulary size of the served model, fetched once from `/v1/models`.
    pub async fn n_vocab(&self) -> Result<usize> {
        self.n_vocab
            .get_or_try_init(|| async {
                let mut request = self.http.get(format!("{}/v1/models", self.base_url));
                if let Some(key) = &self.api_key {
                    request = request.header("Authorization", format!("Bearer {key}"));
                }
                let response = check_status(request.send().await?).await?;
                let body: ModelsResponse = response.json().await?;
                body.data
                    .into_iter()
                    .find_map(|model| model.meta.and_then(|meta| meta.n_vocab))
                    .ok_or_else(|| {
                        SurprisalError::DataError(
                            "server did not report the vocabulary size".into(),
                        )
                    })
            })
            .await
            .copied()
    }

    /// Top-N next-token distribution after `prefix`.
    pub async fn next_token_distribution(&self, prefix: &[TokenId]) -> Result<Distribution> {
        self.timed_request(prefix, self.n_probs).await
    }

    /// Top-N distribution after `prefix`, widened to the whole vocabulary
    /// when `next` is not among the top N.
    pub async fn distribution_covering(
        &self,
        prefix: &[TokenId],
        next: TokenId,
    ) -> Result<Distribution> {
        let dist = self.timed_request(prefix, self.n_probs).await?;
        if dist.probability(next).is_some() {
            return Ok(dist);
        }

        let n_vocab = self.n_vocab().await?;
        if n_vocab <= self.n_probs {
            // Already the whole vocabulary.
            return Ok(dist);
        }
        debug!(
            prefix_len = prefix.len(),
            token = next,
            n_vocab,
            "token outside top candidates, querying full vocabulary"
        );
        metrics::counter!(telemetry::ORACLE_FULL_VOCABULARY_QUERIES_TOTAL,
            "oracle" => self.name.clone(),
        )
        .increment(1);
        self.timed_request(prefix, n_vocab).await
    }

    async fn timed_request(&self, prefix: &[TokenId], n_probs: usize) -> Result<Distribution> {
        let start = Instant::now();
        let result = self.request_distribution(prefix, n_probs).await;

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::ORACLE_REQUESTS_TOTAL,
            "oracle" => self.name.clone(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::ORACLE_REQUEST_DURATION_SECONDS,
            "oracle" => self.name.clone(),
        )
        .record(start.elapsed().as_secs_f64());

        result
    }

    async fn request_distribution(&self, prefix: &[TokenId], n_probs: usize) -> Result<Distribution> {
        let response = self
            .post("/completion")
            .json(&CompletionRequest {
                prompt: prefix,
                n_predict: 1,
                n_probs,
                temperature: 0.0,
                cache_prompt: true,
            })
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: CompletionResponse = response.json().await?;

        let first = body
            .completion_probabilities
            .into_iter()
            .next()
            .ok_or_else(|| {
                SurprisalError::DataError("server returned no completion probabilities".into())
            })?;
        debug!(
            prefix_len = prefix.len(),
            candidates = first.top_logprobs.len(),
            "received next-token candidates"
        );

        // Float noise can push a near-certain log-probability slightly above 0.
        Distribution::from_logprobs(
            first
                .top_logprobs
                .into_iter()
                .map(|candidate| (candidate.id, candidate.logprob.min(0.0))),
        )
    }

    fn post(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let request = self.http.post(format!("{}{}", self.base_url, endpoint));
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }
}

/// Check response status and map to the appropriate error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        401 => Err(SurprisalError::AuthenticationFailed),
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(SurprisalError::RateLimited { retry_after })
        }
        // The server answers 503 while the model is still loading.
        503 => Err(SurprisalError::OracleUnavailable(
            "model is loading".to_string(),
        )),
        code => {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("llama.cpp server error: {status}"));
            Err(SurprisalError::Api {
                status: code,
                message,
            })
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a [TokenId],
    n_predict: u32,
    n_probs: usize,
    temperature: f32,
    cache_prompt: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    completion_probabilities: Vec<CompletionProbability>,
}

#[derive(Deserialize)]
struct CompletionProbability {
    #[serde(default)]
    top_logprobs: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    id: TokenId,
    logprob: f64,
}

#[derive(Serialize)]
struct TokenizeRequest<'a> {
    content: &'a str,
    add_special: bool,
}

#[derive(Deserialize)]
struct TokenizeResponse {
    tokens: Vec<TokenId>,
}

#[derive(Serialize)]
struct DetokenizeRequest<'a> {
    tokens: &'a [TokenId],
}

#[derive(Deserialize)]
struct DetokenizeResponse {
    content: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    meta: Option<ModelMeta>,
}

#[derive(Deserialize)]
struct ModelMeta {
    n_vocab: Option<usize>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

// ============================================================================
// Trait Implementations
// ============================================================================

#[async_trait]
impl ProbabilityOracle for LlamaCppClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_token_distribution(&self, prefix: &[TokenId]) -> Result<Distribution> {
        LlamaCppClient::next_token_distribution(self, prefix).await
    }

    async fn distribution_covering(
        &self,
        prefix: &[TokenId],
        next: TokenId,
    ) -> Result<Distribution> {
        LlamaCppClient::distribution_covering(self, prefix, next).await
    }
}

/// The server's tokenizer; its vocabulary size is known once set or fetched.
#[async_trait]
impl TokenizerProvider for LlamaCppClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn vocab_size(&self) -> Option<usize> {
        self.n_vocab.get().copied()
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<TokenId>> {
        LlamaCppClient::tokenize(self, text).await
    }

    async fn detokenize(&self, tokens: &[TokenId]) -> Result<String> {
        LlamaCppClient::detokenize(self, tokens).await
    }
}
