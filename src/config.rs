//! Configuration loading for the `surprisal` CLI.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.surprisal/config.toml` (user)
//! 3. `/etc/surprisal/config.toml` (system)
//!
//! When no file exists the built-in defaults are used. Secrets are loaded
//! separately with mandatory permission checks:
//! 1. `~/.surprisal/secrets.toml` (user, must be 0600)
//! 2. `/etc/surprisal/secrets.toml` (system, must be 0600)

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::oracle::llama_cpp::{DEFAULT_BASE_URL, DEFAULT_N_PROBS};
use crate::oracle::{CacheConfig, RetryConfig};
use crate::{Result, SurprisalError};

/// CLI configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub tokenizer: TokenizerConfig,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// Which oracle supplies next-token distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OracleKind {
    /// Same probability for every token.
    Uniform,
    /// Adaptive n-gram model built from the text itself.
    Ngram,
    /// A running llama.cpp server.
    #[default]
    LlamaCpp,
}

/// Which tokenizer splits texts into tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TokenizerKind {
    /// One token per Unicode scalar value.
    Char,
    /// One token per UTF-8 byte.
    Byte,
    /// The llama.cpp server's own tokenizer.
    #[default]
    Server,
    /// A HuggingFace tokenizer (requires the `local-inference` feature).
    Huggingface,
}

/// Oracle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub kind: OracleKind,
    /// llama.cpp server URL (default: http://127.0.0.1:8080).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Candidates requested per position from the server (default: 100).
    #[serde(default = "default_n_probs")]
    pub n_probs: usize,
    /// HTTP request timeout in seconds (default: 60).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Model label written to results documents.
    #[serde(default)]
    pub model: Option<String>,
    /// Context length of the n-gram oracle (default: 3).
    #[serde(default = "default_ngram_order")]
    pub ngram_order: usize,
    /// Additive smoothing of the n-gram oracle. Defaults to one pseudo-count
    /// spread over the whole vocabulary (`1 / vocab_size`).
    #[serde(default)]
    pub ngram_alpha: Option<f64>,
    /// Vocabulary size for the uniform and n-gram oracles. Defaults to the
    /// tokenizer's vocabulary size.
    #[serde(default)]
    pub vocab_size: Option<usize>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            kind: OracleKind::default(),
            base_url: default_base_url(),
            n_probs: default_n_probs(),
            timeout_secs: default_timeout(),
            model: None,
            ngram_order: default_ngram_order(),
            ngram_alpha: None,
            vocab_size: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_n_probs() -> usize {
    DEFAULT_N_PROBS
}

fn default_timeout() -> u64 {
    60
}

fn default_ngram_order() -> usize {
    3
}

/// Tokenizer configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default)]
    pub kind: TokenizerKind,
    /// Model name resolved through the tokenizer registry (e.g. "gpt2").
    #[serde(default)]
    pub model: Option<String>,
    /// Local `tokenizer.json`; takes precedence over `model`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Retry settings for oracle calls.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Per-attempt timeout; unset means only the HTTP timeout applies.
    #[serde(default)]
    pub attempt_timeout_secs: Option<u64>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            attempt_timeout_secs: None,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl From<&RetrySection> for RetryConfig {
    fn from(section: &RetrySection) -> Self {
        let config = RetryConfig::new()
            .max_attempts(section.max_attempts)
            .initial_delay(Duration::from_millis(section.initial_delay_ms))
            .max_delay(Duration::from_millis(section.max_delay_ms));
        match section.attempt_timeout_secs {
            Some(secs) => config.attempt_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }
}

/// Distribution cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_max_entries() -> u64 {
    4_096
}

fn default_ttl_secs() -> u64 {
    3600
}

impl From<&CacheSection> for CacheConfig {
    fn from(section: &CacheSection) -> Self {
        CacheConfig::new()
            .max_entries(section.max_entries)
            .ttl(Duration::from_secs(section.ttl_secs))
    }
}

/// Scoring defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Texts scored at once by `score` (default: 4).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Alternatives shown per token by `inspect` (default: 5).
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Where `score` writes the results document.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            top_k: default_top_k(),
            output: None,
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_top_k() -> usize {
    5
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub llama_cpp: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist; otherwise the first file found wins, and
    /// defaults are used when there is none.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse a specific config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SurprisalError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            SurprisalError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(SurprisalError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".surprisal").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/surprisal/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (the key may come from the
    /// command line or `SURPRISAL_API_KEY`).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".surprisal").join("secrets.toml");
            if user_secrets.exists() {
                Self::check_permissions(&user_secrets)?;
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/surprisal/secrets.toml");
        if system_secrets.exists() {
            Self::check_permissions(&system_secrets)?;
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Parse a specific secrets file after checking its permissions.
    pub fn load_checked(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        Self::load_from_file(path)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SurprisalError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            SurprisalError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            SurprisalError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(SurprisalError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// API key for the llama.cpp server, if one is stored.
    pub fn llama_cpp_api_key(&self) -> Option<String> {
        self.llama_cpp.as_ref().map(|s| s.api_key.clone())
    }
}
