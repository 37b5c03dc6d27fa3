//! surprisal: compression-based text scoring CLI.
//!
//! Scores texts by how many bits a language model needs to encode them.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{debug, info};

use surprisal::config::{Config, OracleKind, Secrets, TokenizerKind};
use surprisal::oracle::{
    CacheConfig, CachingOracle, LlamaCppClient, NgramOracle, RetryConfig, RetryingOracle,
    UniformOracle,
};
use surprisal::scorer::{Inspection, Scorer, TextInput};
use surprisal::tokenizer::{ByteTokenizer, CharTokenizer};
use surprisal::{ProbabilityOracle, SurprisalError, TokenizerProvider};

/// Surprisal CLI
#[derive(Parser)]
#[command(name = "surprisal")]
#[command(version = surprisal::PKG_VERSION)]
#[command(about = "Measure how well a language model predicts a text")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Oracle supplying next-token probabilities.
    #[arg(long, global = true, value_enum)]
    oracle: Option<OracleKind>,

    /// Tokenizer splitting texts into tokens.
    #[arg(long, global = true, value_enum)]
    tokenizer: Option<TokenizerKind>,

    /// llama.cpp server URL.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// llama.cpp server API key.
    #[arg(long, global = true, env = "SURPRISAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score texts and report bits per character
    Score {
        /// Files to score (or omit to read from stdin)
        files: Vec<PathBuf>,
        /// Name for text read from stdin
        #[arg(short, long, default_value = "stdin")]
        name: String,
        /// Write the results document to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Texts scored at once
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Show the cost of every token
    Inspect {
        /// Text to inspect (or omit to read from stdin)
        text: Option<String>,
        /// Alternatives shown per token
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Count tokens and check the round trip
    Tokens {
        /// Text to tokenize (or omit to read from stdin)
        text: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(kind) = args.oracle {
        config.oracle.kind = kind;
    }
    if let Some(kind) = args.tokenizer {
        config.tokenizer.kind = kind;
    }
    if let Some(url) = args.base_url {
        config.oracle.base_url = url;
    }
    let api_key = match args.api_key {
        Some(key) => Some(key),
        None => Secrets::load()?.llama_cpp_api_key(),
    };

    info!(version = surprisal::version_string(), "surprisal starting");

    let client = build_client(&config, api_key);
    let tokenizer = build_tokenizer(&config, &client)?;

    match args.command {
        Command::Tokens { text } => {
            let text = resolve_text(text, "tokens")?;
            let tokens = tokenizer.tokenize(&text).await?;
            let restored = tokenizer.detokenize(&tokens).await?;
            println!("{} tokens ({})", tokens.len(), tokenizer.name());
            if restored == text {
                println!("round trip: ok");
            } else {
                return Err("round trip: detokenized text differs from input".into());
            }
        }

        Command::Score {
            files,
            name,
            output,
            concurrency,
        } => {
            let scorer = build_scorer(&config, tokenizer, client)?;
            let texts = if files.is_empty() {
                vec![TextInput::new(name, resolve_text(None, "score")?)]
            } else {
                read_files(&files)?
            };

            let concurrency = concurrency.unwrap_or(config.scoring.concurrency);
            let report = scorer.analyze_batch(&texts, concurrency).await;

            for record in &report.document.results {
                println!(
                    "{}: {:.4} bits/char, ratio {:.3} ({} tokens, {:.1} bits)",
                    record.text_name,
                    record.bits_per_char,
                    record.compression_ratio,
                    record.num_tokens,
                    record.total_bits
                );
            }
            for failure in &report.failures {
                eprintln!("{}: {}", failure.text_name, failure.error);
            }
            if !report.failures.is_empty() {
                println!("{} of {} texts failed", report.failures.len(), texts.len());
            }

            if let Some(path) = output.or(config.scoring.output) {
                report.document.write_json(&path)?;
                println!("saved to {}", path.display());
            }

            if report.document.results.is_empty() {
                return Err("score: no text could be scored".into());
            }
        }

        Command::Inspect { text, top_k } => {
            let text = resolve_text(text, "inspect")?;
            let scorer = build_scorer(&config, tokenizer, client)?;
            let inspection = scorer
                .inspect(&text, top_k.unwrap_or(config.scoring.top_k))
                .await?;
            print_inspection(&inspection);
        }
    }

    Ok(())
}

/// Build the llama.cpp client shared by the server tokenizer and oracle.
fn build_client(config: &Config, api_key: Option<String>) -> Arc<LlamaCppClient> {
    let mut client = LlamaCppClient::with_timeout(
        &config.oracle.base_url,
        Duration::from_secs(config.oracle.timeout_secs),
    )
    .n_probs(config.oracle.n_probs);
    if let Some(model) = &config.oracle.model {
        client = client.model_name(model);
    }
    if let Some(n_vocab) = config.oracle.vocab_size {
        client = client.known_vocab_size(n_vocab);
    }
    if let Some(key) = api_key {
        client = client.api_key(key);
    }
    Arc::new(client)
}

fn build_tokenizer(
    config: &Config,
    client: &Arc<LlamaCppClient>,
) -> Result<Arc<dyn TokenizerProvider>, SurprisalError> {
    let tokenizer: Arc<dyn TokenizerProvider> = match config.tokenizer.kind {
        TokenizerKind::Char => Arc::new(CharTokenizer),
        TokenizerKind::Byte => Arc::new(ByteTokenizer),
        TokenizerKind::Server => client.clone(),
        TokenizerKind::Huggingface => build_hf_tokenizer(config)?,
    };
    debug!(tokenizer = tokenizer.name(), "tokenizer ready");
    Ok(tokenizer)
}

#[cfg(feature = "local-inference")]
fn build_hf_tokenizer(config: &Config) -> Result<Arc<dyn TokenizerProvider>, SurprisalError> {
    use surprisal::tokenizer::{HfTokenizer, TokenizerRegistry};

    if let Some(path) = &config.tokenizer.path {
        return Ok(Arc::new(HfTokenizer::from_file(path)?));
    }
    let model = config.tokenizer.model.as_deref().ok_or_else(|| {
        SurprisalError::Configuration(
            "huggingface tokenizer needs tokenizer.model or tokenizer.path".to_string(),
        )
    })?;
    TokenizerRegistry::new().get(model)
}

#[cfg(not(feature = "local-inference"))]
fn build_hf_tokenizer(_config: &Config) -> Result<Arc<dyn TokenizerProvider>, SurprisalError> {
    Err(SurprisalError::Configuration(
        "huggingface tokenizer requires the local-inference feature".to_string(),
    ))
}

/// Build the scorer: oracle from config, wrapped in retry and cache layers.
fn build_scorer(
    config: &Config,
    tokenizer: Arc<dyn TokenizerProvider>,
    client: Arc<LlamaCppClient>,
) -> Result<Scorer, SurprisalError> {
    let vocab_size = || {
        config
            .oracle
            .vocab_size
            .or_else(|| tokenizer.vocab_size())
            .ok_or_else(|| {
                SurprisalError::Configuration(format!(
                    "oracle.vocab_size must be set when using the {} tokenizer",
                    tokenizer.name()
                ))
            })
    };

    let mut oracle: Arc<dyn ProbabilityOracle> = match config.oracle.kind {
        OracleKind::Uniform => Arc::new(UniformOracle::new(vocab_size()?)),
        OracleKind::Ngram => {
            let mut ngram = NgramOracle::new(config.oracle.ngram_order, vocab_size()?);
            if let Some(alpha) = config.oracle.ngram_alpha {
                ngram = ngram.alpha(alpha);
            }
            Arc::new(ngram)
        }
        OracleKind::LlamaCpp => Arc::new(RetryingOracle::new(
            client,
            RetryConfig::from(&config.retry),
        )),
    };
    if config.cache.enabled {
        oracle = Arc::new(CachingOracle::new(oracle, &CacheConfig::from(&config.cache)));
    }

    let mut scorer = Scorer::new(tokenizer, oracle);
    if let Some(model) = &config.oracle.model {
        scorer = scorer.model_name(model);
    }
    Ok(scorer)
}

/// Read each file as one text, named by its path.
fn read_files(paths: &[PathBuf]) -> Result<Vec<TextInput>, SurprisalError> {
    paths
        .iter()
        .map(|path| -> Result<TextInput, SurprisalError> {
            Ok(TextInput::new(text_name(path), std::fs::read_to_string(path)?))
        })
        .collect()
}

fn text_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Resolve text input from an optional CLI argument and/or stdin.
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_text = if io::stdin().is_terminal() {
        None
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Some(buf)
    };
    combine_input(arg, stdin_text, command)
}

/// Join the argument and piped stdin into one text.
///
/// Combination rules:
/// - arg only → arg
/// - stdin only → stdin
/// - both → `"{arg}\n\n{stdin}"`
/// - neither → error
///
/// Input is kept byte for byte, since its length is what gets scored. Input
/// that is empty or only whitespace counts as absent.
fn combine_input(
    arg: Option<String>,
    stdin_text: Option<String>,
    command: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let present = |text: &String| !text.trim().is_empty();
    match (arg.filter(present), stdin_text.filter(present)) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass text as argument or via stdin)").into())
        }
    }
}

/// Display the per-token table of an inspection.
fn print_inspection(inspection: &Inspection) {
    println!("{:>6}  {:<16} {:>10} {:>8}  alternatives", "pos", "token", "p", "bits");
    println!("{:>6}  {:<16}", "-", inspection.first.display_text());

    for item in &inspection.tokens {
        let alternatives = item
            .alternatives
            .iter()
            .map(|(token, p)| format!("{} ({p:.4})", token.display_text()))
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:>6}  {:<16} {:>10.6} {:>8.3}  {alternatives}",
            item.record.position + 1,
            item.token.display_text(),
            item.record.probability,
            item.record.bits
        );
    }

    println!();
    println!("total bits:  {:.3}", inspection.total_bits);
    println!("characters:  {}", inspection.character_count);
    if inspection.total_bits > 0.0 && inspection.character_count > 0 {
        let bits_per_char = inspection.total_bits / inspection.character_count as f64;
        println!("bits/char:   {bits_per_char:.4}");
        println!(
            "ratio:       {:.3}",
            surprisal::types::BASELINE_BITS_PER_CHAR / bits_per_char
        );
    }
}
