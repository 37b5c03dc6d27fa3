//! Model-name resolution in the tokenizer registry.

#![cfg(feature = "local-inference")]

use surprisal::SurprisalError;
use surprisal::tokenizer::{TokenizerRegistry, TokenizerSource};

fn repo_of(source: TokenizerSource) -> String {
    match source {
        TokenizerSource::HuggingFace { repo_id } => repo_id,
        other => panic!("Expected HuggingFace source, got {other:?}"),
    }
}

#[test]
fn test_tokenizer_registry_default_mappings() {
    let registry = TokenizerRegistry::new();

    assert_eq!(
        repo_of(registry.resolve_source("gpt2").unwrap()),
        "openai-community/gpt2"
    );
    assert!(registry.resolve_source("llama-3-70b").is_ok());
    assert!(registry.resolve_source("qwen2.5-7b").is_ok());
}

#[test]
fn test_longest_prefix_wins() {
    let registry = TokenizerRegistry::new();

    // "distilgpt2" is an exact mapping; "gpt2-medium" falls back to "gpt2".
    assert_eq!(
        repo_of(registry.resolve_source("distilgpt2").unwrap()),
        "distilbert/distilgpt2"
    );
    assert_eq!(
        repo_of(registry.resolve_source("gpt2-medium").unwrap()),
        "openai-community/gpt2"
    );
    assert_eq!(
        repo_of(registry.resolve_source("meta-llama-3").unwrap()),
        "meta-llama/Llama-3.2-1B"
    );
}

#[test]
fn test_tokenizer_registry_custom_mapping() {
    let mut registry = TokenizerRegistry::new();

    registry.register(
        "my-custom-model",
        TokenizerSource::HuggingFace {
            repo_id: "custom/tokenizer".to_string(),
        },
    );

    assert_eq!(
        repo_of(registry.resolve_source("my-custom-model").unwrap()),
        "custom/tokenizer"
    );
}

#[test]
fn test_tokenizer_registry_alias() {
    let mut registry = TokenizerRegistry::new();

    registry.register(
        "my-alias",
        TokenizerSource::Alias {
            target: "mistral".to_string(),
        },
    );

    assert_eq!(
        repo_of(registry.resolve_source("my-alias").unwrap()),
        "mistralai/Mistral-7B-v0.1"
    );
}

#[test]
fn test_alias_cycle_is_error() {
    let mut registry = TokenizerRegistry::new();
    registry.register(
        "ping",
        TokenizerSource::Alias {
            target: "pong".to_string(),
        },
    );
    registry.register(
        "pong",
        TokenizerSource::Alias {
            target: "ping".to_string(),
        },
    );

    let err = registry.resolve_source("ping").unwrap_err();
    assert!(matches!(err, SurprisalError::Configuration(_)));
    assert!(err.to_string().contains("Alias cycle detected"));
}

#[test]
fn test_unknown_model_is_error() {
    let registry = TokenizerRegistry::new();
    let err = registry.resolve_source("unheard-of-model").unwrap_err();
    assert!(err.to_string().contains("No tokenizer configured"));
}
