pub mod anthropic;
pub mod fallback;
pub mod mock;
pub mod ollama;
mod stream;

use crate::llm::{BackendError, CompletionBackend, CompletionParams};
use std::sync::Arc;
use std::time::Duration;
use tengwar_core::config::BackendConfig;

/// Build the backend chain described by `config`, fallbacks included.
pub fn build_backend(config: &BackendConfig) -> Result<Arc<dyn CompletionBackend>, BackendError> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    let primary: Arc<dyn CompletionBackend> = match config.provider.as_str() {
        "ollama" => Arc::new(ollama::OllamaClient::new(
            &config.model,
            config.base_url.as_deref(),
            timeout,
        )?),
        "anthropic" => {
            let client = anthropic::AnthropicClient::new(
                &config.model,
                config.api_key.clone(),
                config.base_url.as_deref(),
                timeout,
            )?;
            if !client.has_api_key() {
                if let Some(fb) = &config.fallback {
                    tracing::warn!("No Anthropic API key; using {} directly", fb.provider);
                    return build_backend(fb);
                }
            }
            Arc::new(client)
        }
        "mock" => Arc::new(mock::MockProvider::new(&config.model)),
        other => {
            return Err(BackendError::Api(format!("unknown provider '{}'", other)));
        }
    };

    match &config.fallback {
        Some(fb) => Ok(Arc::new(fallback::FallbackBackend::new(primary, build_backend(fb)?))),
        None => Ok(primary),
    }
}

/// Sampling parameters configured for a backend.
pub fn params_for(config: &BackendConfig) -> CompletionParams {
    CompletionParams {
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_default_chains() {
        let thought = build_backend(&BackendConfig::default()).unwrap();
        assert_eq!(thought.name(), "ollama:qwen2.5:3b");

        // no key: the fallback is used on its own
        let mut dialogue = BackendConfig::dialogue_default();
        dialogue.api_key = None;
        assert_eq!(build_backend(&dialogue).unwrap().name(), "ollama:qwen2.5:7b");

        dialogue.api_key = Some("sk-test".to_string());
        assert_eq!(
            build_backend(&dialogue).unwrap().name(),
            "anthropic:claude-haiku-4-5-20251001 -> ollama:qwen2.5:7b"
        );
    }

    #[test]
    fn test_unknown_provider() {
        let cfg = BackendConfig {
            provider: "gpt-oracle".to_string(),
            ..BackendConfig::default()
        };
        assert!(build_backend(&cfg).is_err());
    }

    #[test]
    fn test_params_for() {
        let p = params_for(&BackendConfig::dialogue_default());
        assert_eq!(p.max_tokens, 2048);
        assert!((p.temperature - 0.7).abs() < 1e-6);
    }
}
