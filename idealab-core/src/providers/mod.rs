//! Model backend implementations.
//!
//! Provides concrete implementations of the `LlmProvider` trait for:
//! - OpenAI-compatible APIs (OpenAI, Azure, Ollama, vLLM, LM Studio)
//! - Anthropic Messages API (Claude models)
//!
//! Use `create_provider()` to instantiate the appropriate provider based on
//! config, and `ResilientCaller` to wrap a primary/fallback pair.

pub mod anthropic;
pub mod openai_compat;
pub mod resilient;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatibleProvider;
pub use resilient::{BackendRole, ResilientCaller, compute_backoff};

/// Create a provider from its configuration.
///
/// The API key is read from the environment variable named in
/// `config.api_key_env`. Local OpenAI-compatible servers (a `base_url`
/// pointing at localhost) may run without a key.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let api_key = resolve_api_key(config)?;
    match config.provider.as_str() {
        "openai" | "azure" | "ollama" | "local" => {
            Ok(Arc::new(OpenAiCompatibleProvider::new(config, api_key)?))
        }
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(config, api_key)?)),
        other => Err(LlmError::ApiRequest {
            message: format!("Unknown provider '{}'", other),
        }),
    }
}

/// Resolve the API key for a provider from its environment variable.
pub fn resolve_api_key(config: &LlmConfig) -> Result<String, LlmError> {
    match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ if is_local_endpoint(config) => Ok(String::new()),
        _ => Err(LlmError::AuthFailed {
            provider: format!(
                "{} (env var '{}' not set)",
                config.provider, config.api_key_env
            ),
        }),
    }
}

fn is_local_endpoint(config: &LlmConfig) -> bool {
    config
        .base_url
        .as_deref()
        .is_some_and(|url| url.contains("localhost") || url.contains("127.0.0.1"))
}

/// Build the shared HTTP client with the configured per-request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LlmError::Connection {
            message: format!("Failed to build HTTP client: {}", e),
        })
}

pub(crate) fn map_transport_error(err: reqwest::Error, timeout_secs: u64) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout { timeout_secs }
    } else if err.is_connect() {
        LlmError::Connection {
            message: err.to_string(),
        }
    } else {
        LlmError::ApiRequest {
            message: format!("Request failed: {}", err),
        }
    }
}
