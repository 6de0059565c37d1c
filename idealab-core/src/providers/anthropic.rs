//! Anthropic Messages API provider.
//!
//! Key differences from the OpenAI-compatible protocol:
//! - Auth via `x-api-key` header (not `Authorization: Bearer`)
//! - Required `anthropic-version` header
//! - System prompt is a top-level field, not a message
//! - `max_tokens` is required

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Role, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
    timeout_secs: u64,
}

impl AnthropicProvider {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let client = super::http_client(config.timeout_secs)?;
        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
        })
    }

    /// Build the JSON request body, lifting system messages into `system`.
    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| json!({ "role": m.role.to_string(), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "temperature": request.temperature.unwrap_or(self.temperature),
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        body
    }

    fn parse_response(body: &Value) -> Result<CompletionResponse, LlmError> {
        let blocks = body
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No content blocks in response".to_string(),
            })?;

        let text: String = blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("");

        let usage = body
            .get("usage")
            .map(|u| TokenUsage {
                input_tokens: u["input_tokens"].as_u64().unwrap_or(0) as usize,
                output_tokens: u["output_tokens"].as_u64().unwrap_or(0) as usize,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            text,
            usage,
            model: body["model"].as_str().unwrap_or("unknown").to_string(),
            finish_reason: body["stop_reason"].as_str().map(|s| s.to_string()),
        })
    }

    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthFailed {
                provider: "Anthropic".to_string(),
            },
            429 => LlmError::RateLimited {
                retry_after_secs: 10,
            },
            // 529 is Anthropic's "overloaded"
            status if status >= 500 => LlmError::ApiRequest {
                message: format!("Anthropic server error ({}): {}", status, body_text),
            },
            _ => LlmError::ApiRequest {
                message: format!("Anthropic HTTP {}: {}", status, body_text),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request_body(&request);
        let url = format!("{}/messages", self.base_url);

        debug!(
            model = self.model.as_str(),
            url = url.as_str(),
            "Sending Anthropic completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| super::map_transport_error(e, self.timeout_secs))?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }
}
