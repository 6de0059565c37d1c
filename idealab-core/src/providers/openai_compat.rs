//! OpenAI-compatible LLM provider.
//!
//! Supports OpenAI and any endpoint that follows the chat completions API
//! format (Azure OpenAI, Ollama, vLLM, LM Studio).

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider speaking the OpenAI chat completions protocol.
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
    timeout_secs: u64,
}

impl OpenAiCompatibleProvider {
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

    fn messages_to_json(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| json!({ "role": m.role.to_string(), "content": m.content }))
            .collect()
    }

    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        json!({
            "model": self.model,
            "messages": Self::messages_to_json(&request.messages),
            "temperature": request.temperature.unwrap_or(self.temperature),
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "stream": false,
        })
    }

    fn parse_response(body: &Value, model: &str) -> Result<CompletionResponse, LlmError> {
        let choice = body
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No choices in response".to_string(),
            })?;

        let text = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No text content in choice".to_string(),
            })?
            .to_string();

        let finish_reason = choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .map(|s| s.to_string());

        let usage = body
            .get("usage")
            .map(|u| TokenUsage {
                input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as usize,
                output_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as usize,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            text,
            usage,
            model: body
                .get("model")
                .and_then(|m| m.as_str())
                .unwrap_or(model)
                .to_string(),
            finish_reason,
        })
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 => {
                debug!(body = %body, "Authentication failed (401)");
                LlmError::AuthFailed {
                    provider: "OpenAI-compatible".to_string(),
                }
            }
            429 => {
                // "Rate limit reached ... try again in 7s"
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")?
                            .get("message")?
                            .as_str()
                            .map(|s| s.to_string())
                    })
                    .and_then(|msg| {
                        msg.split("in ")
                            .last()
                            .and_then(|s| s.trim_end_matches(['s', '.']).parse::<u64>().ok())
                    })
                    .unwrap_or(5);
                LlmError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            status if status >= 500 => LlmError::ApiRequest {
                message: format!("Server error ({}): {}", status, body),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(&request);

        debug!(url = %url, model = %self.model, "Sending OpenAI completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| super::map_transport_error(e, self.timeout_secs))?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| LlmError::ApiRequest {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&json, &self.model)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
