//! Model backend abstraction.
//!
//! Defines the `LlmProvider` trait for model-agnostic completions and a
//! scripted `MockLlmProvider` used throughout the test suite.

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for model backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;

    /// Short provider label used in logs ("openai", "anthropic", ...).
    fn provider_name(&self) -> &str {
        "unknown"
    }
}

/// A mock provider returning queued outcomes in order.
///
/// Once the queue is empty every call returns a fixed placeholder text.
pub struct MockLlmProvider {
    model: String,
    responses: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    calls: AtomicUsize,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self::named("mock-model")
    }

    pub fn named(model: &str) -> Self {
        Self {
            model: model.to_string(),
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a MockLlmProvider that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        let provider = Self::new();
        for _ in 0..20 {
            provider.queue_response(Self::text_response(text));
        }
        provider
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(response));
        }
    }

    /// Queue an error to be returned by the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(error));
        }
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            text: text.to_string(),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .responses
            .lock()
            .map_err(|_| LlmError::Connection {
                message: "mock response queue poisoned".to_string(),
            })?
            .pop_front();
        next.unwrap_or_else(|| Ok(Self::text_response("I'm a mock LLM. No queued responses available.")))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}
