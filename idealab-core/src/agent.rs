//! The research agent seam.
//!
//! A research run hands a task prompt and a model backend to an agent and
//! gets back its history: the actions it took and the final answer text.
//! Three implementations exist:
//!
//! - [`DirectModelAgent`] asks the model once, without browsing.
//! - [`RemoteBrowserAgent`] delegates to a browser-automation service over HTTP.
//! - [`MockResearchAgent`] replays scripted histories in tests.

use crate::brain::LlmProvider;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::types::{CompletionRequest, Message};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// One action taken by the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AgentStep {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            detail: None,
        }
    }
}

/// Everything an agent run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentHistory {
    #[serde(default)]
    pub steps: Vec<AgentStep>,
    #[serde(default, rename = "final_result")]
    result: Option<String>,
}

impl AgentHistory {
    /// A history that ended with `text` after `steps`.
    pub fn finished(text: impl Into<String>, steps: Vec<AgentStep>) -> Self {
        Self {
            steps,
            result: Some(text.into()),
        }
    }

    /// A history whose agent gave up without an answer.
    pub fn unfinished(steps: Vec<AgentStep>) -> Self {
        Self {
            steps,
            result: None,
        }
    }

    /// The agent's final answer; blank answers count as missing.
    pub fn final_result(&self) -> Option<&str> {
        self.result.as_deref().filter(|text| !text.trim().is_empty())
    }

    /// Number of actions the agent took.
    pub fn model_actions(&self) -> usize {
        self.steps.len()
    }
}

/// A component that researches a task with a model backend.
#[async_trait]
pub trait ResearchAgent: Send + Sync {
    async fn run(
        &self,
        model: Arc<dyn LlmProvider>,
        task: &str,
        max_steps: usize,
    ) -> Result<AgentHistory, AgentError>;

    /// Short label used in logs.
    fn name(&self) -> &str;
}

const DIRECT_SYSTEM_PROMPT: &str = "You are a meticulous business research analyst. You cannot browse; \
answer from what you know, cite the sources you would rely on, and list anything you could not \
verify under research limitations.";

/// Answers the task with a single completion.
#[derive(Debug, Default)]
pub struct DirectModelAgent;

#[async_trait]
impl ResearchAgent for DirectModelAgent {
    async fn run(
        &self,
        model: Arc<dyn LlmProvider>,
        task: &str,
        _max_steps: usize,
    ) -> Result<AgentHistory, AgentError> {
        let request = CompletionRequest {
            messages: vec![Message::system(DIRECT_SYSTEM_PROMPT), Message::user(task)],
            temperature: None,
            max_tokens: None,
        };
        let response = model
            .complete(request)
            .await
            .map_err(|e| AgentError::Failed {
                message: e.to_string(),
            })?;
        debug!(
            model = model.model_name(),
            output_tokens = response.usage.output_tokens,
            "Direct research completion received"
        );
        Ok(AgentHistory::finished(
            response.text,
            vec![AgentStep::new("complete")],
        ))
    }

    fn name(&self) -> &str {
        "direct"
    }
}

#[derive(Debug, Serialize)]
struct RemoteTask<'a> {
    task: &'a str,
    max_steps: usize,
    model: &'a str,
    provider: &'a str,
    use_vision: bool,
    headless: bool,
    step_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct RemoteRun {
    #[serde(default)]
    final_result: Option<String>,
    #[serde(default)]
    steps: Vec<AgentStep>,
    #[serde(default)]
    model_actions: Option<usize>,
    #[serde(default)]
    error: Option<String>,
}

impl RemoteRun {
    /// Reported step counts beyond `max_steps` are capped.
    fn into_history(self, max_steps: usize) -> AgentHistory {
        let mut steps = self.steps;
        if let Some(count) = self.model_actions.map(|c| c.min(max_steps))
            && count > steps.len()
        {
            steps.resize_with(count, || AgentStep::new("browse"));
        }
        AgentHistory {
            steps,
            result: self.final_result,
        }
    }
}

/// Delegates the run to a browser-automation service.
///
/// The service receives `{task, max_steps, model, ...}` as JSON and answers
/// with `{final_result, steps | model_actions, error?}`.
pub struct RemoteBrowserAgent {
    client: reqwest::Client,
    endpoint: String,
    config: AgentConfig,
}

impl RemoteBrowserAgent {
    pub fn new(endpoint: impl Into<String>, config: AgentConfig) -> Result<Self, AgentError> {
        // The whole run may take every step to its timeout.
        let budget = config
            .step_timeout_secs
            .saturating_mul(config.max_steps.max(1) as u64)
            .saturating_add(60);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(budget))
            .build()
            .map_err(|e| AgentError::Transport {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            config,
        })
    }
}

#[async_trait]
impl ResearchAgent for RemoteBrowserAgent {
    async fn run(
        &self,
        model: Arc<dyn LlmProvider>,
        task: &str,
        max_steps: usize,
    ) -> Result<AgentHistory, AgentError> {
        let body = RemoteTask {
            task,
            max_steps,
            model: model.model_name(),
            provider: model.provider_name(),
            use_vision: self.config.use_vision,
            headless: self.config.headless,
            step_timeout_secs: self.config.step_timeout_secs,
        };
        info!(endpoint = %self.endpoint, model = body.model, max_steps, "Starting remote browser agent");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Transport {
                message: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::Failed {
                message: format!("Browser agent returned {}: {}", status, text),
            });
        }
        let run: RemoteRun = response.json().await.map_err(|e| AgentError::Transport {
            message: format!("Invalid browser agent response: {}", e),
        })?;
        if let Some(message) = run.error.clone().filter(|m| !m.trim().is_empty()) {
            return Err(AgentError::Failed { message });
        }
        Ok(run.into_history(max_steps))
    }

    fn name(&self) -> &str {
        "remote-browser"
    }
}

/// Replays queued outcomes in order and records every task it was given.
pub struct MockResearchAgent {
    outcomes: Mutex<VecDeque<Result<AgentHistory, AgentError>>>,
    tasks: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockResearchAgent {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            tasks: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// An agent that answers `text` on every run.
    pub fn answering(text: &str) -> Self {
        let agent = Self::new();
        for _ in 0..20 {
            agent.queue(Ok(AgentHistory::finished(
                text,
                vec![AgentStep::new("search"), AgentStep::new("extract")],
            )));
        }
        agent
    }

    pub fn queue(&self, outcome: Result<AgentHistory, AgentError>) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(outcome);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Tasks received so far, oldest first.
    pub fn tasks(&self) -> Vec<String> {
        self.tasks.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

impl Default for MockResearchAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResearchAgent for MockResearchAgent {
    async fn run(
        &self,
        _model: Arc<dyn LlmProvider>,
        task: &str,
        _max_steps: usize,
    ) -> Result<AgentHistory, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task.to_string());
        }
        let next = self
            .outcomes
            .lock()
            .map_err(|_| AgentError::Failed {
                message: "mock agent queue poisoned".to_string(),
            })?
            .pop_front();
        next.unwrap_or_else(|| Ok(AgentHistory::unfinished(Vec::new())))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_blank_final_result_is_missing() {
        let history = AgentHistory::finished("   ", vec![AgentStep::new("search")]);
        assert_eq!(history.final_result(), None);
        assert_eq!(history.model_actions(), 1);
    }

    #[test]
    fn test_remote_run_pads_steps_from_action_count() {
        let run: RemoteRun = serde_json::from_str(
            r#"{"final_result": "done", "steps": [{"action": "search"}], "model_actions": 4}"#,
        )
        .unwrap();
        let history = run.into_history(30);
        assert_eq!(history.final_result(), Some("done"));
        assert_eq!(history.model_actions(), 4);
        assert_eq!(history.steps[0].action, "search");
    }

    #[test]
    fn test_remote_action_count_is_capped_at_max_steps() {
        let run: RemoteRun = serde_json::from_str(
            r#"{"final_result": "done", "model_actions": 18446744073709551615}"#,
        )
        .unwrap();
        assert_eq!(run.into_history(30).model_actions(), 30);
    }

    #[test]
    fn test_history_serializes_final_result_key() {
        let history = AgentHistory::finished("answer", Vec::new());
        let value = serde_json::to_value(&history).unwrap();
        assert_eq!(value["final_result"], "answer");
    }

    #[tokio::test]
    async fn test_direct_agent_returns_completion_text() {
        let model = Arc::new(MockLlmProvider::with_response("{\"competitors\": []}"));
        let history = DirectModelAgent
            .run(model.clone(), "research this", 30)
            .await
            .unwrap();
        assert_eq!(history.final_result(), Some("{\"competitors\": []}"));
        assert_eq!(history.model_actions(), 1);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_direct_agent_maps_model_errors() {
        let model = MockLlmProvider::new();
        model.queue_error(crate::error::LlmError::Timeout { timeout_secs: 3 });
        let err = DirectModelAgent
            .run(Arc::new(model), "task", 30)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_mock_agent_records_tasks() {
        let agent = MockResearchAgent::answering("text");
        let model: Arc<dyn LlmProvider> = Arc::new(MockLlmProvider::new());
        agent.run(model.clone(), "first", 5).await.unwrap();
        agent.run(model, "second", 5).await.unwrap();
        assert_eq!(agent.tasks(), vec!["first", "second"]);
        assert_eq!(agent.call_count(), 2);
    }
}
