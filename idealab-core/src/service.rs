//! Research services and the engine that wires them together.
//!
//! [`ResearchEngine`] owns every collaborator a research run needs: the
//! configuration, the resilient caller for the agent's model, the query
//! generator, the agent and the result cache. It is built once (from config
//! or explicitly, for tests) and shared by the HTTP surface and the CLI.
//!
//! [`ResearchService`] runs the pipeline for one domain. Its `run` never
//! fails: every error is folded into an error envelope.

use crate::agent::{DirectModelAgent, RemoteBrowserAgent, ResearchAgent};
use crate::brain::LlmProvider;
use crate::cache::ResultCache;
use crate::config::ResearchConfig;
use crate::domains::{
    Competition, CompetitionReport, MarketReport, MarketSizing, ProblemReport, ProblemValidation,
    ResearchDomain,
};
use crate::envelope::{ResearchEnvelope, ResearchMethod};
use crate::error::{AgentError, ResearchError};
use crate::extract;
use crate::providers::{self, ResilientCaller};
use crate::queries::SearchQueryGenerator;
use crate::types::ResearchRequest;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Shared state for every research run.
pub struct ResearchEngine {
    config: ResearchConfig,
    caller: ResilientCaller,
    queries: SearchQueryGenerator,
    agent: Arc<dyn ResearchAgent>,
    cache: ResultCache,
}

impl ResearchEngine {
    /// Assemble an engine from explicit parts.
    pub fn new(
        config: ResearchConfig,
        caller: ResilientCaller,
        query_model: Arc<dyn LlmProvider>,
        agent: Arc<dyn ResearchAgent>,
        cache: ResultCache,
    ) -> Self {
        let queries = SearchQueryGenerator::new(query_model, &config.query_model);
        Self {
            config,
            caller,
            queries,
            agent,
            cache,
        }
    }

    /// Build providers, agent and cache from configuration.
    ///
    /// The primary backend must be usable. A fallback whose key is missing is
    /// skipped with a warning, and the query model falls back to the primary.
    pub fn from_config(config: ResearchConfig) -> Result<Self, ResearchError> {
        let primary = providers::create_provider(&config.primary)?;
        let fallback = match providers::create_provider(&config.fallback) {
            Ok(provider) => Some(provider),
            Err(e) => {
                warn!(provider = %config.fallback.provider, error = %e, "Fallback backend unavailable");
                None
            }
        };
        let query_model = providers::create_provider(&config.query_model).unwrap_or_else(|e| {
            warn!(error = %e, "Query model unavailable, using the primary backend");
            Arc::clone(&primary)
        });

        let agent: Arc<dyn ResearchAgent> = match &config.agent.endpoint {
            Some(endpoint) => Arc::new(RemoteBrowserAgent::new(endpoint.clone(), config.agent.clone())?),
            None => Arc::new(DirectModelAgent),
        };
        let cache = ResultCache::from_config(&config.cache);
        let caller = ResilientCaller::new(primary, fallback, config.retry.clone());

        info!(
            primary = %config.primary.model,
            agent = agent.name(),
            cache = %cache.dir().display(),
            "Research engine ready"
        );
        Ok(Self::new(config, caller, query_model, agent, cache))
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// The service for domain `D`.
    pub fn service<D: ResearchDomain>(&self) -> ResearchService<'_, D> {
        ResearchService {
            engine: self,
            domain: PhantomData,
        }
    }

    pub async fn research_market_size(
        &self,
        request: &ResearchRequest,
    ) -> ResearchEnvelope<MarketReport> {
        self.service::<MarketSizing>().run(request).await
    }

    pub async fn analyze_competition(
        &self,
        request: &ResearchRequest,
    ) -> ResearchEnvelope<CompetitionReport> {
        self.service::<Competition>().run(request).await
    }

    pub async fn validate_problem(
        &self,
        request: &ResearchRequest,
    ) -> ResearchEnvelope<ProblemReport> {
        self.service::<ProblemValidation>().run(request).await
    }
}

/// Runs the research pipeline for domain `D`.
pub struct ResearchService<'a, D> {
    engine: &'a ResearchEngine,
    domain: PhantomData<fn() -> D>,
}

impl<D: ResearchDomain> ResearchService<'_, D> {
    /// Research `request`, returning a success, cached or error envelope.
    pub async fn run(&self, request: &ResearchRequest) -> ResearchEnvelope<D::Report> {
        let started = Instant::now();
        match self.try_run(request).await {
            Ok(envelope) => {
                info!(
                    domain = D::NAME,
                    confidence = envelope.confidence_score,
                    method = ?envelope.research_method,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Research finished"
                );
                envelope
            }
            Err(e) => {
                let message = match &e {
                    ResearchError::InvalidInput { .. } => e.to_string(),
                    _ => format!("{} failed: {}", D::LABEL, e),
                };
                error!(domain = D::NAME, error = %message, "Research failed");
                ResearchEnvelope::failure(message, &e.to_string())
            }
        }
    }

    async fn try_run(
        &self,
        request: &ResearchRequest,
    ) -> Result<ResearchEnvelope<D::Report>, ResearchError> {
        let missing = request.missing_fields(D::REQUIRED_FIELDS);
        if !missing.is_empty() {
            return Err(ResearchError::InvalidInput { fields: missing });
        }

        let engine = self.engine;
        let key = ResultCache::key::<D>(request);
        let min_confidence = D::min_confidence(&engine.config.thresholds);
        if let Some(mut cached) = engine.cache.get::<ResearchEnvelope<D::Report>>(&key) {
            if !cached.is_error() && cached.confidence_score >= min_confidence {
                info!(domain = D::NAME, key = %key, "Using cached research");
                cached.research_method = Some(ResearchMethod::Cached);
                return Ok(cached);
            }
            debug!(domain = D::NAME, key = %key, "Cached research below threshold, ignoring");
        }

        let queries = engine.queries.generate::<D>(request).await;
        let max_steps = engine.config.agent.max_steps;
        let task = D::research_prompt(request, &queries, max_steps);
        info!(
            domain = D::NAME,
            agent = engine.agent.name(),
            queries = queries.len(),
            max_steps,
            "Starting research agent"
        );

        let history = engine
            .caller
            .invoke(|backend| {
                let agent = Arc::clone(&engine.agent);
                let task = task.clone();
                async move { agent.run(backend, &task, max_steps).await }
            })
            .await?;
        let raw = history.final_result().ok_or(AgentError::NoFinalResult)?;

        let extraction = extract::extract::<D>(raw);
        let mut envelope = extraction.envelope;
        debug!(domain = D::NAME, path = ?extraction.path, "Agent output extracted");

        envelope.research_method = Some(ResearchMethod::WebResearch);
        envelope.stamp();
        envelope.agent_steps = Some(history.model_actions());
        envelope.search_queries_used = queries;

        if envelope.confidence_score >= min_confidence {
            engine.cache.put(&key, &envelope)?;
        } else {
            debug!(
                domain = D::NAME,
                confidence = envelope.confidence_score,
                min_confidence,
                "Result below cache threshold"
            );
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentHistory, MockResearchAgent};
    use crate::brain::MockLlmProvider;
    use crate::config::RetryConfig;
    use crate::envelope::Status;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    const COMPETITION_JSON: &str = r#"```json
{"competitors": [{"name": "Mindbody"}, {"name": "Glofox"}, {"name": "Zen Planner"}],
 "market_gaps": ["no offline mode", "weak analytics"],
 "sources": [{"url": "https://a.com"}, {"url": "https://b.com"}, {"url": "https://c.com"}],
 "confidence_score": 8}
```"#;

    fn engine(agent: Arc<MockResearchAgent>, cache: ResultCache) -> ResearchEngine {
        let caller = ResilientCaller::new(
            Arc::new(MockLlmProvider::new()),
            None,
            RetryConfig::immediate(2),
        );
        ResearchEngine::new(
            ResearchConfig::default(),
            caller,
            Arc::new(MockLlmProvider::new()),
            agent,
            cache,
        )
    }

    fn request() -> ResearchRequest {
        ResearchRequest::new("Class booking for gyms", "Fitness", "SaaS")
    }

    #[tokio::test]
    async fn test_success_is_tagged_and_cached() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::new(dir.path(), Duration::from_secs(60));
        let agent = Arc::new(MockResearchAgent::answering(COMPETITION_JSON));
        let engine = engine(agent.clone(), cache);

        let first = engine.analyze_competition(&request()).await;
        assert_eq!(first.status, Status::Success);
        assert_eq!(first.research_method, Some(ResearchMethod::WebResearch));
        assert_eq!(first.agent_steps, Some(2));
        assert_eq!(first.confidence_score, 8.0);
        assert!(first.analysis_timestamp.is_some());
        assert!(!first.search_queries_used.is_empty());

        let second = engine.analyze_competition(&request()).await;
        assert_eq!(second.research_method, Some(ResearchMethod::Cached));
        assert_eq!(second.payload, first.payload);
        assert_eq!(agent.call_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_field_fails_before_agent() {
        let agent = Arc::new(MockResearchAgent::answering(COMPETITION_JSON));
        let engine = engine(agent.clone(), ResultCache::disabled());
        let mut request = request();
        request.industry = "   ".to_string();

        let envelope = engine.analyze_competition(&request).await;
        assert_eq!(envelope.status, Status::Error);
        assert_eq!(envelope.error.as_deref(), Some("Missing required fields: industry"));
        assert_eq!(envelope.research_method, Some(ResearchMethod::Failed));
        assert_eq!(envelope.confidence_score, 0.0);
        assert_eq!(agent.call_count(), 0);
    }

    #[tokio::test]
    async fn test_problem_requires_problem_statement() {
        let agent = Arc::new(MockResearchAgent::new());
        let engine = engine(agent.clone(), ResultCache::disabled());
        let envelope = engine.validate_problem(&request()).await;
        assert_eq!(
            envelope.error.as_deref(),
            Some("Missing required fields: problem_statement")
        );
        assert_eq!(agent.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_final_result_is_error_envelope() {
        let agent = Arc::new(MockResearchAgent::new());
        agent.queue(Ok(AgentHistory::unfinished(Vec::new())));
        let engine = engine(agent, ResultCache::disabled());

        let envelope = engine.research_market_size(&request()).await;
        assert!(envelope.is_error());
        let error = envelope.error.unwrap();
        assert!(error.starts_with("Market sizing failed: "));
        assert!(error.contains("Agent completed but returned no final result"));
        assert!(envelope.research_limitations[0].starts_with("Analysis failed: "));
        assert_eq!(envelope.payload, MarketReport::default());
    }

    #[tokio::test]
    async fn test_agent_errors_are_retried_then_reported() {
        let agent = Arc::new(MockResearchAgent::new());
        for _ in 0..2 {
            agent.queue(Err(AgentError::Transport {
                message: "browser crashed".to_string(),
            }));
        }
        let engine = engine(agent.clone(), ResultCache::disabled());

        let envelope = engine.analyze_competition(&request()).await;
        assert!(envelope.is_error());
        assert!(envelope.error.unwrap().contains("browser crashed"));
        assert_eq!(agent.call_count(), 2);
    }

    #[tokio::test]
    async fn test_low_confidence_result_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::new(dir.path(), Duration::from_secs(60));
        let agent = Arc::new(MockResearchAgent::answering(
            r#"{"competitors": [{"name": "Solo"}], "confidence_score": 1}"#,
        ));
        let engine = engine(agent.clone(), cache);

        engine.analyze_competition(&request()).await;
        let again = engine.analyze_competition(&request()).await;
        assert_eq!(again.research_method, Some(ResearchMethod::WebResearch));
        assert_eq!(agent.call_count(), 2);
    }
}
