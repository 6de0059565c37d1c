//! End-to-end tests of the research services, the result cache and the
//! batch driver, with a scripted agent standing in for the browser.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use idealab_core::batch::{self, COMPETITION_FILE, INPUTS_FILE, MARKET_FILE, PROBLEM_FILE};
use idealab_core::config::RetryConfig;
use idealab_core::providers::ResilientCaller;
use idealab_core::{
    MockLlmProvider, MockResearchAgent, ResearchConfig, ResearchEngine, ResearchMethod,
    ResearchRequest, ResultCache, Status,
};
use tempfile::TempDir;

const MARKET_JSON: &str = r#"```json
{
  "market_data": {
    "market_size": {"value": 12.3, "unit": "billion USD", "year": 2024,
                    "sources": [{"name": "Grand View Research", "url": "https://grandviewresearch.com/x", "credibility": "high"}]},
    "growth_rate": {"value": 8.5, "period": "2024-2030"},
    "geographic_breakdown": {"North America": "40%", "Europe": "30%"}
  },
  "sources": [
    {"name": "Grand View Research", "url": "https://grandviewresearch.com/x", "credibility": "high"},
    {"name": "Statista", "url": "https://statista.com/y", "credibility": "high"}
  ],
  "confidence_score": 3
}
```"#;

fn engine_with(agent: Arc<MockResearchAgent>, cache: ResultCache) -> ResearchEngine {
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
    ResearchRequest::new("Tutor marketplace", "Education", "Marketplace")
}

fn backdate_all(dir: &Path, by: Duration) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }
}

// --- Cache behaviour ---

#[tokio::test]
async fn second_identical_call_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let agent = Arc::new(MockResearchAgent::answering(MARKET_JSON));
    let engine = engine_with(
        agent.clone(),
        ResultCache::new(dir.path(), Duration::from_secs(3600)),
    );

    let first = engine.research_market_size(&request()).await;
    assert_eq!(first.status, Status::Success);
    assert_eq!(first.research_method, Some(ResearchMethod::WebResearch));
    assert_eq!(first.payload.market_data.market_size.value, Some(12.3));
    // Top-level sources count towards the score: 2 high + size + growth
    // + period + geography + 2 publishers, above the reported 3.
    assert_eq!(first.payload.market_data.sources.len(), 2);
    assert_eq!(first.confidence_score, 7.0);
    assert!(!first.extra.contains_key("sources"));

    // Field comparison ignores case and surrounding whitespace.
    let mut shouted = request();
    shouted.business_idea = "  TUTOR MARKETPLACE ".to_string();
    let second = engine.research_market_size(&shouted).await;
    assert_eq!(second.research_method, Some(ResearchMethod::Cached));
    assert_eq!(second.payload, first.payload);
    assert_eq!(second.confidence_score, first.confidence_score);
    assert_eq!(agent.call_count(), 1);
}

#[tokio::test]
async fn expired_entry_triggers_fresh_research() {
    let dir = TempDir::new().unwrap();
    let agent = Arc::new(MockResearchAgent::answering(MARKET_JSON));
    let engine = engine_with(
        agent.clone(),
        ResultCache::new(dir.path(), Duration::from_secs(60)),
    );

    engine.research_market_size(&request()).await;
    backdate_all(dir.path(), Duration::from_secs(120));

    let again = engine.research_market_size(&request()).await;
    assert_eq!(again.research_method, Some(ResearchMethod::WebResearch));
    assert_eq!(agent.call_count(), 2);
}

#[tokio::test]
async fn domains_do_not_share_cache_entries() {
    let dir = TempDir::new().unwrap();
    let agent = Arc::new(MockResearchAgent::answering(MARKET_JSON));
    let engine = engine_with(
        agent.clone(),
        ResultCache::new(dir.path(), Duration::from_secs(3600)),
    );

    engine.research_market_size(&request()).await;
    let competition = engine.analyze_competition(&request()).await;
    assert_ne!(competition.research_method, Some(ResearchMethod::Cached));
    assert_eq!(agent.call_count(), 2);
}

// --- Input validation ---

#[tokio::test]
async fn missing_industry_fails_without_any_call() {
    let agent = Arc::new(MockResearchAgent::answering(MARKET_JSON));
    let engine = engine_with(agent.clone(), ResultCache::disabled());
    let mut request = request();
    request.industry = String::new();

    let envelope = engine.research_market_size(&request).await;
    assert_eq!(envelope.status, Status::Error);
    assert_eq!(
        envelope.error.as_deref(),
        Some("Missing required fields: industry")
    );
    assert_eq!(envelope.confidence_score, 0.0);
    assert_eq!(agent.call_count(), 0);
}

#[tokio::test]
async fn agent_task_carries_request_and_queries() {
    let agent = Arc::new(MockResearchAgent::answering(MARKET_JSON));
    let engine = engine_with(agent.clone(), ResultCache::disabled());

    let envelope = engine.research_market_size(&request()).await;
    let tasks = agent.tasks();
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].contains("Tutor marketplace"));
    assert!(tasks[0].contains("Education"));
    for query in &envelope.search_queries_used {
        assert!(tasks[0].contains(query.as_str()));
    }
}

// --- Batch driver ---

#[tokio::test]
async fn batch_writes_every_file_even_when_services_fail() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("run");
    let agent = Arc::new(MockResearchAgent::answering(MARKET_JSON));
    let engine = Arc::new(engine_with(agent.clone(), ResultCache::disabled()));
    let request = ResearchRequest::new("Tutor marketplace", "Education", "");

    let outcome = batch::save_research_data(engine, request, Some(out.clone()))
        .await
        .unwrap();

    assert_eq!(outcome.output_dir, out);
    assert_eq!(
        outcome.failed_tasks,
        vec!["market_sizing", "competitive_analysis"]
    );
    for name in [INPUTS_FILE, MARKET_FILE, COMPETITION_FILE, PROBLEM_FILE] {
        assert!(out.join(name).exists(), "{name} was not written");
    }
    assert_eq!(outcome.files.len(), 4);

    let inputs: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join(INPUTS_FILE)).unwrap()).unwrap();
    assert_eq!(
        inputs["problem_statement"],
        "difficulty finding or accessing Education "
    );
    assert_eq!(inputs["failed_tasks"][1], "competitive_analysis");

    let market: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join(MARKET_FILE)).unwrap()).unwrap();
    assert_eq!(market["status"], "error");
    assert_eq!(market["error"], "Missing required fields: product_type");

    let problem: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join(PROBLEM_FILE)).unwrap()).unwrap();
    assert_eq!(problem["status"], "success");
    assert_eq!(agent.call_count(), 1);
}

#[tokio::test]
async fn batch_keeps_given_problem_statement() {
    let dir = TempDir::new().unwrap();
    let agent = Arc::new(MockResearchAgent::answering(MARKET_JSON));
    let engine = Arc::new(engine_with(agent.clone(), ResultCache::disabled()));
    let request = request().with_problem("parents cannot find vetted tutors");

    let outcome = batch::save_research_data(engine, request, Some(dir.path().to_path_buf()))
        .await
        .unwrap();

    assert!(outcome.failed_tasks.is_empty());
    assert_eq!(agent.call_count(), 3);
    let inputs: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(INPUTS_FILE)).unwrap())
            .unwrap();
    assert_eq!(inputs["problem_statement"], "parents cannot find vetted tutors");
}
