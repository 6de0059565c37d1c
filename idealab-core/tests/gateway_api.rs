//! Integration tests for the research HTTP routes.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use idealab_core::config::RetryConfig;
use idealab_core::gateway::{SharedEngine, router};
use idealab_core::providers::ResilientCaller;
use idealab_core::{MockLlmProvider, MockResearchAgent, ResearchConfig, ResearchEngine, ResultCache};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const COMPETITION_JSON: &str = r#"{"competitors": [{"name": "Wyzant"}, {"name": "Varsity Tutors"}],
 "market_concentration": "fragmented", "confidence_score": 7}"#;

fn make_engine(agent: Arc<MockResearchAgent>) -> SharedEngine {
    let caller = ResilientCaller::new(
        Arc::new(MockLlmProvider::new()),
        None,
        RetryConfig::immediate(1),
    );
    Arc::new(ResearchEngine::new(
        ResearchConfig::default(),
        caller,
        Arc::new(MockLlmProvider::new()),
        agent,
        ResultCache::disabled(),
    ))
}

fn make_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn make_post_request(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn send(engine: SharedEngine, request: Request<Body>) -> (StatusCode, Value) {
    let app = router(engine);
    let resp = ServiceExt::<Request<Body>>::oneshot(app, request)
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn tutoring() -> String {
    json!({
        "business_idea": "Tutor marketplace",
        "industry": "Education",
        "product_type": "Marketplace"
    })
    .to_string()
}

// --- /health ---

#[tokio::test]
async fn test_health() {
    let engine = make_engine(Arc::new(MockResearchAgent::new()));
    let (status, json) = send(engine, make_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["message"], "Research Engine API is running");
}

// --- research routes ---

#[tokio::test]
async fn test_competition_returns_envelope() {
    let agent = Arc::new(MockResearchAgent::answering(COMPETITION_JSON));
    let engine = make_engine(agent.clone());
    let (status, json) = send(engine, make_post_request("/competition", tutoring())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert_eq!(json["competitors"][0]["name"], "Wyzant");
    assert_eq!(json["market_concentration"], "fragmented");
    assert_eq!(json["research_method"], "web_research");
    assert_eq!(json["confidence_score"], 7.0);
    assert_eq!(agent.call_count(), 1);
}

#[tokio::test]
async fn test_problem_validation_accepts_description_alias() {
    let agent = Arc::new(MockResearchAgent::answering(
        "Exists: Yes\nSeverity: 6\nFrequency: 5\nConfidence Level: 6",
    ));
    let engine = make_engine(agent);
    let body = json!({
        "description": "Tutor marketplace",
        "industry": "Education",
        "product_type": "Marketplace",
        "problem_statement": "parents cannot find vetted tutors"
    })
    .to_string();
    let (status, json) = send(engine, make_post_request("/problem-validation", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["problem_validation"]["exists"], true);
    assert_eq!(json["problem_validation"]["severity"], 6.0);
}

#[tokio::test]
async fn test_error_envelope_becomes_500_detail() {
    let agent = Arc::new(MockResearchAgent::answering(COMPETITION_JSON));
    let engine = make_engine(agent.clone());
    let body = json!({"business_idea": "Tutor marketplace", "industry": "Education"}).to_string();
    let (status, json) = send(engine, make_post_request("/market-size", body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["detail"], "Missing required fields: product_type");
    assert_eq!(agent.call_count(), 0);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let agent = Arc::new(MockResearchAgent::new());
    let engine = make_engine(agent.clone());
    let (status, _) = send(
        engine,
        make_post_request("/competition", "{not json".to_string()),
    )
    .await;

    assert!(status.is_client_error());
    assert_eq!(agent.call_count(), 0);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let engine = make_engine(Arc::new(MockResearchAgent::new()));
    let (status, _) = send(engine, make_request("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
