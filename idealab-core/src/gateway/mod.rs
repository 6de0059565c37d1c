//! HTTP surface for the research services, built on axum.
//!
//! | Route                      | Body              | Response             |
//! |----------------------------|-------------------|----------------------|
//! | `GET /health`              |                   | status message       |
//! | `POST /market-size`        | `ResearchRequest` | market envelope      |
//! | `POST /competition`        | `ResearchRequest` | competition envelope |
//! | `POST /problem-validation` | `ResearchRequest` | problem envelope     |
//!
//! Error envelopes are answered with `500 {"detail": error}`.

use crate::envelope::ResearchEnvelope;
use crate::service::ResearchEngine;
use crate::types::ResearchRequest;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Engine reference shared by the handlers.
pub type SharedEngine = Arc<ResearchEngine>;

/// Build the router with every research route.
pub fn router(engine: SharedEngine) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/market-size", post(market_size_handler))
        .route("/competition", post(competition_handler))
        .route("/problem-validation", post(problem_validation_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

/// Serve the router on `addr` until Ctrl-C.
pub async fn serve(engine: SharedEngine, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Research API listening");
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down research API");
        })
        .await
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "Research Engine API is running"
    }))
}

async fn market_size_handler(
    State(engine): State<SharedEngine>,
    Json(request): Json<ResearchRequest>,
) -> Response {
    envelope_response(engine.research_market_size(&request).await)
}

async fn competition_handler(
    State(engine): State<SharedEngine>,
    Json(request): Json<ResearchRequest>,
) -> Response {
    envelope_response(engine.analyze_competition(&request).await)
}

async fn problem_validation_handler(
    State(engine): State<SharedEngine>,
    Json(request): Json<ResearchRequest>,
) -> Response {
    envelope_response(engine.validate_problem(&request).await)
}

/// The envelope verbatim, or `500 {"detail"}` for an error envelope.
fn envelope_response<R: Serialize>(envelope: ResearchEnvelope<R>) -> Response {
    if envelope.is_error() {
        let detail = envelope
            .error
            .unwrap_or_else(|| "Research failed".to_string());
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "detail": detail }))).into_response();
    }
    Json(envelope).into_response()
}
