//! # IdeaLab Core
//!
//! Research engine for validating business ideas. An LLM-driven agent
//! researches market size, competition and problem evidence; its free-form
//! answer is turned into a typed, scored result envelope by a JSON-first
//! extractor with a headed-text fallback.
//!
//! Entry points are [`ResearchEngine`] for single runs, [`batch`] for the
//! three-domain batch driver and [`gateway`] for the HTTP surface.

pub mod agent;
pub mod batch;
pub mod brain;
pub mod cache;
pub mod config;
pub mod domains;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod lenient;
pub mod persistence;
pub mod prompt;
pub mod providers;
pub mod queries;
pub mod records;
pub mod service;
pub mod types;

// Re-export commonly used types at the crate root.
pub use agent::{AgentHistory, DirectModelAgent, MockResearchAgent, RemoteBrowserAgent, ResearchAgent};
pub use brain::{LlmProvider, MockLlmProvider};
pub use cache::ResultCache;
pub use config::{ResearchConfig, load_config};
pub use domains::{
    Competition, CompetitionReport, MarketReport, MarketSizing, ProblemReport, ProblemValidation,
    ResearchDomain,
};
pub use envelope::{DataQuality, ResearchEnvelope, ResearchMethod, Status};
pub use error::{Result, ResearchError};
pub use extract::{Extraction, ExtractionPath, extract};
pub use records::{Credibility, SourceRecord};
pub use service::{ResearchEngine, ResearchService};
pub use types::ResearchRequest;
