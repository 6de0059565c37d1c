//! The three research domains.
//!
//! Each domain is a zero-sized type implementing [`ResearchDomain`], which
//! bundles everything the shared pipeline needs to know about it: the report
//! shape, how to recognise its JSON, how to read its headed-text layout, how
//! to repair and score a report, and the prompts that drive the agent.

pub mod competition;
pub mod market;
pub mod problem;

use crate::config::ConfidenceThresholds;
use crate::envelope::DataQuality;
use crate::types::ResearchRequest;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt::Debug;

pub use competition::{Competition, CompetitionReport, CompetitorRecord};
pub use market::{GrowthFigure, MarketData, MarketFigure, MarketReport, MarketSizing};
pub use problem::{
    AlternativeSolution, EvidenceRecord, ProblemReport, ProblemSummary, ProblemValidation,
    StatementFeedback,
};

/// A report read from the headed-text fallback layout.
#[derive(Debug, Clone, PartialEq)]
pub struct TextExtraction<R> {
    pub report: R,
    /// Explicit `Confidence Score:` line, or the layout heuristic.
    pub reported_confidence: f64,
    pub limitations: Vec<String>,
}

/// Outcome of scoring a repaired report.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    /// Quality score in [0, 10].
    pub score: f64,
    pub data_quality: DataQuality,
}

/// Everything the extraction pipeline and service need from a domain.
pub trait ResearchDomain: Send + Sync + 'static {
    type Report: Serialize + DeserializeOwned + Default + Clone + Debug + Send + Sync + 'static;

    /// Machine name, used in cache keys and logs.
    const NAME: &'static str;
    /// Human label used in error messages ("Competition analysis failed: ...").
    const LABEL: &'static str;
    /// Top-level keys that mark a JSON object as this domain's report.
    const ANCHOR_KEYS: &'static [&'static str];
    /// Request fields that must be non-empty.
    const REQUIRED_FIELDS: &'static [&'static str];
    /// Request fields hashed into the cache key.
    const CACHE_KEY_FIELDS: &'static [&'static str];
    /// Highest quality score the domain's rubric can award.
    const MAX_QUALITY: f64;

    /// Whether a parsed JSON object has this domain's shape.
    fn validate_structure(object: &Map<String, Value>) -> bool;

    /// Rewrite legacy JSON shapes into the current one before validation.
    fn normalize_json(value: Map<String, Value>) -> Map<String, Value> {
        value
    }

    /// Read the headed-text layout. `None` when no section is recognised.
    fn parse_headed_text(text: &str) -> Option<TextExtraction<Self::Report>>;

    /// Fill defaults and drop records without an identity.
    fn repair(report: &mut Self::Report);

    /// Score a repaired report.
    fn assess(report: &Self::Report) -> Assessment;

    /// A confidence the report itself carries, which also bounds the final
    /// score from below.
    fn reported_floor(_report: &Self::Report) -> Option<f64> {
        None
    }

    /// The agent task. `max_steps` is quoted to the agent as its budget.
    fn research_prompt(request: &ResearchRequest, queries: &[String], max_steps: usize) -> String;

    fn query_prompt(request: &ResearchRequest) -> String;

    fn fallback_queries(request: &ResearchRequest) -> Vec<String>;

    fn min_confidence(thresholds: &ConfidenceThresholds) -> f64;
}

/// Sum of awarded points, capped at 10, with the completeness ratio.
pub(crate) fn finish_assessment(
    points: f64,
    max: f64,
    records: usize,
    sources: usize,
    high_credibility_sources: usize,
    missing_fields: Vec<String>,
) -> Assessment {
    let score = points.min(10.0);
    Assessment {
        score,
        data_quality: DataQuality {
            analysis_completeness: if max > 0.0 { (score / max).min(1.0) } else { 0.0 },
            records,
            sources,
            high_credibility_sources,
            missing_fields,
        },
    }
}
