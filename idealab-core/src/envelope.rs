//! The result envelope returned by every research service.
//!
//! An envelope wraps a domain payload (flattened into the top level) with
//! the fields every result carries: status, confidence score, research
//! limitations and run metadata. Keys the agent produced that the payload
//! does not model are preserved in `extra`.

use crate::lenient;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Highest confidence score a result can carry.
pub const MAX_CONFIDENCE: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Success,
    Error,
}

/// How a result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchMethod {
    WebResearch,
    Cached,
    Failed,
}

/// Completeness summary computed during validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataQuality {
    /// Quality score divided by the maximum, in [0, 1].
    pub analysis_completeness: f64,
    /// Domain records found (competitors, evidence, sourced figures).
    pub records: usize,
    pub sources: usize,
    pub high_credibility_sources: usize,
    pub missing_fields: Vec<String>,
}

/// Top-level research result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchEnvelope<R> {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub status: Status,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: R,
    #[serde(default, alias = "confidence", deserialize_with = "lenient::number")]
    pub confidence_score: f64,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub research_limitations: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt"
    )]
    pub research_method: Option<ResearchMethod>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_number"
    )]
    pub analysis_timestamp: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_count"
    )]
    pub agent_steps: Option<usize>,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "lenient::string_list"
    )]
    pub search_queries_used: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt"
    )]
    pub data_quality: Option<DataQuality>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl<R: Default> Default for ResearchEnvelope<R> {
    fn default() -> Self {
        Self::with_payload(R::default())
    }
}

impl<R> ResearchEnvelope<R> {
    /// A success envelope around `payload` with no score or metadata yet.
    pub fn with_payload(payload: R) -> Self {
        Self {
            status: Status::Success,
            error: None,
            payload,
            confidence_score: 0.0,
            research_limitations: Vec::new(),
            research_method: None,
            analysis_timestamp: None,
            agent_steps: None,
            search_queries_used: Vec::new(),
            data_quality: None,
            extra: Map::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == Status::Error
    }

    /// Stamp the envelope with the current wall-clock time.
    pub fn stamp(&mut self) {
        self.analysis_timestamp = Some(unix_timestamp());
    }
}

impl<R: Default> ResearchEnvelope<R> {
    /// An error envelope with every domain field defaulted.
    ///
    /// `error` is the caller-facing message; `cause` is recorded as the
    /// research limitation.
    pub fn failure(error: impl Into<String>, cause: &str) -> Self {
        let mut envelope = Self::default();
        envelope.status = Status::Error;
        envelope.research_limitations = vec![format!("Analysis failed: {}", cause)];
        envelope.error = Some(error.into());
        envelope.research_method = Some(ResearchMethod::Failed);
        envelope.stamp();
        envelope
    }
}

/// Clamp a score into `[0, 10]`, mapping NaN to 0.
pub fn clamp_confidence(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, MAX_CONFIDENCE)
    }
}

/// Seconds since the Unix epoch, with millisecond precision.
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
