//! Turning raw agent output into a validated, scored envelope.
//!
//! The pipeline has one precedence for every domain:
//!
//! 1. **JSON.** Fenced blocks, then the first balanced object carrying a
//!    domain anchor key, then the widest `{...}` span. Each candidate is
//!    parsed as-is and again after [`json::repair`]; it is accepted only if
//!    it passes the domain's structural check.
//! 2. **Headed text.** The domain's section layout.
//! 3. **Default.** A fully defaulted report.
//!
//! Whatever path produced the report, it is then repaired and scored. Nothing
//! in here returns an error or panics on bad input.

pub mod json;
pub mod sections;

use crate::domains::ResearchDomain;
use crate::envelope::{ResearchEnvelope, Status, clamp_confidence};
use serde_json::Value;
use tracing::debug;

/// Which stage of the pipeline produced the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPath {
    Json,
    HeadedText,
    Empty,
}

#[derive(Debug, Clone)]
pub struct Extraction<R> {
    pub envelope: ResearchEnvelope<R>,
    pub path: ExtractionPath,
}

/// Parse, repair and score `raw` agent output for domain `D`.
pub fn extract<D: ResearchDomain>(raw: &str) -> Extraction<D::Report> {
    let raw = &raw.replace("\r\n", "\n");
    let (envelope, reported, path) = if let Some(envelope) = from_json::<D>(raw) {
        let reported = envelope.confidence_score;
        (envelope, reported, ExtractionPath::Json)
    } else if let Some(text) = D::parse_headed_text(raw) {
        let mut envelope = ResearchEnvelope::with_payload(text.report);
        envelope.research_limitations = text.limitations;
        (envelope, text.reported_confidence, ExtractionPath::HeadedText)
    } else {
        (ResearchEnvelope::default(), 0.0, ExtractionPath::Empty)
    };

    debug!(domain = D::NAME, path = ?path, "Agent output parsed");
    Extraction {
        envelope: finalize::<D>(envelope, reported),
        path,
    }
}

/// First JSON candidate that parses and has the domain's shape.
fn from_json<D: ResearchDomain>(raw: &str) -> Option<ResearchEnvelope<D::Report>> {
    for candidate in json::candidates(raw, D::ANCHOR_KEYS) {
        let Some(object) = json::parse_object(&candidate) else {
            debug!(domain = D::NAME, "JSON candidate did not parse");
            continue;
        };
        let object = D::normalize_json(object);
        if !D::validate_structure(&object) {
            debug!(domain = D::NAME, "JSON candidate has the wrong shape");
            continue;
        }
        match serde_json::from_value(Value::Object(object)) {
            Ok(envelope) => return Some(envelope),
            Err(e) => debug!(domain = D::NAME, error = %e, "JSON candidate rejected"),
        }
    }
    None
}

/// Repair the payload, then set status, score and data quality.
///
/// The final score is the highest of the agent-reported confidence, the
/// quality score and any floor the report carries, clamped to [0, 10].
pub fn finalize<D: ResearchDomain>(
    mut envelope: ResearchEnvelope<D::Report>,
    reported: f64,
) -> ResearchEnvelope<D::Report> {
    D::repair(&mut envelope.payload);
    clean_limitations(&mut envelope.research_limitations);

    let assessment = D::assess(&envelope.payload);
    let floor = D::reported_floor(&envelope.payload).unwrap_or(0.0);
    let reported = if reported.is_nan() { 0.0 } else { reported };

    envelope.status = Status::Success;
    envelope.error = None;
    envelope.confidence_score = clamp_confidence(reported.max(assessment.score).max(floor));
    envelope.data_quality = Some(assessment.data_quality);
    envelope
}

fn clean_limitations(limitations: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    limitations.retain(|l| !crate::lenient::is_placeholder(l) && seen.insert(l.to_lowercase()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::{Competition, ProblemValidation};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_json_wins_over_headed_text() {
        let raw = "COMPETITORS:\n1. TextCo\n```json\n{\"competitors\": [{\"name\": \"JsonCo\"}]}\n```";
        let extraction = extract::<Competition>(raw);
        assert_eq!(extraction.path, ExtractionPath::Json);
        assert_eq!(extraction.envelope.payload.competitors[0].name, "JsonCo");
    }

    #[test]
    fn test_wrong_shape_json_falls_through_to_text() {
        let raw = "```json\n{\"status\": \"done\"}\n```\nCOMPETITORS:\n1. TextCo";
        let extraction = extract::<Competition>(raw);
        assert_eq!(extraction.path, ExtractionPath::HeadedText);
        assert_eq!(extraction.envelope.payload.competitors[0].name, "TextCo");
    }

    #[test]
    fn test_reported_confidence_is_lower_bounded_by_quality() {
        let raw = r#"{"competitors": [{"name": "A"}, {"name": "B"}, {"name": "C"}],
                      "sources": [{"url": "https://a.com"}, {"url": "https://b.com"}, {"url": "https://c.com"}],
                      "confidence_score": 2}"#;
        let envelope = extract::<Competition>(raw).envelope;
        assert_eq!(envelope.confidence_score, 5.0);
        let quality = envelope.data_quality.unwrap();
        assert_eq!(quality.records, 3);
        assert_eq!(quality.sources, 3);
    }

    #[test]
    fn test_confidence_level_floors_problem_score() {
        let raw = r#"{"problem_validation": {"exists": true, "confidence_level": 7}}"#;
        let envelope = extract::<ProblemValidation>(raw).envelope;
        assert_eq!(envelope.confidence_score, 7.0);
    }

    #[test]
    fn test_limitations_cleaned() {
        let raw = r#"{"competitors": [], "research_limitations": ["Paywall on Statista", "None", "paywall on statista"]}"#;
        let envelope = extract::<Competition>(raw).envelope;
        assert_eq!(envelope.research_limitations, vec!["Paywall on Statista"]);
    }

    #[test]
    fn test_crlf_headers_without_colon() {
        let extraction = extract::<Competition>("**Competitors**\r\n1. Acme\r\n2. Beta\r\n3. Gamma\r\n");
        assert_eq!(extraction.path, ExtractionPath::HeadedText);
        let names: Vec<&str> = extraction
            .envelope
            .payload
            .competitors
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Acme", "Beta", "Gamma"]);
    }

    #[test]
    fn test_percent_confidence_is_rescaled() {
        let envelope = extract::<Competition>("COMPETITORS:\n1. Acme\nConfidence Score: 85%").envelope;
        assert_eq!(envelope.confidence_score, 8.5);
    }

    #[test]
    fn test_error_fields_reset() {
        let raw = r#"{"competitors": [], "status": "error", "error": "agent said so"}"#;
        let envelope = extract::<Competition>(raw).envelope;
        assert_eq!(envelope.status, Status::Success);
        assert_eq!(envelope.error, None);
    }
}
