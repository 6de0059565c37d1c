//! Properties of the extraction pipeline that hold for every domain.

use proptest::prelude::*;

use idealab_core::extract::{ExtractionPath, extract};
use idealab_core::{Competition, MarketSizing, ProblemValidation, ResearchEnvelope, Status};

const COMPETITION_JSON: &str = r#"Here is what I found.

```json
{
  "competitors": [
    {"name": "Mindbody", "website": "https://mindbody.io", "target_market": "Studios"},
    {"name": "Glofox", "funding": "$30M"},
    {"name": "Zen Planner"}
  ],
  "market_gaps": ["no offline mode", "weak analytics"],
  "barriers_to_entry": ["switching costs", "payment integrations"],
  "sources": [{"url": "https://a.com"}, {"url": "https://b.com"}],
  "confidence_score": 8
}
```

Let me know if you need more."#;

const PROBLEM_TEXT: &str = "
PROBLEM VALIDATION SUMMARY:
Exists: Yes
Severity: 8
Frequency: 8
Willingness to Pay: $100-$50,000
Market Size: Large, affecting many startups globally
Confidence Level: 9

EVIDENCE:
[Investopedia]: research_study (2025-05-12 - high)
- The U.S. Bureau of Labor Statistics estimates that over 20% of small businesses fail within the first year. Lack of Market Research is a contributing factor.

[Capsule CRM]: research_study (2024-07-11 - high)
- Lack of market need is a primary reason small businesses fail, with 35% of startups failing due to no market demand.

ALTERNATIVE SOLUTIONS:
OpenVC:
- Approach: Engage with potential customers to understand current solutions.
- Limitations: May not capture all market nuances.
- Pricing: Not specified

Harvard Business School:
- Approach: Structured methodologies like writing down goals and conducting market research.
- Limitations: Time-consuming and resource-intensive.
- Pricing: Not specified

PROBLEM STATEMENT FEEDBACK:
- Accuracy: Accurately describes the real problem of unvalidated business ideas.
- Specificity: Specific enough to capture key pain points.
- Improvements: Consider emphasizing the role of technology in validation.

RESEARCH LIMITATIONS:
- Several industry reports were behind paywalls.
";

// --- JSON path ---

#[test]
fn fenced_json_is_extracted() {
    let extraction = extract::<Competition>(COMPETITION_JSON);
    assert_eq!(extraction.path, ExtractionPath::Json);
    let envelope = extraction.envelope;
    assert_eq!(envelope.status, Status::Success);
    let names: Vec<&str> = envelope
        .payload
        .competitors
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["Mindbody", "Glofox", "Zen Planner"]);
    assert_eq!(envelope.confidence_score, 8.0);
}

#[test]
fn extraction_of_its_own_output_is_stable() {
    let first = extract::<Competition>(COMPETITION_JSON).envelope;
    let serialized = serde_json::to_string(&first).unwrap();
    let second = extract::<Competition>(&serialized);
    assert_eq!(second.path, ExtractionPath::Json);
    assert_eq!(second.envelope.payload, first.payload);
    assert_eq!(second.envelope.confidence_score, first.confidence_score);
}

#[test]
fn broken_json_never_invents_competitors() {
    let extraction = extract::<Competition>("```json\n{\"competitors\": [}\n```");
    assert!(extraction.envelope.payload.competitors.is_empty());
    assert_eq!(extraction.envelope.status, Status::Success);
}

// --- Headed text path ---

#[test]
fn summary_lines_without_headers_are_read() {
    let extraction = extract::<ProblemValidation>("Exists: Yes\nSeverity: 8\nFrequency: 7\n");
    assert_eq!(extraction.path, ExtractionPath::HeadedText);
    let summary = &extraction.envelope.payload.problem_validation;
    assert_eq!(summary.exists, Some(true));
    assert_eq!(summary.severity, 8.0);
    assert_eq!(summary.frequency, 7.0);
}

#[test]
fn named_solution_blocks_are_parsed() {
    let extraction = extract::<ProblemValidation>(PROBLEM_TEXT);
    assert_eq!(extraction.path, ExtractionPath::HeadedText);
    let report = &extraction.envelope.payload;

    let names: Vec<&str> = report
        .alternative_solutions
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(names, vec!["OpenVC", "Harvard Business School"]);
    assert_eq!(
        report.alternative_solutions[1].limitations,
        vec!["Time-consuming and resource-intensive."]
    );

    let sources: Vec<&str> = report.evidence.iter().map(|e| e.source.as_str()).collect();
    assert_eq!(sources, vec!["Investopedia", "Capsule CRM"]);
    assert!(report.evidence.iter().all(|e| e.credibility.is_high()));
    assert_eq!(report.evidence[0].kind, "research_study");
    assert!(report.problem_statement_feedback.accuracy.starts_with("Accurately"));
}

#[test]
fn confidence_level_lifts_text_score() {
    let envelope = extract::<ProblemValidation>(PROBLEM_TEXT).envelope;
    assert_eq!(envelope.confidence_score, 9.0);
    assert_eq!(
        envelope.research_limitations,
        vec!["Several industry reports were behind paywalls."]
    );
    let quality = envelope.data_quality.unwrap();
    assert_eq!(quality.high_credibility_sources, 2);
    assert!(quality.missing_fields.is_empty());
}

// --- Default path ---

#[test]
fn prose_without_structure_yields_defaults() {
    let raw = "I browsed for a while but could not reach any useful pages.";

    let market = extract::<MarketSizing>(raw);
    assert_eq!(market.path, ExtractionPath::Empty);
    assert_eq!(market.envelope.confidence_score, 0.0);

    let competition = extract::<Competition>(raw);
    assert_eq!(competition.path, ExtractionPath::Empty);
    assert!(competition.envelope.payload.competitors.is_empty());
    assert_eq!(competition.envelope.confidence_score, 0.0);

    let problem = extract::<ProblemValidation>(raw);
    assert_eq!(problem.path, ExtractionPath::Empty);
    assert_eq!(problem.envelope.confidence_score, 0.0);
}

// --- Score bounds ---

fn in_range<R>(envelope: &ResearchEnvelope<R>) -> bool {
    (0.0..=10.0).contains(&envelope.confidence_score)
}

proptest! {
    #[test]
    fn score_is_bounded_for_any_text(raw in any::<String>()) {
        prop_assert!(in_range(&extract::<MarketSizing>(&raw).envelope));
        prop_assert!(in_range(&extract::<Competition>(&raw).envelope));
        prop_assert!(in_range(&extract::<ProblemValidation>(&raw).envelope));
    }

    #[test]
    fn score_is_bounded_for_any_reported_confidence(reported in -1.0e6f64..1.0e6) {
        let competition = format!(r#"{{"competitors": [{{"name": "A"}}], "confidence_score": {reported}}}"#);
        prop_assert!(in_range(&extract::<Competition>(&competition).envelope));

        let problem = format!(r#"{{"problem_validation": {{"exists": true, "confidence_level": {reported}}}}}"#);
        prop_assert!(in_range(&extract::<ProblemValidation>(&problem).envelope));

        let market = format!("MARKET SIZE: $4.2B\nConfidence Score: {reported}");
        prop_assert!(in_range(&extract::<MarketSizing>(&market).envelope));
    }

    #[test]
    fn headed_text_with_noise_never_panics(
        header in prop::sample::select(vec!["COMPETITORS:", "EVIDENCE:", "MARKET SIZE:", "## Sources", "**Market Gaps:**"]),
        body in "[ -~\n]{0,200}",
    ) {
        let raw = format!("{header}\n{body}");
        let _ = extract::<MarketSizing>(&raw);
        let _ = extract::<Competition>(&raw);
        let _ = extract::<ProblemValidation>(&raw);
    }
}
