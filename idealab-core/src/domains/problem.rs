//! Problem validation research: does the problem exist, how badly does it
//! hurt, and what do people use today.

use super::{Assessment, ResearchDomain, TextExtraction, finish_assessment};
use crate::config::ConfidenceThresholds;
use crate::extract::sections::{self, SectionSplitter};
use crate::lenient;
use crate::prompt;
use crate::records::{self, Credibility};
use crate::types::ResearchRequest;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Headline assessment of the problem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemSummary {
    #[serde(alias = "problem_exists", deserialize_with = "lenient::opt_bool")]
    pub exists: Option<bool>,
    /// Pain on a 0-10 scale.
    #[serde(deserialize_with = "lenient::number")]
    pub severity: f64,
    /// How often the problem is encountered, 0-10.
    #[serde(deserialize_with = "lenient::number")]
    pub frequency: f64,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub willingness_to_pay: Option<String>,
    #[serde(alias = "market_size", deserialize_with = "lenient::opt_string")]
    pub market_size_estimate: Option<String>,
    #[serde(alias = "confidence", deserialize_with = "lenient::number")]
    pub confidence_level: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceRecord {
    #[serde(alias = "name", alias = "publisher", deserialize_with = "lenient::string")]
    pub source: String,
    #[serde(alias = "link", deserialize_with = "lenient::string")]
    pub url: String,
    #[serde(rename = "type", alias = "evidence_type", deserialize_with = "lenient::string")]
    pub kind: String,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub date: Option<String>,
    pub credibility: Credibility,
    #[serde(alias = "quote", deserialize_with = "lenient::string")]
    pub excerpt: String,
    #[serde(alias = "insight", deserialize_with = "lenient::string")]
    pub key_insight: String,
}

/// Something people already use to cope with the problem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlternativeSolution {
    #[serde(alias = "solution", deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(alias = "description", deserialize_with = "lenient::string")]
    pub approach: String,
    #[serde(deserialize_with = "lenient::string_list")]
    pub limitations: Vec<String>,
    #[serde(alias = "price", deserialize_with = "lenient::opt_string")]
    pub pricing: Option<String>,
}

/// Critique of the submitted problem statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatementFeedback {
    pub accuracy: String,
    pub specificity: String,
    pub improvements: String,
    /// Free-form feedback that did not fit the labelled fields.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
}

impl<'de> Deserialize<'de> for StatementFeedback {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Default, Deserialize)]
        #[serde(default)]
        struct Labelled {
            #[serde(deserialize_with = "lenient::string")]
            accuracy: String,
            #[serde(deserialize_with = "lenient::string")]
            specificity: String,
            #[serde(alias = "suggestions", deserialize_with = "lenient::string")]
            improvements: String,
            #[serde(deserialize_with = "lenient::string")]
            summary: String,
        }

        Ok(match Value::deserialize(d)? {
            value @ Value::Object(_) => {
                let l: Labelled = serde_json::from_value(value).unwrap_or_default();
                StatementFeedback {
                    accuracy: l.accuracy,
                    specificity: l.specificity,
                    improvements: l.improvements,
                    summary: l.summary,
                }
            }
            other => StatementFeedback {
                summary: lenient::string(other).unwrap_or_default(),
                ..StatementFeedback::default()
            },
        })
    }
}

impl StatementFeedback {
    pub fn is_empty(&self) -> bool {
        self.accuracy.is_empty()
            && self.specificity.is_empty()
            && self.improvements.is_empty()
            && self.summary.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemReport {
    #[serde(deserialize_with = "lenient::or_default")]
    pub problem_validation: ProblemSummary,
    #[serde(deserialize_with = "lenient::records")]
    pub evidence: Vec<EvidenceRecord>,
    #[serde(deserialize_with = "lenient::records")]
    pub alternative_solutions: Vec<AlternativeSolution>,
    pub problem_statement_feedback: StatementFeedback,
}

/// Problem validation domain.
pub struct ProblemValidation;

const HEADERS: &[(&str, &[&str])] = &[
    (
        "summary",
        &[
            "problem validation summary",
            "problem validation",
            "validation summary",
            "summary",
        ],
    ),
    ("evidence", &["evidence", "supporting evidence", "key evidence"]),
    (
        "solutions",
        &[
            "alternative solutions",
            "current solutions",
            "existing solutions",
            "alternatives",
        ],
    ),
    (
        "feedback",
        &["problem statement feedback", "statement feedback", "feedback"],
    ),
    ("limitations", &["research limitations"]),
    ("confidence", &["confidence score"]),
];

const SUMMARY_FIELDS: &[&str] = &[
    "exists",
    "problem exists",
    "severity",
    "frequency",
    "willingness to pay",
    "market size",
    "market size estimate",
    "confidence level",
];

static SPLITTER: LazyLock<SectionSplitter> = LazyLock::new(|| SectionSplitter::new(HEADERS));

static BRACKET_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d{1,2}[.)]\s*)?\[([^\]]+)\](?:\((https?://[^)\s]+)\))?\s*:?\s*(.*)$").unwrap()
});

static BOLD_HEAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\d{1,2}[.)]\s*)?\*\*([^*]+?):?\*\*\s*:?\s*(.*)$").unwrap());

static NAME_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d{1,2}[.)]\s*)?([^\s:\-*•\[#][^:]{0,80}?)\s*:\s*(.*)$").unwrap()
});

static SOLUTION_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^solution\s*\d+$").unwrap());

static PAREN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([^()]*)\)").unwrap());

fn parse_summary(body: &str) -> ProblemSummary {
    let field = |labels: &[&str]| sections::field_value(body, labels);
    ProblemSummary {
        exists: field(&["exists", "problem exists"]).and_then(|v| lenient::parse_bool(&v)),
        severity: field(&["severity"])
            .and_then(|v| lenient::parse_number(&v))
            .unwrap_or(0.0),
        frequency: field(&["frequency"])
            .and_then(|v| lenient::parse_number(&v))
            .unwrap_or(0.0),
        willingness_to_pay: field(&["willingness to pay"]),
        market_size_estimate: field(&["market size", "market size estimate"]),
        confidence_level: field(&["confidence level", "confidence"])
            .and_then(|v| lenient::parse_number(&v))
            .unwrap_or(0.0),
    }
}

fn has_summary_fields(body: &str) -> bool {
    body.lines()
        .filter_map(sections::split_label)
        .any(|(label, _)| SUMMARY_FIELDS.contains(&label.as_str()))
}

/// Split `type (date - credibility)` metadata after an evidence header.
fn apply_evidence_meta(evidence: &mut EvidenceRecord, meta: &str) {
    if let Some(url) = records::find_url(meta) {
        evidence.url = url;
    }
    if let Some(caps) = PAREN.captures(meta) {
        let inner = &caps[1];
        let (date, credibility) = match inner.rsplit_once(" - ") {
            Some((date, credibility)) => (date, Some(credibility)),
            None => (inner, None),
        };
        evidence.date = lenient::clean_text(date).filter(|d| lenient::parse_year(d).is_some());
        if let Some(credibility) = credibility {
            evidence.credibility = Credibility::parse(credibility);
        }
    }
    let kind = meta.split('(').next().unwrap_or("");
    if records::find_url(kind).is_none() {
        evidence.kind = lenient::clean_text(kind).unwrap_or_default();
    }
}

fn apply_evidence_label(evidence: &mut EvidenceRecord, label: &str, value: &str) -> bool {
    let text = || lenient::clean_text(value).unwrap_or_default();
    match label {
        "url" | "link" => evidence.url = records::find_url(value).unwrap_or_else(text),
        "type" | "evidence type" => evidence.kind = text(),
        "date" | "published" => evidence.date = lenient::clean_text(value),
        "credibility" => evidence.credibility = Credibility::parse(value),
        "excerpt" | "quote" => evidence.excerpt = text().trim_matches(['"', '“', '”']).to_string(),
        "key insight" | "insight" => evidence.key_insight = text(),
        _ => return false,
    }
    true
}

/// A `[Source]: meta` or `**Source**: meta` heading as `(source, url, meta)`.
fn evidence_heading(line: &str) -> Option<(String, Option<String>, String)> {
    if let Some(caps) = BRACKET_HEAD.captures(line) {
        let source = lenient::clean_text(&caps[1])?;
        let url = caps.get(2).map(|m| m.as_str().to_string());
        return Some((source, url, caps[3].to_string()));
    }
    let caps = BOLD_HEAD.captures(line)?;
    Some((lenient::clean_text(&caps[1])?, None, caps[2].to_string()))
}

/// Parse evidence headers (`[Source]: type (date - credibility)`) with their
/// quote bullets, and `Source:`-labelled blocks.
fn parse_evidence(body: &str) -> Vec<EvidenceRecord> {
    let mut evidence: Vec<EvidenceRecord> = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some((label, value)) = sections::split_label(trimmed) {
            if matches!(label.as_str(), "source" | "name" | "publisher") {
                if let Some(source) = lenient::clean_text(&value) {
                    evidence.push(EvidenceRecord {
                        source,
                        ..EvidenceRecord::default()
                    });
                }
                continue;
            }
            if let Some(current) = evidence.last_mut()
                && apply_evidence_label(current, &label, &value)
            {
                continue;
            }
        }

        if let Some((source, url, meta)) = evidence_heading(trimmed) {
            let mut record = EvidenceRecord {
                source,
                url: url.unwrap_or_default(),
                ..EvidenceRecord::default()
            };
            apply_evidence_meta(&mut record, &meta);
            evidence.push(record);
            continue;
        }

        let Some(current) = evidence.last_mut() else {
            continue;
        };
        let Some(text) = lenient::clean_text(&sections::strip_markup(sections::strip_bullet(trimmed)))
        else {
            continue;
        };
        let text = text.trim_matches(['"', '“', '”']).to_string();
        if current.excerpt.is_empty() {
            current.excerpt = text;
        } else if current.key_insight.is_empty() {
            current.key_insight = text;
        } else {
            current.key_insight.push(' ');
            current.key_insight.push_str(&text);
        }
    }

    evidence
}

fn apply_solution_label(solution: &mut AlternativeSolution, label: &str, value: &str) -> bool {
    match label {
        "approach" | "how it works" | "description" | "how it solves the problem" => {
            solution.approach = lenient::clean_text(value).unwrap_or_default();
        }
        "limitations" | "limitation" | "complaints" | "gaps" | "drawbacks" | "shortcomings" => {
            solution.limitations = value.split(';').filter_map(lenient::clean_text).collect();
        }
        "pricing" | "price" | "cost" => solution.pricing = lenient::clean_text(value),
        _ => return false,
    }
    true
}

fn is_solution_label(label: &str) -> bool {
    apply_solution_label(&mut AlternativeSolution::default(), label, "")
}

/// Blocks whose heading lines are recognised by `heading`, followed by
/// labelled detail lines.
fn solution_blocks(
    body: &str,
    heading: impl Fn(&str) -> Option<(String, String)>,
) -> Vec<AlternativeSolution> {
    let mut solutions: Vec<AlternativeSolution> = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some((label, value)) = sections::split_label(trimmed)
            && is_solution_label(&label)
        {
            if let Some(current) = solutions.last_mut() {
                apply_solution_label(current, &label, &value);
            }
            continue;
        }
        if let Some((name, approach)) = heading(trimmed) {
            solutions.push(AlternativeSolution {
                name,
                approach,
                ..AlternativeSolution::default()
            });
        }
    }
    solutions
}

fn bracket_heading(line: &str) -> Option<(String, String)> {
    let caps = BRACKET_HEAD.captures(line)?;
    let label = caps[1].trim();
    let rest = lenient::clean_text(&caps[3]).unwrap_or_default();
    if SOLUTION_PLACEHOLDER.is_match(label) {
        lenient::clean_text(&rest).map(|name| (name, String::new()))
    } else {
        lenient::clean_text(label).map(|name| (name, rest))
    }
}

fn bold_heading(line: &str) -> Option<(String, String)> {
    let caps = BOLD_HEAD.captures(line)?;
    let name = lenient::clean_text(&caps[1])?;
    let rest = sections::strip_markup(&caps[2]);
    let rest = rest.trim_start_matches(['-', '–', '—', ':', ' ']);
    Some((name, lenient::clean_text(rest).unwrap_or_default()))
}

/// `Name:` on an unbulleted line.
fn name_heading(line: &str) -> Option<(String, String)> {
    if line.starts_with(['-', '*', '•']) {
        return None;
    }
    let caps = NAME_HEAD.captures(line)?;
    let name = lenient::clean_text(&caps[1])?;
    let rest = lenient::clean_text(&caps[2]).unwrap_or_default();
    Some((name, rest))
}

fn list_heading(item: &str) -> (String, String) {
    let (name, approach) = item
        .split_once(": ")
        .or_else(|| item.split_once(" - "))
        .unwrap_or((item, ""));
    (name.trim().to_string(), approach.trim().to_string())
}

/// Parse alternative solutions. The first layout that yields anything wins:
/// `[Solution N]: Name` or `[Name]:` headings, `**Name**` headings,
/// `Name:` headings, then a plain list.
fn parse_solutions(body: &str) -> Vec<AlternativeSolution> {
    for heading in [bracket_heading, bold_heading, name_heading] {
        let solutions = solution_blocks(body, heading);
        if !solutions.is_empty() {
            return solutions;
        }
    }
    sections::list_items(body)
        .iter()
        .map(|item| {
            let (name, approach) = list_heading(item);
            AlternativeSolution {
                name,
                approach,
                ..AlternativeSolution::default()
            }
        })
        .collect()
}

fn parse_feedback(body: &str) -> StatementFeedback {
    let mut feedback = StatementFeedback {
        accuracy: sections::field_value(body, &["accuracy"]).unwrap_or_default(),
        specificity: sections::field_value(body, &["specificity"]).unwrap_or_default(),
        improvements: sections::field_value(body, &["improvements", "suggestions", "suggested improvements"])
            .unwrap_or_default(),
        summary: String::new(),
    };
    if feedback.is_empty() {
        feedback.summary = sections::list_items(body).join(" ");
    }
    feedback
}

fn text_confidence(report: &ProblemReport) -> f64 {
    let exists = if report.problem_validation.exists == Some(true) { 2 } else { 0 };
    let evidence = report.evidence.len().min(3);
    let solutions = report.alternative_solutions.len().min(2);
    (exists + evidence + solutions) as f64
}

impl ResearchDomain for ProblemValidation {
    type Report = ProblemReport;

    const NAME: &'static str = "problem_validation";
    const LABEL: &'static str = "Problem validation";
    const ANCHOR_KEYS: &'static [&'static str] = &["problem_validation"];
    const REQUIRED_FIELDS: &'static [&'static str] =
        &["business_idea", "problem_statement", "industry"];
    const CACHE_KEY_FIELDS: &'static [&'static str] =
        &["business_idea", "problem_statement", "industry"];
    const MAX_QUALITY: f64 = 8.0;

    fn validate_structure(object: &Map<String, Value>) -> bool {
        const EXPECTED: &[&str] = &[
            "exists",
            "severity",
            "frequency",
            "willingness_to_pay",
            "market_size_estimate",
            "confidence_level",
        ];
        object
            .get("problem_validation")
            .and_then(Value::as_object)
            .is_some_and(|summary| EXPECTED.iter().any(|key| summary.contains_key(*key)))
    }

    fn parse_headed_text(text: &str) -> Option<TextExtraction<ProblemReport>> {
        let sections = SPLITTER.split(text);
        let summary_body = sections.get("summary").unwrap_or(sections.preamble());
        if sections.is_empty() && !has_summary_fields(summary_body) {
            return None;
        }

        let report = ProblemReport {
            problem_validation: parse_summary(summary_body),
            evidence: sections.get("evidence").map(parse_evidence).unwrap_or_default(),
            alternative_solutions: sections
                .get("solutions")
                .map(parse_solutions)
                .unwrap_or_default(),
            problem_statement_feedback: sections
                .get("feedback")
                .map(parse_feedback)
                .unwrap_or_default(),
        };
        let reported_confidence =
            sections::reported_confidence(text).unwrap_or_else(|| text_confidence(&report));
        Some(TextExtraction {
            report,
            reported_confidence,
            limitations: sections.items("limitations"),
        })
    }

    fn repair(report: &mut ProblemReport) {
        let summary = &mut report.problem_validation;
        summary.severity = summary.severity.clamp(0.0, 10.0);
        summary.frequency = summary.frequency.clamp(0.0, 10.0);
        summary.confidence_level = summary.confidence_level.clamp(0.0, 10.0);

        report.evidence.retain(|e| !e.source.trim().is_empty());
        let mut names = HashSet::new();
        report
            .alternative_solutions
            .retain(|s| !s.name.trim().is_empty() && names.insert(s.name.trim().to_lowercase()));
    }

    fn assess(report: &ProblemReport) -> Assessment {
        let summary = &report.problem_validation;
        let high = report.evidence.iter().filter(|e| e.credibility.is_high()).count();
        let medium = report.evidence.iter().filter(|e| e.credibility.is_medium()).count();
        let evidence = report.evidence.len();
        let solutions = report.alternative_solutions.len();

        let mut points = match (high, medium) {
            (h, _) if h >= 2 => 3.0,
            (1, _) => 2.0,
            (_, m) if m >= 2 => 1.0,
            _ => 0.0,
        };
        points += match evidence {
            0 | 1 => 0.0,
            2 | 3 => 1.0,
            _ => 2.0,
        };
        points += match solutions {
            0 => 0.0,
            1 => 1.0,
            _ => 2.0,
        };
        if summary.exists.is_some() && summary.severity > 0.0 && summary.frequency > 0.0 {
            points += 1.0;
        }

        let mut missing = Vec::new();
        if summary.exists.is_none() {
            missing.push("problem_validation.exists".to_string());
        }
        if evidence == 0 {
            missing.push("evidence".to_string());
        }
        if solutions == 0 {
            missing.push("alternative_solutions".to_string());
        }
        if report.problem_statement_feedback.is_empty() {
            missing.push("problem_statement_feedback".to_string());
        }

        let sources: HashSet<String> =
            report.evidence.iter().map(|e| e.source.to_lowercase()).collect();
        finish_assessment(points, Self::MAX_QUALITY, evidence, sources.len(), high, missing)
    }

    fn reported_floor(report: &ProblemReport) -> Option<f64> {
        Some(report.problem_validation.confidence_level).filter(|c| *c > 0.0)
    }

    fn research_prompt(request: &ResearchRequest, queries: &[String], max_steps: usize) -> String {
        format!(
            r#"**Objective:** Research and validate whether this problem exists: "{problem}" in the {industry} industry.

**Context:** This is for the business idea: {idea}

**Your Role:** You are an expert market researcher specialising in problem validation. Find concrete evidence that the problem exists and assess how significant it is.

{access}

**Phase 1: Evidence gathering**
Run at least 5 of these search queries:
{queries}
For each piece of evidence note the source (name and URL), the type (research_study, forum_post, news_article, review, survey), the date, an exact quote, and the source's credibility.

**Phase 2: Problem assessment**
- Existence: does substantial evidence show the problem exists?
- Severity: how painful is it, 1-10?
- Frequency: how often is it encountered, 1-10?
- Willingness to pay: what do people pay today to solve it?
- Market size: how many people or businesses are affected?

**Phase 3: Alternative solutions**
Identify the top 2-3 current solutions: name, approach, limitations users mention, pricing.

**Phase 4: Problem statement evaluation**
Is the statement accurate? Is it specific enough? How could it be improved?

**Preferred output (JSON):**
```json
{{
  "problem_validation": {{
    "exists": true,
    "severity": 7,
    "frequency": 6,
    "willingness_to_pay": "$20-50 per month",
    "market_size_estimate": "2M small businesses in the US",
    "confidence_level": 7
  }},
  "evidence": [
    {{
      "source": "Website name",
      "url": "https://source.com/article",
      "type": "forum_post",
      "date": "2024-05-12",
      "credibility": "high",
      "excerpt": "Exact quote showing the problem exists",
      "key_insight": "What this tells us about the problem"
    }}
  ],
  "alternative_solutions": [
    {{
      "name": "Current solution",
      "approach": "How it addresses the problem",
      "limitations": ["Limitation 1", "Limitation 2"],
      "pricing": "Cost information"
    }}
  ],
  "problem_statement_feedback": {{
    "accuracy": "How well the statement captures the real problem",
    "specificity": "Whether it is specific enough",
    "improvements": "Suggested rewording"
  }},
  "confidence_score": 7,
  "research_limitations": ["Blocked sites or missing data"]
}}
```

**Fallback output (structured text):**
PROBLEM VALIDATION SUMMARY:
Exists: [Yes/No]
Severity: [1-10]
Frequency: [1-10]
Willingness to Pay: [$amount or range]
Market Size: [affected population]
Confidence Level: [1-10]

EVIDENCE:
[Source Name]: [type] ([date] - [credibility])
- [Exact quote or statistic]
- [Key insight]

ALTERNATIVE SOLUTIONS:
[Solution Name]:
- Approach: [how it solves the problem]
- Limitations: [complaints; separated by semicolons]
- Pricing: [cost]

PROBLEM STATEMENT FEEDBACK:
- Accuracy: [assessment]
- Specificity: [assessment]
- Improvements: [suggestions]

RESEARCH LIMITATIONS:
- [Blocked sites or missing data]

{reminder}"#,
            problem = request.problem(),
            industry = request.industry,
            idea = request.business_idea,
            access = prompt::access_rules(max_steps),
            queries = prompt::query_list(queries),
            reminder = prompt::FORMAT_REMINDER,
        )
    }

    fn query_prompt(request: &ResearchRequest) -> String {
        format!(
            "Generate 6-8 specific search queries to find out whether this problem exists and how \
             severe it is. Mix queries for statistics, customer complaints, current spending on \
             solutions, market research, forum discussions and news coverage. Be specific to the \
             problem rather than the industry.\n\n{}",
            prompt::query_rules(request)
        )
    }

    fn fallback_queries(request: &ResearchRequest) -> Vec<String> {
        let (problem, industry) = (request.problem(), &request.industry);
        vec![
            format!("\"{problem}\" statistics"),
            format!("{industry} \"{problem}\" problem"),
            format!("customers complain about \"{problem}\""),
            format!("how much do people pay to solve \"{problem}\""),
            format!("\"{problem}\" market size"),
            format!("\"{problem}\" forum discussion"),
            format!("{problem} survey research"),
            format!("cost of {problem} solutions"),
        ]
    }

    fn min_confidence(thresholds: &ConfidenceThresholds) -> f64 {
        thresholds.problem_validation
    }
}
