//! Competitive landscape research.

use super::{Assessment, ResearchDomain, TextExtraction, finish_assessment};
use crate::config::ConfidenceThresholds;
use crate::extract::sections::{self, SectionSplitter};
use crate::lenient;
use crate::prompt;
use crate::records::{self, SourceRecord};
use crate::types::ResearchRequest;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::LazyLock;

const UNKNOWN: &str = "unknown";

fn unknown() -> String {
    UNKNOWN.to_string()
}

/// One competing company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitorRecord {
    #[serde(alias = "company", alias = "company_name", deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(alias = "url", alias = "website_url", deserialize_with = "lenient::string")]
    pub website: String,
    #[serde(
        alias = "key_products",
        alias = "features",
        deserialize_with = "lenient::comma_list"
    )]
    pub products: Vec<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub target_audience: String,
    #[serde(alias = "pricing", deserialize_with = "lenient::string")]
    pub pricing_model: String,
    #[serde(alias = "usps", deserialize_with = "lenient::comma_list")]
    pub unique_selling_points: Vec<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub market_position: String,
    #[serde(alias = "founded_year", deserialize_with = "lenient::opt_year")]
    pub founded: Option<i32>,
    #[serde(deserialize_with = "lenient::string")]
    pub funding: String,
}

impl CompetitorRecord {
    fn named(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Apply one `Label: value` detail. Returns `false` for unknown labels.
    fn apply_detail(&mut self, label: &str, value: &str) -> bool {
        let text = || lenient::clean_text(value).unwrap_or_default();
        match label {
            "website" | "website url" | "url" | "site" | "homepage" => {
                self.website = records::find_url(value).unwrap_or_else(text);
            }
            "products" | "key products" | "products/features" | "key products/features"
            | "features" | "offerings" | "product" => {
                self.products = lenient::split_list(value);
            }
            "target audience" | "audience" | "target market" | "customers" | "target customers" => {
                self.target_audience = text();
            }
            "pricing" | "pricing model" | "price" | "prices" => self.pricing_model = text(),
            "usps" | "usp" | "unique selling points" | "unique selling points (usps)"
            | "differentiators" => {
                self.unique_selling_points = lenient::split_list(value);
            }
            "market position" | "position" | "market share" => self.market_position = text(),
            "founded" | "founded year" | "year founded" => self.founded = lenient::parse_year(value),
            "funding" | "funding raised" | "total funding" => self.funding = text(),
            _ => return false,
        }
        true
    }
}

/// The competitive landscape for one idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitionReport {
    #[serde(deserialize_with = "lenient::records")]
    pub competitors: Vec<CompetitorRecord>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub market_gaps: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub barriers_to_entry: Vec<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub market_concentration: String,
    #[serde(deserialize_with = "lenient::string_list")]
    pub emerging_trends: Vec<String>,
    #[serde(deserialize_with = "records::source_list")]
    pub sources: Vec<SourceRecord>,
}

impl Default for CompetitionReport {
    fn default() -> Self {
        Self {
            competitors: Vec::new(),
            market_gaps: Vec::new(),
            barriers_to_entry: Vec::new(),
            market_concentration: unknown(),
            emerging_trends: Vec::new(),
            sources: Vec::new(),
        }
    }
}

/// Competition analysis domain.
pub struct Competition;

const HEADERS: &[(&str, &[&str])] = &[
    (
        "competitors",
        &["competitors", "key competitors", "direct competitors", "competitor profiles"],
    ),
    ("gaps", &["market gaps", "gaps in the market", "unmet needs"]),
    ("barriers", &["barriers to entry", "entry barriers"]),
    ("concentration", &["market concentration"]),
    ("trends", &["emerging trends", "market trends"]),
    ("sources", &["sources", "references"]),
    ("limitations", &["research limitations"]),
    ("confidence", &["confidence score"]),
];

static SPLITTER: LazyLock<SectionSplitter> = LazyLock::new(|| SectionSplitter::new(HEADERS));

static WEBSITE_PAREN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(\s*(?:website|url|site)\s*:\s*([^)]*)\)").unwrap()
});

static NUMBERED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{1,2}[.)]\s*").unwrap());

/// Read a competitor name from a block's heading line.
///
/// Handles `Acme (Website: https://acme.com)`, `**Acme** - description`,
/// `### Acme` and `[Acme](https://acme.com)`.
fn parse_heading(line: &str) -> Option<CompetitorRecord> {
    let mut rest = line.trim_start_matches('#').trim().to_string();
    let mut website = String::new();

    if let Some(caps) = WEBSITE_PAREN.captures(&rest) {
        let inner = caps[1].to_string();
        website = records::find_url(&inner)
            .or_else(|| lenient::clean_text(&inner))
            .unwrap_or_default();
        rest = WEBSITE_PAREN.replace(&rest, "").to_string();
    } else if let Some(url) = records::find_url(&rest) {
        website = url;
    }

    let rest = sections::strip_markup(&rest);
    let name = rest
        .split([':', '(', '|'])
        .next()
        .and_then(|head| {
            [" - ", " – ", " — "]
                .iter()
                .fold(head, |acc, sep| acc.split(sep).next().unwrap_or(acc))
                .trim()
                .trim_matches(['[', ']'])
                .split("](")
                .next()
        })
        .and_then(lenient::clean_text)?;

    Some(CompetitorRecord {
        website,
        ..CompetitorRecord::named(name)
    })
}

/// Parse the competitors section in any of the supported layouts.
fn parse_competitors(body: &str) -> Vec<CompetitorRecord> {
    let mut competitors: Vec<CompetitorRecord> = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let numbered = NUMBERED.is_match(trimmed);
        let bulleted = !numbered && trimmed.starts_with(['-', '*', '•']) && !trimmed.starts_with("**");
        let content = sections::strip_bullet(trimmed);

        let pairs: Vec<(String, String)> = content
            .split(" | ")
            .filter_map(sections::split_label)
            .collect();
        let known = pairs.first().is_some_and(|(label, _)| is_detail_label(label));

        if known {
            for (label, value) in &pairs {
                if matches!(label.as_str(), "name" | "company" | "company name") {
                    if let Some(name) = lenient::clean_text(value) {
                        competitors.push(CompetitorRecord::named(name));
                    }
                } else if let Some(current) = competitors.last_mut() {
                    current.apply_detail(label, value);
                }
            }
            continue;
        }

        if bulleted && !competitors.is_empty() {
            continue;
        }
        if let Some(competitor) = parse_heading(content) {
            competitors.push(competitor);
        }
    }

    competitors
}

fn is_detail_label(label: &str) -> bool {
    matches!(label, "name" | "company" | "company name")
        || CompetitorRecord::default().apply_detail(label, "")
}

fn text_confidence(report: &CompetitionReport) -> f64 {
    let competitors = report.competitors.len().min(5);
    let sources = report.sources.len().min(3);
    let analysis = (report.market_gaps.len() + report.barriers_to_entry.len()).min(2);
    (competitors + sources + analysis) as f64
}

impl ResearchDomain for Competition {
    type Report = CompetitionReport;

    const NAME: &'static str = "competition";
    const LABEL: &'static str = "Competition analysis";
    const ANCHOR_KEYS: &'static [&'static str] = &["competitors"];
    const REQUIRED_FIELDS: &'static [&'static str] = &["business_idea", "industry", "product_type"];
    const CACHE_KEY_FIELDS: &'static [&'static str] =
        &["business_idea", "industry", "product_type", "problem_statement"];
    const MAX_QUALITY: f64 = 9.0;

    fn validate_structure(object: &Map<String, Value>) -> bool {
        object
            .get("competitors")
            .is_some_and(|v| v.is_array() || v.is_object())
    }

    fn parse_headed_text(text: &str) -> Option<TextExtraction<CompetitionReport>> {
        let sections = SPLITTER.split(text);
        if sections.is_empty() {
            return None;
        }

        let mut report = CompetitionReport {
            competitors: sections
                .get("competitors")
                .map(parse_competitors)
                .unwrap_or_default(),
            market_gaps: sections.items("gaps"),
            barriers_to_entry: sections.items("barriers"),
            emerging_trends: sections.items("trends"),
            sources: sections
                .items("sources")
                .iter()
                .filter_map(|item| SourceRecord::from_text(item))
                .collect(),
            ..CompetitionReport::default()
        };
        if let Some(concentration) = lenient::clean_text(&sections.items("concentration").join(" ")) {
            report.market_concentration = concentration;
        }

        let reported_confidence =
            sections::reported_confidence(text).unwrap_or_else(|| text_confidence(&report));
        Some(TextExtraction {
            report,
            reported_confidence,
            limitations: sections.items("limitations"),
        })
    }

    fn repair(report: &mut CompetitionReport) {
        let mut names = HashSet::new();
        report
            .competitors
            .retain(|c| !c.name.trim().is_empty() && names.insert(c.name.trim().to_lowercase()));
        report.sources.retain(|s| !s.url.trim().is_empty());
        records::dedupe_sources(&mut report.sources);
        if lenient::is_placeholder(&report.market_concentration) {
            report.market_concentration = unknown();
        }
    }

    fn assess(report: &CompetitionReport) -> Assessment {
        let mut points = 0.0;
        let mut missing = Vec::new();

        let competitors = report.competitors.len();
        points += if competitors >= 3 { 3.0 } else { competitors as f64 };
        if competitors == 0 {
            missing.push("competitors".to_string());
        }
        for (field, len) in [
            ("market_gaps", report.market_gaps.len()),
            ("barriers_to_entry", report.barriers_to_entry.len()),
            ("emerging_trends", report.emerging_trends.len()),
        ] {
            if len >= 2 {
                points += 1.0;
            }
            if len == 0 {
                missing.push(field.to_string());
            }
        }
        if report.market_concentration != UNKNOWN {
            points += 1.0;
        } else {
            missing.push("market_concentration".to_string());
        }
        let sources = report.sources.len();
        points += match sources {
            0 => 0.0,
            1 | 2 => 1.0,
            _ => 2.0,
        };
        if sources == 0 {
            missing.push("sources".to_string());
        }

        let high = report.sources.iter().filter(|s| s.credibility.is_high()).count();
        finish_assessment(points, Self::MAX_QUALITY, competitors, sources, high, missing)
    }

    fn research_prompt(request: &ResearchRequest, queries: &[String], max_steps: usize) -> String {
        format!(
            r#"**Objective:** Conduct a comprehensive competitive landscape analysis for the business idea: "{idea}" (Industry: {industry}, Product Type: {product}).

**Your Role:** You are an expert market research analyst. Be thorough and accurate, and structure your findings exactly as requested.

{access}

**Phase 1: Competitor identification**
1. Run at least 5 of these search queries:
{queries}
2. Identify distinct competitors offering similar solutions to a similar audience.

**Phase 2: Competitor profiles**
For each competitor collect: company name, website URL, key products/features, target audience, pricing model (with prices where public), 2-3 unique selling points, market position (share or revenue if found), founded year and funding.

**Phase 3: Market analysis**
1. Market gaps: 2-4 unmet needs, each with the observation that supports it.
2. Barriers to entry: 2-4 significant challenges for a new entrant.
3. Market concentration: highly concentrated, moderately concentrated or fragmented, with a short justification.
4. Emerging trends: 2-3 trends shaping this market.

**Phase 4: Sources**
For each significant data point record the URL, publication name, publication date (YYYY-MM-DD) and access status.

**Preferred output (JSON):**
```json
{{
  "competitors": [
    {{
      "name": "Company Name",
      "website": "https://domain.com",
      "products": ["Product A", "Product B"],
      "target_audience": "Specific market segment",
      "pricing_model": "Freemium, Pro at $29/month",
      "unique_selling_points": ["USP 1", "USP 2"],
      "market_position": "Niche player, ~5% share",
      "founded": 2015,
      "funding": "$10M Series A"
    }}
  ],
  "market_gaps": ["Gap with supporting observation"],
  "barriers_to_entry": ["Barrier description"],
  "market_concentration": "Fragmented: no player above 10% share",
  "emerging_trends": ["Trend description"],
  "sources": [
    {{"url": "https://source.com", "name": "Publication", "date": "2024-05-12", "access_status": "accessible"}}
  ],
  "confidence_score": 8,
  "research_limitations": ["Blocked sites or missing data"]
}}
```

**Fallback output (structured text):**
COMPETITORS:
1. [Company Name] (Website: [URL])
- Products: [list]
- Target Audience: [description]
- Pricing: [details]
- USPs: [list]
- Market Position: [description]
- Founded: [year] | Funding: [details]

MARKET GAPS:
1. [Gap with supporting observation]

BARRIERS TO ENTRY:
1. [Barrier]

MARKET CONCENTRATION:
[Assessment and justification]

EMERGING TRENDS:
1. [Trend]

SOURCES:
1. [URL] - [Publication Name] ([Date]) [Access status]

RESEARCH LIMITATIONS:
- [Blocked sites or missing data]

CONFIDENCE SCORE: [1-10]

{reminder}"#,
            idea = request.business_idea,
            industry = request.industry,
            product = request.product_type,
            access = prompt::access_rules(max_steps),
            queries = prompt::query_list(queries),
            reminder = prompt::FORMAT_REMINDER,
        )
    }

    fn query_prompt(request: &ResearchRequest) -> String {
        format!(
            "Generate 6-8 specific search queries for competitive research. The queries should find \
             companies solving the same problem for the same customers, not just companies in the \
             broad industry. Focus on the value proposition, the technology involved and the pain \
             points a customer would search for.\n\n{}",
            prompt::query_rules(request)
        )
    }

    fn fallback_queries(request: &ResearchRequest) -> Vec<String> {
        let (industry, product) = (&request.industry, &request.product_type);
        vec![
            format!("top {industry} {product} companies"),
            format!("{industry} {product} market leaders"),
            format!("leading {industry} {product} solutions"),
            format!("{industry} startups {product}"),
            format!("{product} {industry} market share analysis"),
            format!("{industry} {product} pricing comparison"),
            format!("reviews of {industry} {product}"),
        ]
    }

    fn min_confidence(thresholds: &ConfidenceThresholds) -> f64 {
        thresholds.competition
    }
}
