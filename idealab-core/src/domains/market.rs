//! Market sizing research: total size, growth, regional split and
//! addressable-market estimates, each backed by sources.

use super::{Assessment, ResearchDomain, TextExtraction, finish_assessment};
use crate::config::ConfidenceThresholds;
use crate::extract::sections::{self, SectionSplitter};
use crate::lenient;
use crate::prompt;
use crate::records::{self, SourceRecord};
use crate::types::ResearchRequest;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Keys of `market_data` that may appear at the top level in older replies.
const LEGACY_KEYS: &[&str] = &[
    "market_size",
    "growth_rate",
    "geographic_breakdown",
    "tam",
    "sam",
    "som",
    "sources",
];

/// A money figure such as "$12.3 billion in 2024".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketFigure {
    #[serde(deserialize_with = "lenient::opt_number")]
    pub value: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub unit: Option<String>,
    #[serde(deserialize_with = "lenient::opt_year")]
    pub year: Option<i32>,
    #[serde(deserialize_with = "records::source_list")]
    pub sources: Vec<SourceRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthFigure {
    /// Annual growth in percent.
    #[serde(alias = "cagr", deserialize_with = "lenient::opt_number")]
    pub value: Option<f64>,
    #[serde(alias = "forecast_period", deserialize_with = "lenient::opt_string")]
    pub period: Option<String>,
    #[serde(deserialize_with = "records::source_list")]
    pub sources: Vec<SourceRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketData {
    #[serde(deserialize_with = "figure")]
    pub market_size: MarketFigure,
    #[serde(deserialize_with = "growth")]
    pub growth_rate: GrowthFigure,
    #[serde(deserialize_with = "lenient::object")]
    pub geographic_breakdown: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "opt_figure")]
    pub tam: Option<MarketFigure>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "opt_figure")]
    pub sam: Option<MarketFigure>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "opt_figure")]
    pub som: Option<MarketFigure>,
    #[serde(deserialize_with = "records::source_list")]
    pub sources: Vec<SourceRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketReport {
    #[serde(deserialize_with = "lenient::or_default")]
    pub market_data: MarketData,
}

fn figure_from_value(value: Value) -> Option<MarketFigure> {
    match value {
        Value::Number(n) => Some(MarketFigure {
            value: n.as_f64(),
            ..MarketFigure::default()
        }),
        Value::String(text) => figure_from_text(&text),
        Value::Object(mut map) => {
            if let Some(Value::String(text)) = map.get("value").cloned()
                && !map.contains_key("unit")
                && let Some((value, unit)) = records::parse_money(&text)
            {
                map.insert("value".into(), Number::from_f64(value).map_or(Value::Null, Value::Number));
                map.insert("unit".into(), Value::String(unit));
            }
            serde_json::from_value(Value::Object(map)).ok()
        }
        _ => None,
    }
}

fn figure_from_text(text: &str) -> Option<MarketFigure> {
    let (value, unit) = match records::parse_money(text) {
        Some((value, unit)) => (Some(value), Some(unit)),
        None => (lenient::parse_number(text), None),
    };
    value.map(|value| MarketFigure {
        value: Some(value),
        unit,
        year: lenient::parse_year(text),
        sources: Vec::new(),
    })
}

/// A market figure given as an object, a bare number or text.
fn figure<'de, D: Deserializer<'de>>(d: D) -> Result<MarketFigure, D::Error> {
    Ok(figure_from_value(Value::deserialize(d)?).unwrap_or_default())
}

fn opt_figure<'de, D: Deserializer<'de>>(d: D) -> Result<Option<MarketFigure>, D::Error> {
    Ok(figure_from_value(Value::deserialize(d)?))
}

/// A growth figure given as an object, a bare number or text like "9.1% CAGR".
fn growth<'de, D: Deserializer<'de>>(d: D) -> Result<GrowthFigure, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => GrowthFigure {
            value: n.as_f64(),
            ..GrowthFigure::default()
        },
        Value::String(text) => growth_from_text(&text),
        value @ Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
        _ => GrowthFigure::default(),
    })
}

static PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?:19|20)\d{2})\s*(?:-|–|—|to)\s*((?:19|20)\d{2})\b").unwrap()
});

fn growth_from_text(text: &str) -> GrowthFigure {
    GrowthFigure {
        value: records::parse_percent(text),
        period: PERIOD.captures(text).map(|c| format!("{}-{}", &c[1], &c[2])),
        sources: Vec::new(),
    }
}

/// `Region: share` lines as a JSON object; numeric shares become numbers.
fn parse_breakdown(items: &[String]) -> Map<String, Value> {
    items
        .iter()
        .filter_map(|item| {
            let (region, share) = item.split_once(':')?;
            let region = lenient::clean_text(region)?;
            let share = lenient::clean_text(share)?;
            let value = lenient::parse_number(&share)
                .and_then(Number::from_f64)
                .map_or(Value::String(share), Value::Number);
            Some((region, value))
        })
        .collect()
}

/// Append `extra` (a list or a single record) to `data["sources"]`.
fn merge_sources(data: &mut Map<String, Value>, extra: Value) {
    let as_items = |value: Value| match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    let mut merged = data.remove("sources").map(as_items).unwrap_or_default();
    merged.extend(as_items(extra));
    data.insert("sources".to_string(), Value::Array(merged));
}

fn breakdown_regions(breakdown: &Map<String, Value>) -> usize {
    breakdown.keys().filter(|k| k.as_str() != "sources").count()
}

/// Market sizing domain.
pub struct MarketSizing;

const HEADERS: &[(&str, &[&str])] = &[
    ("size", &["market size", "total market size", "current market size"]),
    ("growth", &["growth rate", "market growth", "cagr"]),
    (
        "geography",
        &["geographic breakdown", "regional breakdown", "geography"],
    ),
    ("tam", &["tam", "total addressable market", "total addressable market (tam)"]),
    ("sam", &["sam", "serviceable addressable market", "serviceable addressable market (sam)"]),
    ("som", &["som", "serviceable obtainable market", "serviceable obtainable market (som)"]),
    ("sources", &["sources", "references"]),
    ("limitations", &["research limitations"]),
    ("confidence", &["confidence score"]),
];

static SPLITTER: LazyLock<SectionSplitter> = LazyLock::new(|| SectionSplitter::new(HEADERS));

impl ResearchDomain for MarketSizing {
    type Report = MarketReport;

    const NAME: &'static str = "market_sizing";
    const LABEL: &'static str = "Market sizing";
    const ANCHOR_KEYS: &'static [&'static str] = &["market_data", "market_size"];
    const REQUIRED_FIELDS: &'static [&'static str] = &["business_idea", "industry", "product_type"];
    const CACHE_KEY_FIELDS: &'static [&'static str] = &["business_idea", "industry", "product_type"];
    const MAX_QUALITY: f64 = 10.0;

    fn normalize_json(mut object: Map<String, Value>) -> Map<String, Value> {
        if object.contains_key("market_data") {
            if let Some(sources) = object.remove("sources") {
                match object.get_mut("market_data") {
                    Some(Value::Object(data)) => merge_sources(data, sources),
                    _ => {
                        object.insert("sources".to_string(), sources);
                    }
                }
            }
            return object;
        }
        if !(object.contains_key("market_size") || object.contains_key("growth_rate")) {
            return object;
        }
        let mut market_data = Map::new();
        for key in LEGACY_KEYS {
            if let Some(value) = object.remove(*key) {
                market_data.insert((*key).to_string(), value);
            }
        }
        object.insert("market_data".to_string(), Value::Object(market_data));
        object
    }

    fn validate_structure(object: &Map<String, Value>) -> bool {
        object
            .get("market_data")
            .and_then(Value::as_object)
            .is_some_and(|data| LEGACY_KEYS.iter().any(|key| data.contains_key(*key)))
    }

    fn parse_headed_text(text: &str) -> Option<TextExtraction<MarketReport>> {
        let sections = SPLITTER.split(text);
        if sections.is_empty() {
            return None;
        }

        let figure_at = |key: &str| sections.get(key).and_then(figure_from_text);
        let market_data = MarketData {
            market_size: figure_at("size").unwrap_or_default(),
            growth_rate: sections.get("growth").map(growth_from_text).unwrap_or_default(),
            geographic_breakdown: parse_breakdown(&sections.items("geography")),
            tam: figure_at("tam"),
            sam: figure_at("sam"),
            som: figure_at("som"),
            sources: sections
                .items("sources")
                .iter()
                .filter_map(|item| SourceRecord::from_text(item))
                .collect(),
        };

        Some(TextExtraction {
            report: MarketReport { market_data },
            reported_confidence: sections::reported_confidence(text).unwrap_or(0.0),
            limitations: sections.items("limitations"),
        })
    }

    fn repair(report: &mut MarketReport) {
        let data = &mut report.market_data;
        for figure in [Some(&mut data.market_size), data.tam.as_mut(), data.sam.as_mut(), data.som.as_mut()]
            .into_iter()
            .flatten()
        {
            figure.unit = figure.unit.as_deref().map(records::normalize_unit);
        }
        let regional = data
            .geographic_breakdown
            .get("sources")
            .cloned()
            .and_then(|v| records::source_list(v).ok())
            .unwrap_or_default();
        let nested: Vec<SourceRecord> = data
            .market_size
            .sources
            .iter()
            .chain(&data.growth_rate.sources)
            .cloned()
            .chain(regional)
            .collect();
        data.sources.extend(nested);
        data.sources
            .retain(|s| !s.name.trim().is_empty() || !s.url.trim().is_empty());
        records::dedupe_sources(&mut data.sources);
    }

    fn assess(report: &MarketReport) -> Assessment {
        let data = &report.market_data;
        let figures = data.sources.iter().filter(|s| s.has_figure()).count();
        let high = data.sources.iter().filter(|s| s.credibility.is_high()).count();
        let publishers: HashSet<String> = data
            .sources
            .iter()
            .map(|s| s.name.trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();

        let mut points = figures.min(3) as f64;
        points += match high {
            0 => 0.0,
            1 => 1.0,
            _ => 2.0,
        };

        let mut missing = Vec::new();
        for (field, present) in [
            ("market_size.value", data.market_size.value.is_some()),
            ("growth_rate.value", data.growth_rate.value.is_some()),
            ("growth_rate.period", data.growth_rate.period.is_some()),
            ("geographic_breakdown", breakdown_regions(&data.geographic_breakdown) > 0),
        ] {
            if present {
                points += 1.0;
            } else {
                missing.push(field.to_string());
            }
        }
        if publishers.len() >= 2 {
            points += 1.0;
        }
        if data.sources.is_empty() {
            missing.push("sources".to_string());
        }

        finish_assessment(points, Self::MAX_QUALITY, figures, data.sources.len(), high, missing)
    }

    fn research_prompt(request: &ResearchRequest, queries: &[String], max_steps: usize) -> String {
        format!(
            r#"**Objective:** Find reliable market size data for: "{idea}" (Industry: {industry}, Product Type: {product}).

**Your Role:** You are an expert market sizing analyst. The most important part of the job is finding actual numbers with sources.

{access}

**Phase 1: Search**
Run at least 4 of these search queries:
{queries}

**Phase 2: Collect figures**
Find 3 or more credible sources (industry reports, market research firms, business publications). For each source record:
- total market size in dollars, with the unit (billion/million) and year
- growth rate (CAGR) and the forecast period
- geographic breakdown if available
- the exact excerpt where the figure appears, and a credibility score (1-10)

**Phase 3: Addressable market**
Estimate TAM, SAM and SOM for this specific idea where the data allows. If no exact data exists for this product, use the closest category and say so under research limitations.

**Preferred output (JSON):**
```json
{{
  "market_data": {{
    "market_size": {{"value": 12.3, "unit": "billion", "year": 2024}},
    "growth_rate": {{"value": 9.1, "period": "2024-2030"}},
    "geographic_breakdown": {{"North America": 45, "Europe": 25, "Asia Pacific": 20, "Rest of World": 10}},
    "tam": {{"value": 12.3, "unit": "billion"}},
    "sam": {{"value": 2.1, "unit": "billion"}},
    "som": {{"value": 40, "unit": "million"}},
    "sources": [
      {{
        "name": "Publisher",
        "url": "https://source.com/report",
        "date": "2023-10-15",
        "market_size": 12.3,
        "market_size_unit": "billion",
        "growth_rate": 9.1,
        "year": 2024,
        "excerpt": "The exact text where the figure was found",
        "credibility": 8,
        "access_status": "accessible"
      }}
    ]
  }},
  "confidence_score": 7,
  "research_limitations": ["Blocked sites or missing data"]
}}
```

**Fallback output (structured text):**
MARKET SIZE: [$value unit] ([year])
GROWTH RATE: [value]% CAGR ([start year]-[end year])
GEOGRAPHIC BREAKDOWN:
- [Region]: [share]%
TAM: [$value unit]
SAM: [$value unit]
SOM: [$value unit]
SOURCES:
1. [URL] - [Publisher] ([Date]) [Access status] - [$value unit], [growth]% CAGR - Credibility: [1-10]
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
            "Generate 6-8 specific search queries to find published market size figures, growth \
             rates and forecasts for this business idea. Prefer queries that surface market \
             research reports, industry statistics and analyst estimates for the narrowest \
             category that contains the product.\n\n{}",
            prompt::query_rules(request)
        )
    }

    fn fallback_queries(request: &ResearchRequest) -> Vec<String> {
        let (industry, product) = (&request.industry, &request.product_type);
        vec![
            format!("{industry} market size 2024"),
            format!("{product} market forecast"),
            format!("{industry} {product} market size"),
            format!("{industry} {product} market CAGR"),
            format!("{industry} market growth rate report"),
            format!("{product} market share by region"),
            format!("{industry} {product} industry statistics"),
        ]
    }

    fn min_confidence(thresholds: &ConfidenceThresholds) -> f64 {
        thresholds.market_sizing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractionPath, extract};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_legacy_flat_shape_is_hoisted() {
        let raw = json!({
            "market_size": {
                "value": "4.2 billion",
                "year": 2024,
                "sources": [{"publisher": "IBISWorld", "url": "https://ibisworld.com/a", "credibility": 8}]
            },
            "growth_rate": {"value": 7.5, "period": "2024-2030", "sources": [
                {"publisher": "Statista", "url": "https://statista.com/b", "credibility": "high"}
            ]},
            "confidence_score": 6
        })
        .to_string();
        let extraction = extract::<MarketSizing>(&raw);
        assert_eq!(extraction.path, ExtractionPath::Json);
        let data = &extraction.envelope.payload.market_data;
        assert_eq!(data.market_size.value, Some(4.2));
        assert_eq!(data.market_size.unit.as_deref(), Some("billion"));
        assert_eq!(data.growth_rate.period.as_deref(), Some("2024-2030"));
        // top-level sources are the union of the nested ones
        assert_eq!(data.sources.len(), 2);
        // 0 figures + 2 high + size + growth + period + 2 publishers
        assert_eq!(extraction.envelope.confidence_score, 6.0);
        let quality = extraction.envelope.data_quality.unwrap();
        assert_eq!(quality.high_credibility_sources, 2);
        assert_eq!(quality.missing_fields, vec!["geographic_breakdown"]);
    }

    #[test]
    fn test_top_level_sources_join_market_data() {
        let raw = r#"```json
{
  "market_data": {
    "market_size": {"value": 12.3, "unit": "billion USD", "year": 2024},
    "growth_rate": {"value": 8.5, "period": "2024-2030"}
  },
  "sources": [
    {"name": "Grand View Research", "url": "https://grandviewresearch.com/a", "market_size": 12.3, "credibility": "high"},
    {"name": "Statista", "url": "https://statista.com/b", "market_size": 11.9, "credibility": "high"},
    {"name": "IBISWorld", "url": "https://ibisworld.com/c", "market_size": 12.8, "credibility": 9}
  ],
  "confidence_score": 2
}
```"#;
        let extraction = extract::<MarketSizing>(raw);
        assert_eq!(extraction.path, ExtractionPath::Json);
        let envelope = extraction.envelope;
        assert_eq!(envelope.payload.market_data.sources.len(), 3);
        assert!(!envelope.extra.contains_key("sources"));
        // 3 figures + 2 high + size + growth + period + publishers
        assert_eq!(envelope.confidence_score, 9.0);
    }

    #[test]
    fn test_regional_sources_are_merged() {
        let raw = json!({
            "market_data": {
                "market_size": {"value": 2.0, "unit": "billion"},
                "geographic_breakdown": {
                    "North America": "40%",
                    "sources": [{"name": "Mordor Intelligence", "url": "https://mordor.com/r", "credibility": "medium"}]
                },
                "sources": [{"name": "Statista", "url": "https://statista.com/b"}]
            }
        })
        .to_string();
        let data = extract::<MarketSizing>(&raw).envelope.payload.market_data;
        let names: Vec<&str> = data.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Statista", "Mordor Intelligence"]);
        assert_eq!(breakdown_regions(&data.geographic_breakdown), 1);
    }

    #[test]
    fn test_headed_text_layout() {
        let text = "\
MARKET SIZE: $12.3 billion (2024)
GROWTH RATE: 9.1% CAGR (2024-2030)
GEOGRAPHIC BREAKDOWN:
- North America: 45%
- Europe: 25%
TAM: $12.3B
SOM: $40 million
SOURCES:
1. https://www.grandviewresearch.com/report - Grand View Research (2024-03-10) [Accessible] - $12.3 billion, 9.1% CAGR - Credibility: 8
2. https://www.marketsandmarkets.com/x - MarketsandMarkets (2023-11-01) - $11.8 billion - Credibility: 7
RESEARCH LIMITATIONS:
- Statista paywall
";
        let extraction = extract::<MarketSizing>(text);
        assert_eq!(extraction.path, ExtractionPath::HeadedText);
        let data = &extraction.envelope.payload.market_data;
        assert_eq!(data.market_size.value, Some(12.3));
        assert_eq!(data.market_size.year, Some(2024));
        assert_eq!(data.growth_rate.value, Some(9.1));
        assert_eq!(data.growth_rate.period.as_deref(), Some("2024-2030"));
        assert_eq!(data.geographic_breakdown.get("North America"), Some(&json!(45.0)));
        assert_eq!(data.tam.as_ref().and_then(|t| t.unit.clone()).as_deref(), Some("billion"));
        assert_eq!(data.sam, None);
        assert_eq!(data.som.as_ref().and_then(|s| s.value), Some(40.0));
        assert_eq!(data.sources.len(), 2);
        // 2 figures + 1 high + size + growth + period + geography + 2 publishers
        assert_eq!(extraction.envelope.confidence_score, 8.0);
        assert_eq!(extraction.envelope.research_limitations, vec!["Statista paywall"]);
    }

    #[test]
    fn test_figure_accepts_loose_shapes() {
        let data: MarketData = serde_json::from_value(json!({
            "market_size": "$3.5bn in 2023",
            "growth_rate": "11% CAGR 2023 to 2028",
            "tam": 90,
            "geographic_breakdown": "global"
        }))
        .unwrap();
        assert_eq!(data.market_size.value, Some(3.5));
        assert_eq!(data.market_size.unit.as_deref(), Some("billion"));
        assert_eq!(data.market_size.year, Some(2023));
        assert_eq!(data.growth_rate.value, Some(11.0));
        assert_eq!(data.growth_rate.period.as_deref(), Some("2023-2028"));
        assert_eq!(data.tam.and_then(|t| t.value), Some(90.0));
        assert!(data.geographic_breakdown.is_empty());
    }

    #[test]
    fn test_structure_check() {
        let ok = json!({"market_data": {"growth_rate": {}}});
        let empty = json!({"market_data": {}});
        assert!(MarketSizing::validate_structure(ok.as_object().unwrap()));
        assert!(!MarketSizing::validate_structure(empty.as_object().unwrap()));
    }
}
