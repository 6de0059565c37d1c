//! Attributed evidence shared by the market and competition domains.

use crate::lenient;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::sync::LazyLock;

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\((https?://[^)\s]+)\)").unwrap());

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s)\]>"'|]+"#).unwrap());

static PAREN_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([^()]*\b(?:19|20)\d{2}\b[^()]*|(?i:date not found|no date|undated))\)").unwrap()
});

static ACCESS_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[(accessible|blocked|paywalled|paywall|timeout|timed out|captcha|inaccessible|partial)[^\]]*\]")
        .unwrap()
});

static CREDIBILITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)credibility\s*(?:score)?\s*[:=]?\s*(high|medium|low|\d+(?:\.\d+)?)").unwrap()
});

static MONEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:(?:USD|US\$|\$|€|£)\s*)?(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)\s*(trillion|billion|million|thousand|tn|bn|mn|[tbmk])\b",
    )
    .unwrap()
});

static GROWTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*%\s*(?:cagr|growth|annual|yoy|per year|a year)?").unwrap()
});

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["“]([^"”]{12,})["”]"#).unwrap());

static EXCERPT_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*(?:[-*•]\s*)?excerpt\s*:\s*(.+)$").unwrap());

/// How much a source can be trusted.
///
/// Agents report either a level (`high`/`medium`/`low`) or a 1–10 score.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Credibility {
    High,
    Medium,
    Low,
    Score(u8),
    #[default]
    Unknown,
}

impl Credibility {
    pub fn parse(text: &str) -> Self {
        let lowered = text.trim().trim_matches(['*', '"', '.']).to_lowercase();
        match lowered.as_str() {
            "high" | "very high" => Credibility::High,
            "medium" | "moderate" | "med" => Credibility::Medium,
            "low" | "very low" => Credibility::Low,
            _ => lenient::parse_number(&lowered)
                .map(Self::from_score)
                .unwrap_or(Credibility::Unknown),
        }
    }

    fn from_score(score: f64) -> Self {
        Credibility::Score(score.round().clamp(0.0, 10.0) as u8)
    }

    pub fn is_high(&self) -> bool {
        matches!(self, Credibility::High) || matches!(self, Credibility::Score(s) if *s >= 8)
    }

    pub fn is_medium(&self) -> bool {
        matches!(self, Credibility::Medium) || matches!(self, Credibility::Score(s) if (5..8).contains(s))
    }
}

impl Serialize for Credibility {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Credibility::High => s.serialize_str("high"),
            Credibility::Medium => s.serialize_str("medium"),
            Credibility::Low => s.serialize_str("low"),
            Credibility::Score(n) => s.serialize_u8(*n),
            Credibility::Unknown => s.serialize_str("unknown"),
        }
    }
}

impl<'de> Deserialize<'de> for Credibility {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n
                .as_f64()
                .map(Credibility::from_score)
                .unwrap_or_default(),
            Value::String(s) => Credibility::parse(&s),
            _ => Credibility::Unknown,
        })
    }
}

fn default_access_status() -> String {
    "accessible".to_string()
}

/// One attributed piece of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(
        default,
        alias = "publisher",
        alias = "source",
        alias = "title",
        deserialize_with = "lenient::string"
    )]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub url: String,
    #[serde(
        default,
        alias = "published_date",
        deserialize_with = "lenient::opt_string"
    )]
    pub date: Option<String>,
    #[serde(default, alias = "value", deserialize_with = "lenient::opt_number")]
    pub market_size: Option<f64>,
    #[serde(default, alias = "unit", deserialize_with = "lenient::opt_string")]
    pub market_size_unit: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_number")]
    pub growth_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_year")]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub credibility: Credibility,
    #[serde(default = "default_access_status", deserialize_with = "access_status")]
    pub access_status: String,
}

fn access_status<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let text = lenient::string(d)?;
    Ok(if text.is_empty() {
        default_access_status()
    } else {
        text.to_lowercase()
    })
}

impl Default for SourceRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            date: None,
            market_size: None,
            market_size_unit: None,
            growth_rate: None,
            year: None,
            excerpt: None,
            credibility: Credibility::Unknown,
            access_status: default_access_status(),
        }
    }
}

impl SourceRecord {
    /// Identity used for de-duplication: the URL, else the lowercased name.
    pub fn identity(&self) -> String {
        if self.url.is_empty() {
            self.name.to_lowercase()
        } else {
            self.url.trim_end_matches('/').to_lowercase()
        }
    }

    pub fn has_figure(&self) -> bool {
        self.market_size.is_some() || self.growth_rate.is_some()
    }

    /// Scrape a source from one list item of a `SOURCES:` section.
    ///
    /// Understands markdown links, bare URLs, `(date)` parentheticals,
    /// `[access status]` tags, `Credibility: N` and market figures such as
    /// `$12.3 billion` or `9.1% CAGR`. Returns `None` when the item names
    /// neither a publisher nor a URL.
    pub fn from_text(item: &str) -> Option<Self> {
        let mut record = SourceRecord::default();
        let mut rest = item.to_string();

        if let Some(groups) = take_match(&MARKDOWN_LINK, &mut rest) {
            record.name = lenient::clean_text(&groups[0]).unwrap_or_default();
            record.url = groups[1].clone();
        } else if let Some(url) = find_url(&rest) {
            rest = rest.replacen(&url, " ", 1);
            record.url = url;
        }

        if let Some(groups) = take_match(&ACCESS_STATUS, &mut rest) {
            record.access_status = groups[0].to_lowercase();
        }
        if let Some(groups) = take_match(&PAREN_DATE, &mut rest) {
            record.date =
                lenient::clean_text(&groups[0]).filter(|d| lenient::parse_year(d).is_some());
        }
        if let Some(groups) = take_match(&CREDIBILITY, &mut rest) {
            record.credibility = Credibility::parse(&groups[0]);
        }
        if let Some((value, unit)) = parse_money(&rest) {
            record.market_size = Some(value);
            record.market_size_unit = Some(unit);
        }
        let lowered = rest.to_lowercase();
        if lowered.contains("cagr") || lowered.contains("growth") {
            record.growth_rate = parse_percent(&rest);
        }
        record.year = record
            .date
            .as_deref()
            .and_then(lenient::parse_year)
            .or_else(|| lenient::parse_year(&rest));
        record.excerpt = EXCERPT_LABEL
            .captures(item)
            .and_then(|c| lenient::clean_text(&c[1]))
            .or_else(|| QUOTED.captures(item).map(|c| c[1].trim().to_string()));

        if record.name.is_empty() {
            record.name = first_name_segment(&rest).unwrap_or_default();
        }
        if record.name.is_empty() && !record.url.is_empty() {
            record.name = host_of(&record.url);
        }

        if record.name.is_empty() && record.url.is_empty() {
            None
        } else {
            Some(record)
        }
    }
}

/// Remove the first match of `re` from `text`, returning its capture groups.
fn take_match(re: &Regex, text: &mut String) -> Option<Vec<String>> {
    let (range, groups) = {
        let caps = re.captures(text.as_str())?;
        let groups: Vec<String> = caps
            .iter()
            .skip(1)
            .map(|g| g.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();
        (caps.get(0)?.range(), groups)
    };
    text.replace_range(range, " ");
    Some(groups)
}

/// Pick the first ` - ` separated segment that reads like a publisher name.
fn first_name_segment(text: &str) -> Option<String> {
    let first_line = text.lines().next().unwrap_or("");
    split_segments(first_line, &[" - ", " — ", " – ", " | "])
        .into_iter()
        .map(|part| {
            part.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
                .trim()
                .trim_start_matches("Source:")
                .trim_matches(['[', ']', ':', '-', ' '])
                .to_string()
        })
        .filter_map(|part| lenient::clean_text(&part))
        .find(|part| {
            part.chars().any(|c| c.is_alphabetic())
                && !MONEY.is_match(part)
                && !part.to_lowercase().starts_with("credibility")
        })
}

fn split_segments<'a>(text: &'a str, separators: &[&str]) -> Vec<&'a str> {
    let mut parts = vec![text];
    for sep in separators {
        parts = parts.into_iter().flat_map(|p| p.split(*sep)).collect();
    }
    parts
}

fn host_of(url: &str) -> String {
    url.split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("")
        .trim_start_matches("www.")
        .to_string()
}

/// Canonical spelling for a magnitude suffix.
pub fn normalize_unit(unit: &str) -> String {
    match unit.to_lowercase().as_str() {
        "t" | "tn" | "trillion" => "trillion",
        "b" | "bn" | "billion" => "billion",
        "m" | "mn" | "million" => "million",
        "k" | "thousand" => "thousand",
        other => return other.to_string(),
    }
    .to_string()
}

/// First monetary figure in `text` as `(value, unit)`.
pub fn parse_money(text: &str) -> Option<(f64, String)> {
    let caps = MONEY.captures(text)?;
    Some((lenient::parse_number(&caps[1])?, normalize_unit(&caps[2])))
}

/// First percentage in `text`.
pub fn parse_percent(text: &str) -> Option<f64> {
    GROWTH
        .captures(text)
        .and_then(|c| lenient::parse_number(&c[1]))
}

/// URL from a markdown link or bare link in `text`.
pub fn find_url(text: &str) -> Option<String> {
    MARKDOWN_LINK
        .captures(text)
        .map(|c| c[2].to_string())
        .or_else(|| {
            URL.find(text)
                .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_string())
        })
}

/// A list of sources. Objects are read field by field; plain strings are
/// scraped with [`SourceRecord::from_text`].
pub fn source_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<SourceRecord>, D::Error> {
    fn one(value: Value) -> Option<SourceRecord> {
        match value {
            Value::String(text) => SourceRecord::from_text(&text),
            value @ Value::Object(_) => serde_json::from_value(value).ok(),
            _ => None,
        }
    }
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items.into_iter().filter_map(one).collect(),
        Value::String(text) => text.lines().filter_map(SourceRecord::from_text).collect(),
        value @ Value::Object(_) => one(value).into_iter().collect(),
        _ => Vec::new(),
    })
}

/// Keep the first record for each identity, preserving order.
pub fn dedupe_sources(sources: &mut Vec<SourceRecord>) {
    let mut seen = std::collections::HashSet::new();
    sources.retain(|s| seen.insert(s.identity()));
}
