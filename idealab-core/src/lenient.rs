//! Lenient value coercion for agent-produced data.
//!
//! Agents return loosely typed JSON: numbers as strings ("8/10"), lists as
//! comma-joined strings, booleans as "Yes". The `deserialize_with` helpers
//! here accept any JSON shape and coerce it to the field's type, falling back
//! to the type's default instead of failing. The plain `parse_*` functions
//! apply the same rules to text scraped from headed sections.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::sync::LazyLock;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d{1,3}(?:,\d{3})+(?:\.\d+)?|-?\d+(?:\.\d+)?").unwrap());

static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").unwrap());

/// Values agents use to say "no data".
const PLACEHOLDERS: &[&str] = &[
    "",
    "-",
    "none",
    "null",
    "n/a",
    "na",
    "not found",
    "not specified",
    "not available",
    "not disclosed",
    "unknown",
    "tbd",
];

/// Whether `text` is a "no data" marker such as `N/A` or `Not found`.
pub fn is_placeholder(text: &str) -> bool {
    let lowered = text
        .trim()
        .trim_matches(|c: char| c == '.' || c == '*' || c == '"' || c == '\'')
        .trim()
        .to_lowercase();
    PLACEHOLDERS.contains(&lowered.as_str())
}

/// Trim a scraped value, returning `None` for placeholders.
pub fn clean_text(text: &str) -> Option<String> {
    let trimmed = text
        .trim()
        .trim_matches(|c: char| c == '*' || c == '_' || c == '`')
        .trim()
        .trim_matches('"')
        .trim();
    if is_placeholder(trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// First number in `text`, ignoring thousands separators.
///
/// `"8/10"` → 8, `"$1,200.50"` → 1200.5, `"12.5% CAGR"` → 12.5.
pub fn parse_number(text: &str) -> Option<f64> {
    NUMBER
        .find(text)
        .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// First plausible four-digit year in `text`.
pub fn parse_year(text: &str) -> Option<i32> {
    YEAR.find(text).and_then(|m| m.as_str().parse().ok())
}

/// Interpret yes/no style answers.
pub fn parse_bool(text: &str) -> Option<bool> {
    let lowered = text.trim().trim_matches(['.', '*', '"']).to_lowercase();
    let first = lowered.split(|c: char| !c.is_alphanumeric()).next()?;
    match first {
        "yes" | "true" | "y" | "confirmed" | "validated" | "partially" | "partial" => Some(true),
        "no" | "false" | "n" | "unconfirmed" => Some(false),
        _ => None,
    }
}

/// Split a scraped list value on commas, semicolons and pipes.
pub fn split_list(text: &str) -> Vec<String> {
    text.split([',', ';', '|'])
        .filter_map(clean_text)
        .collect()
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean_text(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_to_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("; "))
            }
        }
        Value::Null | Value::Object(_) => None,
    }
}

fn value_to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|n| n.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn value_to_list(value: Value, split: bool) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_to_text).collect(),
        Value::String(s) if split => split_list(&s),
        Value::String(s) => s
            .lines()
            .map(|line| line.trim().trim_start_matches(['-', '*', '•']).trim())
            .filter_map(clean_text)
            .collect(),
        other => value_to_text(&other).into_iter().collect(),
    }
}

/// Any value as trimmed text; lists are joined, placeholders become `""`.
pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value_to_text(&value).unwrap_or_default())
}

/// Like [`string`] but keeps the literal text, only trimming it.
pub fn raw_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => value_to_text(&other).unwrap_or_default(),
    })
}

/// Any value as optional text; placeholders become `None`.
pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(value_to_text(&value))
}

/// A list of strings. A lone string becomes one item per line.
pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(value_to_list(Value::deserialize(d)?, false))
}

/// A list of strings. A lone string is split on `,` `;` `|`.
pub fn comma_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(value_to_list(Value::deserialize(d)?, true))
}

/// A number, defaulting to 0.
pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(value_to_number(&Value::deserialize(d)?).unwrap_or(0.0))
}

pub fn opt_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(value_to_number(&Value::deserialize(d)?))
}

pub fn opt_count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
    Ok(value_to_number(&Value::deserialize(d)?)
        .filter(|n| *n >= 0.0)
        .map(|n| n as usize))
}

pub fn opt_year<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match &value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => parse_year(s),
        _ => None,
    })
}

pub fn opt_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match &value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_bool(s),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        _ => None,
    })
}

/// A JSON object; anything else becomes an empty map.
pub fn object<'de, D: Deserializer<'de>>(d: D) -> Result<Map<String, Value>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

/// A list of records. Members that do not fit the record shape are dropped;
/// a lone object is treated as a one-element list.
pub fn records<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        value @ Value::Object(_) => serde_json::from_value(value).ok().into_iter().collect(),
        _ => Vec::new(),
    })
}

/// Any value that deserializes into `T`, or the default.
pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(serde_json::from_value(Value::deserialize(d)?).unwrap_or_default())
}

/// Any value that deserializes into `T`, or `None`.
pub fn opt<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(serde_json::from_value(Value::deserialize(d)?).ok())
}
