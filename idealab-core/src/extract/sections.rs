//! Headed plain-text parsing.
//!
//! Agents that fail to produce JSON fall back to a layout of named sections
//! (`MARKET GAPS:`, `**Evidence:**`, `## Sources`). The splitter recognises
//! each domain's headers in any of those spellings and hands back the text
//! between consecutive headers.

use crate::lenient;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d{1,2}[.)]|[-*•+])\s+").unwrap());

static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\*\*|__)?([A-Za-z][A-Za-z0-9 /&()'_-]{0,40}?)(?:\*\*|__)?\s*:\s*(?:\*\*|__)?\s*(.*)$")
        .unwrap()
});

static CONFIDENCE_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)confidence[ \t_]*score[\s*_:\-]*(\d+(?:\.\d+)?)[ \t]*(%|/[ \t]*100\b)?").unwrap()
});

/// Header spellings for the sections of one domain.
pub struct SectionSplitter {
    headers: Vec<(&'static str, Regex)>,
}

/// Bodies of the sections found in a text.
#[derive(Debug, Default)]
pub struct Sections {
    bodies: HashMap<&'static str, String>,
    preamble: String,
}

impl SectionSplitter {
    /// Build a splitter from `(key, aliases)` pairs.
    ///
    /// Aliases are matched case-insensitively; spaces in an alias also match
    /// underscores and runs of whitespace.
    pub fn new(headers: &[(&'static str, &[&str])]) -> Self {
        let headers = headers
            .iter()
            .map(|(key, aliases)| (*key, header_regex(aliases)))
            .collect();
        Self { headers }
    }

    pub fn split(&self, text: &str) -> Sections {
        let mut marks: Vec<(usize, usize, &'static str)> = Vec::new();
        for (key, re) in &self.headers {
            for m in re.find_iter(text) {
                marks.push((m.start(), m.end(), *key));
            }
        }
        marks.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut kept: Vec<(usize, usize, &'static str)> = Vec::new();
        for mark in marks {
            if kept.last().is_none_or(|last| mark.0 >= last.1) {
                kept.push(mark);
            }
        }

        let mut sections = Sections {
            preamble: kept
                .first()
                .map_or(text, |first| &text[..first.0])
                .trim()
                .to_string(),
            ..Sections::default()
        };
        for (i, (_, end, key)) in kept.iter().enumerate() {
            let stop = kept.get(i + 1).map_or(text.len(), |next| next.0);
            let body = text[*end..stop].trim();
            let entry = sections.bodies.entry(*key).or_default();
            if !entry.is_empty() && !body.is_empty() {
                entry.push('\n');
            }
            entry.push_str(body);
        }
        sections
    }
}

fn header_regex(aliases: &[&str]) -> Regex {
    let names = aliases
        .iter()
        .map(|alias| {
            alias
                .split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"[ \t_]+")
        })
        .collect::<Vec<_>>()
        .join("|");
    let bold = r"(?:\*\*|__)";
    let pattern = format!(
        r"(?im)^[ \t]*(?:#{{1,6}}[ \t]*)?{bold}?[ \t]*(?:{names})[ \t]*{bold}?[ \t]*:[ \t]*{bold}?[ \t]*|^[ \t]*(?:#{{1,6}}[ \t]*{bold}?|{bold})[ \t]*(?:{names})[ \t]*:?[ \t]*{bold}?[ \t]*\r?$"
    );
    Regex::new(&pattern).expect("header aliases are escaped")
}

impl Sections {
    /// Body of section `key`, if the header appeared and the body is not empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.bodies
            .get(key)
            .map(String::as_str)
            .filter(|body| !body.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Text before the first recognised header.
    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// List items of section `key`.
    pub fn items(&self, key: &str) -> Vec<String> {
        self.get(key).map(list_items).unwrap_or_default()
    }
}

/// Split a section body into list items.
///
/// Numbered (`1.`), dashed, starred and bulleted lines each start an item;
/// unmarked lines that follow an item continue it. A body with no markers
/// yields one item per non-empty line. Placeholder items (`N/A`) are dropped.
pub fn list_items(body: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    let mut marked = false;
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(m) = LIST_MARKER.find(trimmed) {
            marked = true;
            items.push(trimmed[m.end()..].to_string());
        } else if marked && let Some(last) = items.last_mut() {
            last.push(' ');
            last.push_str(trimmed);
        } else {
            items.push(trimmed.to_string());
        }
    }
    items
        .iter()
        .filter_map(|item| lenient::clean_text(&strip_markup(item)))
        .collect()
}

/// Remove a leading list marker.
pub fn strip_bullet(line: &str) -> &str {
    let trimmed = line.trim();
    LIST_MARKER
        .find(trimmed)
        .map_or(trimmed, |m| &trimmed[m.end()..])
}

/// Remove bold, italic-underscore and code markup.
pub fn strip_markup(text: &str) -> String {
    text.replace("**", "").replace("__", "").replace('`', "").trim().to_string()
}

/// Split `Label: value` into a lowercased label and its value.
///
/// Leading list markers and bold markup around the label are ignored. URLs
/// are not mistaken for labels.
pub fn split_label(line: &str) -> Option<(String, String)> {
    let caps = LABEL.captures(strip_bullet(line))?;
    let value = caps[2].trim();
    if value.starts_with("//") {
        return None;
    }
    let label = caps[1].trim().trim_end_matches(['*', '_']).trim().to_lowercase();
    Some((label, strip_markup(value)))
}

/// Value of the first `Label: value` line in `body` whose label is one of
/// `labels`. Placeholder values count as absent.
pub fn field_value(body: &str, labels: &[&str]) -> Option<String> {
    body.lines()
        .filter_map(split_label)
        .find(|(label, _)| labels.contains(&label.as_str()))
        .and_then(|(_, value)| lenient::clean_text(&value))
}

/// An explicit `Confidence Score: N` in the text, if any.
///
/// Percentages and scores out of 100 are rescaled to 0-10.
pub fn reported_confidence(text: &str) -> Option<f64> {
    let caps = CONFIDENCE_SCORE.captures(text)?;
    let score = lenient::parse_number(&caps[1])?;
    Some(if caps.get(2).is_some() || score > 10.0 {
        score / 10.0
    } else {
        score
    })
}
