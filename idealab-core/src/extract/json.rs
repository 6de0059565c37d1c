//! Locating and parsing JSON objects embedded in agent output.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").unwrap());

/// Candidate JSON texts in priority order, without duplicates:
///
/// 1. the body of every fenced code block,
/// 2. the first brace-balanced object mentioning one of `anchors` as a key,
/// 3. the span from the first `{` to the last `}`.
pub fn candidates(raw: &str, anchors: &[&str]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |candidate: &str| {
        let candidate = candidate.trim();
        if candidate.starts_with('{') && !found.iter().any(|c| c == candidate) {
            found.push(candidate.to_string());
        }
    };

    for caps in FENCED.captures_iter(raw) {
        push(&caps[1]);
    }
    if let Some(object) = anchored_object(raw, anchors) {
        push(object);
    }
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}'))
        && start < end
    {
        push(&raw[start..=end]);
    }
    found
}

/// The first balanced `{...}` that contains `"anchor"` for any anchor.
fn anchored_object<'a>(raw: &'a str, anchors: &[&str]) -> Option<&'a str> {
    let needles: Vec<String> = anchors.iter().map(|a| format!("\"{}\"", a)).collect();
    let mut from = 0;
    while let Some(offset) = raw[from..].find('{') {
        let start = from + offset;
        match balanced_end(&raw[start..]) {
            Some(len) => {
                let object = &raw[start..start + len];
                if needles.iter().any(|n| object.contains(n.as_str())) {
                    return Some(object);
                }
                from = start + len;
            }
            None => from = start + 1,
        }
    }
    None
}

/// Byte length of the balanced object starting at `text[0] == '{'`.
///
/// Braces inside string literals are ignored.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse `candidate` as a JSON object, retrying once after [`repair`].
pub fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    let as_object = |text: &str| match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    };
    as_object(candidate).or_else(|| as_object(&repair(candidate)))
}

/// Fix the mistakes models commonly make when writing JSON by hand.
///
/// Outside string literals this strips `//` and `/* */` comments, drops
/// trailing commas before `}` or `]`, and rewrites capitalised literals
/// (`None`, `True`, `False`).
pub fn repair(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push_str(match word.as_str() {
                    "None" => "null",
                    "True" => "true",
                    "False" => "false",
                    other => other,
                });
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    strip_trailing_commas(&out)
}

fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
        } else if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_candidate_order() {
        let raw = "noise {\"other\": 1} then ```json\n{\"competitors\": []}\n``` and {\"competitors\": [1]} tail }";
        let found = candidates(raw, &["competitors"]);
        assert_eq!(found[0], "{\"competitors\": []}");
        assert_eq!(found.len(), 2);
        assert!(found.last().unwrap().starts_with("{\"other\""));
    }

    #[test]
    fn test_anchored_object_skips_unrelated_objects() {
        let raw = r#"First {"note": "a { brace"} then {"competitors": ["x"]}."#;
        assert_eq!(
            anchored_object(raw, &["competitors"]),
            Some(r#"{"competitors": ["x"]}"#)
        );
        assert_eq!(anchored_object("{ unterminated", &["x"]), None);
    }

    #[test]
    fn test_repair_comments_commas_and_literals() {
        let raw = r#"{
            "founded": 2015, // Use null if not found
            "funding": None,
            "url": "https://a.com/x", /* block */
            "list": [1, 2,],
            "flag": True,
        }"#;
        let map = parse_object(raw).unwrap();
        assert_eq!(map["founded"], 2015);
        assert!(map["funding"].is_null());
        assert_eq!(map["url"], "https://a.com/x");
        assert_eq!(map["list"], serde_json::json!([1, 2]));
        assert_eq!(map["flag"], true);
    }

    #[test]
    fn test_repair_leaves_strings_alone() {
        let repaired = repair(r#"{"text": "None, // not a comment,}"}"#);
        assert_eq!(repaired, r#"{"text": "None, // not a comment,}"}"#);
    }

    #[test]
    fn test_non_objects_rejected() {
        assert!(parse_object("[1, 2]").is_none());
        assert!(parse_object(r#"{"competitors": [}"#).is_none());
    }
}
