//! Search-query generation with a cheaper model.
//!
//! The query model is asked for a JSON list, but replies are read leniently:
//! a bracketed list of quoted strings anywhere in the text wins, otherwise
//! each line is a candidate. Too few usable queries means the domain's
//! static list is used instead.

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::domains::ResearchDomain;
use crate::types::{CompletionRequest, Message, ResearchRequest};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Fewer parsed queries than this and the fallback list is used.
pub const MIN_QUERIES: usize = 4;
/// At most this many queries are handed to the agent.
pub const MAX_QUERIES: usize = 8;

static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?s)\[\s*["'].*?["']\s*\]"#).unwrap());

static QUOTED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"\n]+)"|'([^'\n]+)'"#).unwrap());

static LINE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\d.\-*•)\s]*").unwrap());

/// Proposes search queries for a research run.
pub struct SearchQueryGenerator {
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl SearchQueryGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Queries for `request`. Never fails: model errors and unusable replies
    /// yield the domain's fallback list.
    pub async fn generate<D: ResearchDomain>(&self, request: &ResearchRequest) -> Vec<String> {
        let completion = CompletionRequest {
            messages: vec![Message::user(D::query_prompt(request))],
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
        };
        let queries = match self.provider.complete(completion).await {
            Ok(response) => parse_queries(&response.text),
            Err(e) => {
                warn!(domain = D::NAME, error = %e, "Query generation failed, using fallback queries");
                Vec::new()
            }
        };
        if queries.len() < MIN_QUERIES {
            debug!(domain = D::NAME, parsed = queries.len(), "Too few generated queries");
            return D::fallback_queries(request).into_iter().take(MAX_QUERIES).collect();
        }
        queries
    }
}

/// Read a list of queries from a model reply, capped at [`MAX_QUERIES`].
pub fn parse_queries(text: &str) -> Vec<String> {
    let mut queries = bracketed_list(text).unwrap_or_else(|| line_list(text));
    let mut seen = std::collections::HashSet::new();
    queries.retain(|q| seen.insert(q.to_lowercase()));
    queries.truncate(MAX_QUERIES);
    queries
}

fn bracketed_list(text: &str) -> Option<Vec<String>> {
    let list = BRACKETED.find(text)?;
    if let Ok(items) = serde_json::from_str::<Vec<String>>(list.as_str()) {
        return Some(items.into_iter().filter_map(|q| usable(&q)).collect());
    }
    let items: Vec<String> = QUOTED
        .captures_iter(list.as_str())
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .filter_map(|m| usable(m.as_str()))
        .collect();
    (!items.is_empty()).then_some(items)
}

fn line_list(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| LINE_PREFIX.replace(line.trim(), ""))
        .filter_map(|line| usable(&line))
        .collect()
}

/// A query stripped of quotes and trailing commas, kept if it has two or more words.
fn usable(query: &str) -> Option<String> {
    let query = query
        .trim()
        .trim_end_matches(',')
        .trim_matches(['"', '\'', '`'])
        .trim();
    (query.split_whitespace().count() >= 2).then(|| query.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::domains::Competition;
    use crate::error::LlmError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bracketed_list_wins_over_lines() {
        let text = "Here you go:\n[\"dog walker app\", \"pet sitting reviews\", 'walker no-show complaints']\nThanks";
        assert_eq!(
            parse_queries(text),
            vec!["dog walker app", "pet sitting reviews", "walker no-show complaints"]
        );
    }

    #[test]
    fn test_line_list_strips_numbering_and_single_words() {
        let text = "1. AI business idea validation\n2) \"startup idea validation software\"\n- tools\n* entrepreneur market testing tools";
        assert_eq!(
            parse_queries(text),
            vec![
                "AI business idea validation",
                "startup idea validation software",
                "entrepreneur market testing tools",
            ]
        );
    }

    #[test]
    fn test_caps_at_eight() {
        let text: String = (0..12).map(|i| format!("query number {i}\n")).collect();
        assert_eq!(parse_queries(&text).len(), MAX_QUERIES);
    }

    #[tokio::test]
    async fn test_short_reply_uses_fallback() {
        let provider = Arc::new(MockLlmProvider::with_response("[\"only one query\"]"));
        let generator = SearchQueryGenerator::new(provider, &LlmConfig::default());
        let request = ResearchRequest::new("Gym booking", "Fitness", "App");
        let queries = generator.generate::<Competition>(&request).await;
        assert_eq!(queries, Competition::fallback_queries(&request));
    }

    #[tokio::test]
    async fn test_model_error_uses_fallback() {
        let provider = MockLlmProvider::new();
        provider.queue_error(LlmError::Timeout { timeout_secs: 1 });
        let generator = SearchQueryGenerator::new(Arc::new(provider), &LlmConfig::default());
        let request = ResearchRequest::new("Gym booking", "Fitness", "App");
        let queries = generator.generate::<Competition>(&request).await;
        assert!(!queries.is_empty());
        assert!(queries.len() <= MAX_QUERIES);
    }

    #[tokio::test]
    async fn test_generated_queries_used_when_enough() {
        let provider = Arc::new(MockLlmProvider::with_response(
            "gym class booking app\nfitness studio scheduling software\nbook gym classes online\ngym waitlist tool",
        ));
        let generator = SearchQueryGenerator::new(provider, &LlmConfig::default());
        let request = ResearchRequest::new("Gym booking", "Fitness", "App");
        let queries = generator.generate::<Competition>(&request).await;
        assert_eq!(queries.len(), 4);
        assert_eq!(queries[0], "gym class booking app");
    }
}
