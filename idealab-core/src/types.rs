//! Core type definitions shared across the research engine.
//!
//! Defines the inbound research request and the chat message structures
//! exchanged with model backends.

use serde::{Deserialize, Serialize};

/// A research request for a single business idea.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    #[serde(default, alias = "description")]
    pub business_idea: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_statement: Option<String>,
}

impl ResearchRequest {
    pub fn new(
        business_idea: impl Into<String>,
        industry: impl Into<String>,
        product_type: impl Into<String>,
    ) -> Self {
        Self {
            business_idea: business_idea.into(),
            industry: industry.into(),
            product_type: product_type.into(),
            problem_statement: None,
        }
    }

    pub fn with_problem(mut self, problem_statement: impl Into<String>) -> Self {
        self.problem_statement = Some(problem_statement.into());
        self
    }

    /// The problem statement, or an empty string when none was given.
    pub fn problem(&self) -> &str {
        self.problem_statement.as_deref().unwrap_or("")
    }

    /// Look up a request field by name. Unknown names yield an empty string.
    pub fn field(&self, name: &str) -> &str {
        match name {
            "business_idea" => &self.business_idea,
            "industry" => &self.industry,
            "product_type" => &self.product_type,
            "problem_statement" => self.problem(),
            _ => "",
        }
    }

    /// Names from `required` whose values are empty or whitespace.
    pub fn missing_fields(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.field(name).trim().is_empty())
            .map(|name| name.to_string())
            .collect()
    }
}

/// Represents a participant role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Token usage reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// A completion request sent to a model backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl CompletionRequest {
    /// Single user turn with backend defaults for sampling.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(text)],
            temperature: None,
            max_tokens: None,
        }
    }
}

/// A completion returned by a model backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: Option<String>,
}
