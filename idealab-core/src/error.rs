//! Error types for the IdeaLab research core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering model backends, the research agent, the result cache and
//! configuration. Service facades never return these to callers; they are
//! folded into error envelopes at the service boundary.

/// Top-level error type for the research core.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Missing required fields: {}", fields.join(", "))]
    InvalidInput { fields: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from model backend interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("All model attempts failed:\n{}", attempts.join("\n"))]
    Exhausted { attempts: Vec<String> },
}

/// Errors from the research agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent completed but returned no final result")]
    NoFinalResult,

    #[error("Agent run failed: {message}")]
    Failed { message: String },

    #[error("Agent transport error: {message}")]
    Transport { message: String },
}

/// Errors from the on-disk result cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache entry could not be serialized: {message}")]
    Serialization { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl From<Box<figment::Error>> for ConfigError {
    fn from(err: Box<figment::Error>) -> Self {
        ConfigError::ParseError {
            message: err.to_string(),
        }
    }
}

/// A type alias for results using the top-level `ResearchError`.
pub type Result<T> = std::result::Result<T, ResearchError>;
