//! Configuration system for the research engine.
//!
//! Uses `figment` for layered configuration: defaults, then user-level,
//! workspace-level, environment variables and explicit overrides.

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Seven days, the default lifetime of a cached research result.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 604_800;

/// Top-level configuration for the research engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResearchConfig {
    /// Backend tried first for every agent run.
    pub primary: LlmConfig,
    /// Backend used once the primary exhausts its retries.
    pub fallback: LlmConfig,
    /// Cheaper backend used to propose search queries.
    pub query_model: LlmConfig,
    pub retry: RetryConfig,
    pub agent: AgentConfig,
    pub cache: CacheConfig,
    pub thresholds: ConfidenceThresholds,
    pub server: ServerConfig,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            primary: LlmConfig::default(),
            fallback: LlmConfig {
                provider: "anthropic".to_string(),
                model: "claude-3-5-sonnet-20240620".to_string(),
                api_key_env: "ANTHROPIC_API_KEY".to_string(),
                temperature: 0.3,
                ..LlmConfig::default()
            },
            query_model: LlmConfig {
                model: "gpt-4o-mini".to_string(),
                temperature: 0.7,
                max_tokens: 1000,
                ..LlmConfig::default()
            },
            retry: RetryConfig::default(),
            agent: AgentConfig::default(),
            cache: CacheConfig::default(),
            thresholds: ConfidenceThresholds::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Configuration for a single model backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai" or "anthropic".
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o", "claude-3-5-sonnet-20240620").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-request HTTP timeout.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            max_tokens: 4000,
            temperature: 0.1,
            timeout_secs: 120,
        }
    }
}

/// Retry policy applied to each backend in turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per backend before moving on.
    pub max_attempts: u32,
    /// Delay before the second attempt; grows by `backoff_multiplier`.
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Upper bound of the uniform random delay added to every backoff.
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_ms: 1_000,
        }
    }
}

impl RetryConfig {
    /// A policy with no delays, for tests and local runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 1.0,
            jitter_ms: 0,
        }
    }
}

/// Settings handed to the browser research agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Upper bound on agent actions per research run.
    pub max_steps: usize,
    /// Per-step timeout forwarded to the remote agent.
    pub step_timeout_secs: u64,
    pub use_vision: bool,
    pub headless: bool,
    /// Browser agent service. When unset the model answers directly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 30,
            step_timeout_secs: 30,
            use_vision: true,
            headless: true,
            endpoint: None,
        }
    }
}

/// On-disk result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cache directory. Defaults to the platform cache dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Entries older than this are treated as absent.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl CacheConfig {
    /// Resolve the cache directory, falling back to the platform cache dir
    /// and then to `.idealab/cache` in the working directory.
    pub fn resolve_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("dev", "idealab", "idealab")
            .map(|d| d.cache_dir().join("research"))
            .unwrap_or_else(|| PathBuf::from(".idealab").join("cache"))
    }
}

/// Minimum confidence a result needs to be cached, and to be served from cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfidenceThresholds {
    pub market_sizing: f64,
    pub competition: f64,
    pub problem_validation: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            market_sizing: 5.0,
            competition: 5.0,
            problem_validation: 4.0,
        }
    }
}

/// HTTP surface bind address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Load configuration by merging all layers.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `IDEALAB_`)
/// 3. Workspace-local config (`.idealab/config.toml`)
/// 4. User config (`~/.config/idealab/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ResearchConfig>,
) -> Result<ResearchConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ResearchConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "idealab", "idealab") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".idealab").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // IDEALAB_PRIMARY__MODEL, IDEALAB_AGENT__MAX_STEPS, ...
    figment = figment.merge(Env::prefixed("IDEALAB_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
