//! Application configuration loaded from environment variables.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },
}

/// Runtime settings. `from_env` reads the process environment; `.env` files
/// are loaded by the binary before this runs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // LLM
    pub anthropic_api_key: String,
    pub ai_model: String,
    pub ai_max_tokens: u32,
    pub ai_temperature: f32,
    pub generator_max_retries: u32,

    // Store
    pub database_url: String,

    // Server
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,

    // Concurrency
    pub graph_lock_timeout_secs: u64,
}

pub const DEFAULT_AI_MODEL: &str = "claude-sonnet-4-20250514";

fn env_or(var: &'static str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(var: &'static str, default: &str) -> Result<T, ConfigError> {
    let raw = env_or(var, default);
    raw.parse().map_err(|_| ConfigError::InvalidVar {
        var,
        value: raw.clone(),
    })
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ConfigError::MissingVar("ANTHROPIC_API_KEY"))?;

        Ok(Self {
            anthropic_api_key,
            ai_model: env_or("AI_MODEL", DEFAULT_AI_MODEL),
            ai_max_tokens: parse_env("AI_MAX_TOKENS", "2000")?,
            ai_temperature: parse_env("AI_TEMPERATURE", "0.8")?,
            generator_max_retries: parse_env("GENERATOR_MAX_RETRIES", "3")?,
            database_url: env_or("DATABASE_URL", "sqlite:lorekeeper.db?mode=rwc"),
            host: env_or("HOST", "0.0.0.0"),
            port: parse_env("PORT", "8000")?,
            cors_origins: env_or(
                "CORS_ORIGINS",
                "http://localhost:5173,http://localhost:3000",
            )
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect(),
            graph_lock_timeout_secs: parse_env("GRAPH_LOCK_TIMEOUT_SECS", "30")?,
        })
    }

    /// A config suitable for tests: no real API key, caller supplies the
    /// database URL.
    pub fn for_tests(database_url: impl Into<String>) -> Self {
        Self {
            anthropic_api_key: "test-key".to_string(),
            ai_model: DEFAULT_AI_MODEL.to_string(),
            ai_max_tokens: 2000,
            ai_temperature: 0.8,
            generator_max_retries: 3,
            database_url: database_url.into(),
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: Vec::new(),
            graph_lock_timeout_secs: 5,
        }
    }
}
