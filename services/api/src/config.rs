//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. Upstream credentials are optional here;
//! each adapter reports its own missing credential when it is first used.

use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// LiveKit server and API credentials.
#[derive(Clone, Debug)]
pub struct LiveKitConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub cors_origin: String,

    // --- Upstream credentials ---
    pub openai_api_key: Option<String>,
    pub livekit: Option<LiveKitConfig>,
    pub bey_api_key: Option<String>,
    pub bey_avatar_id: Option<String>,
    pub bey_api_url: String,
    pub bey_webhook_secret: Option<String>,
    pub weaviate_url: Option<String>,
    pub weaviate_api_key: Option<String>,

    // --- Models ---
    pub agent_model: String,
    pub summary_model: String,
    pub embedding_model: String,

    // --- Tuning ---
    pub clarification_question_count: usize,
    pub chunk_max_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub session_freshness_minutes: i64,
    pub agent_wait_timeout_secs: u64,
    pub session_ready_timeout_secs: u64,
    /// Upper bound on a caller-supplied `timeoutSecs`.
    pub max_wait_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log_level: Level::INFO,
            cors_origin: "http://localhost:3000".to_string(),
            openai_api_key: None,
            livekit: None,
            bey_api_key: None,
            bey_avatar_id: None,
            bey_api_url: "https://api.bey.dev".to_string(),
            bey_webhook_secret: None,
            weaviate_url: None,
            weaviate_api_key: None,
            agent_model: "gpt-4o".to_string(),
            summary_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            clarification_question_count: 1,
            chunk_max_tokens: 200,
            chunk_overlap_tokens: 25,
            session_freshness_minutes: 30,
            agent_wait_timeout_secs: 30,
            session_ready_timeout_secs: 20,
            max_wait_timeout_secs: 120,
        }
    }
}

/// Reads an optional variable, treating an empty value as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    optional_var(name).unwrap_or_else(|| default.to_string())
}

fn parsed_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let defaults = Config::default();

        // --- Server Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- LiveKit: all three or nothing ---
        let livekit = match (
            optional_var("LIVEKIT_URL"),
            optional_var("LIVEKIT_API_KEY"),
            optional_var("LIVEKIT_API_SECRET"),
        ) {
            (Some(url), Some(api_key), Some(api_secret)) => Some(LiveKitConfig {
                url,
                api_key,
                api_secret,
            }),
            _ => None,
        };

        let clarification_question_count = parsed_var(
            "CLARIFICATION_QUESTION_COUNT",
            defaults.clarification_question_count,
        )?;
        if clarification_question_count == 0 {
            return Err(ConfigError::InvalidValue(
                "CLARIFICATION_QUESTION_COUNT".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            log_level,
            cors_origin: var_or("CORS_ORIGIN", &defaults.cors_origin),
            openai_api_key: optional_var("OPENAI_API_KEY"),
            livekit,
            bey_api_key: optional_var("BEY_API_KEY"),
            bey_avatar_id: optional_var("BEY_AVATAR_ID"),
            bey_api_url: var_or("BEY_API_URL", &defaults.bey_api_url),
            bey_webhook_secret: optional_var("BEY_WEBHOOK_SECRET"),
            weaviate_url: optional_var("WEAVIATE_URL"),
            weaviate_api_key: optional_var("WEAVIATE_API_KEY"),
            agent_model: var_or("AGENT_MODEL", &defaults.agent_model),
            summary_model: var_or("SUMMARY_MODEL", &defaults.summary_model),
            embedding_model: var_or("OPENAI_EMBEDDING_MODEL", &defaults.embedding_model),
            clarification_question_count,
            chunk_max_tokens: parsed_var("CHUNK_MAX_TOKENS", defaults.chunk_max_tokens)?,
            chunk_overlap_tokens: parsed_var("CHUNK_OVERLAP_TOKENS", defaults.chunk_overlap_tokens)?,
            session_freshness_minutes: parsed_var(
                "SESSION_FRESHNESS_MINUTES",
                defaults.session_freshness_minutes,
            )?,
            agent_wait_timeout_secs: parsed_var(
                "AGENT_WAIT_TIMEOUT_SECS",
                defaults.agent_wait_timeout_secs,
            )?,
            session_ready_timeout_secs: parsed_var(
                "SESSION_READY_TIMEOUT_SECS",
                defaults.session_ready_timeout_secs,
            )?,
            max_wait_timeout_secs: parsed_var(
                "MAX_WAIT_TIMEOUT_SECS",
                defaults.max_wait_timeout_secs,
            )?,
        })
    }
}
