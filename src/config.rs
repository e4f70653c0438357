use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::constants::{DEFAULT_REDDIT_USER_AGENT, REDDIT_WEB_BASE};
use crate::queue::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Queue
    pub queue_database_path: Option<PathBuf>,
    pub queue_max_per_window: u32,
    pub queue_window: Duration,
    pub queue_poll_interval: Duration,
    pub job_max_attempts: u32,
    pub job_backoff_base: Duration,

    // Write API
    pub api_base_url: String,
    pub api_token: String,

    // Reddit
    pub reddit_base_url: String,
    pub reddit_user_agent: String,

    // Outbound HTTP
    pub http_timeout: Duration,

    // Known-post cache
    pub known_posts_refresh: Duration,

    // Intake server
    pub web_host: String,
    pub web_port: u16,
    pub intake_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Queue
            queue_database_path: optional_env("QUEUE_DATABASE_PATH").map(PathBuf::from),
            queue_max_per_window: parse_env_u32("QUEUE_MAX_PER_WINDOW", 1)?,
            queue_window: Duration::from_millis(parse_env_u64("QUEUE_WINDOW_MS", 2000)?),
            queue_poll_interval: Duration::from_millis(parse_env_u64(
                "QUEUE_POLL_INTERVAL_MS",
                1000,
            )?),
            job_max_attempts: parse_env_u32("JOB_MAX_ATTEMPTS", 3)?,
            job_backoff_base: Duration::from_secs(parse_env_u64("JOB_BACKOFF_BASE_SECS", 5)?),

            // Write API
            api_base_url: env_or_default("API_BASE_URL", "https://api.developertracker.com"),
            api_token: required_env("API_TOKEN")?,

            // Reddit
            reddit_base_url: env_or_default("REDDIT_BASE_URL", REDDIT_WEB_BASE),
            reddit_user_agent: env_or_default("REDDIT_USER_AGENT", DEFAULT_REDDIT_USER_AGENT),

            // Outbound HTTP
            http_timeout: Duration::from_secs(parse_env_u64("HTTP_TIMEOUT_SECS", 20)?),

            // Known-post cache
            known_posts_refresh: Duration::from_secs(parse_env_u64(
                "KNOWN_POSTS_REFRESH_SECS",
                600,
            )?),

            // Intake server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 8080)?,
            intake_token: optional_env("INTAKE_TOKEN"),
        })
    }

    /// Configuration with local defaults, used by tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            queue_database_path: None,
            queue_max_per_window: 1,
            queue_window: Duration::from_millis(50),
            queue_poll_interval: Duration::from_millis(20),
            job_max_attempts: 3,
            job_backoff_base: Duration::from_secs(5),
            api_base_url: "http://127.0.0.1:9".to_string(),
            api_token: "test-token".to_string(),
            reddit_base_url: "http://127.0.0.1:9".to_string(),
            reddit_user_agent: DEFAULT_REDDIT_USER_AGENT.to_string(),
            http_timeout: Duration::from_secs(5),
            known_posts_refresh: Duration::from_secs(600),
            web_host: "127.0.0.1".to_string(),
            web_port: 0,
            intake_token: Some("intake-token".to_string()),
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.job_max_attempts,
            backoff_base: self.job_backoff_base,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_max_per_window == 0 {
            return Err(ConfigError::InvalidValue {
                name: "QUEUE_MAX_PER_WINDOW".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.queue_window.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "QUEUE_WINDOW_MS".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.job_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "JOB_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.api_token.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "API_TOKEN".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.reddit_user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "REDDIT_USER_AGENT".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        validate_base_url("API_BASE_URL", &self.api_base_url)?;
        validate_base_url("REDDIT_BASE_URL", &self.reddit_base_url)?;
        Ok(())
    }
}

fn validate_base_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("must be an http(s) URL, got '{value}'"),
        });
    }
    Ok(())
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
