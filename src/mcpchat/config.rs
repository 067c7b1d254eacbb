//! Configuration for the chat server.
//!
//! Provides [`ChatServerConfig`], read from environment variables by
//! [`ChatServerConfig::from_env`] or built by hand. No config-file parsing dependencies
//! are involved.
//!
//! | Variable | Default |
//! |---|---|
//! | `PORT` | `3001` |
//! | `HOST` | `0.0.0.0` |
//! | `MCP_SERVER_URL` | `https://blockza.fastmcp.app/mcp` |
//! | `ANTHROPIC_API_KEY` | *(none)* |
//! | `ANTHROPIC_MODEL` | `claude-3-5-sonnet-20241022` |
//! | `ANTHROPIC_MAX_TOKENS` | `4096` |
//! | `CORS_ALLOWED_ORIGINS` | `http://localhost:5173` (comma separated, `*` for any) |
//! | `MAX_SESSIONS` | `1024` |
//!
//! # Example
//!
//! ```rust
//! use mcpchat::ChatServerConfig;
//!
//! let config = ChatServerConfig::from_lookup(|key| match key {
//!     "PORT" => Some("8080".to_string()),
//!     _ => None,
//! })
//! .unwrap();
//! assert_eq!(config.bind_address(), "0.0.0.0:8080");
//! ```

use crate::clients::claude::{model_to_string, Model, DEFAULT_MAX_TOKENS};
use crate::session_store::DEFAULT_MAX_SESSIONS;
use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// Default MCP endpoint the server connects to.
pub const DEFAULT_MCP_SERVER_URL: &str = "https://blockza.fastmcp.app/mcp";
/// Default browser origin allowed by CORS (the Vite dev server).
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

/// Error types for configuration loading
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    /// A required variable is not set.
    MissingValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { key, value, reason } => {
                write!(f, "Invalid value {:?} for {}: {}", value, key, reason)
            }
            ConfigError::MissingValue(key) => write!(f, "{} is not set", key),
        }
    }
}

impl Error for ConfigError {}

/// Settings for the chat server process.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatServerConfig {
    pub host: String,
    pub port: u16,
    /// MCP Streamable HTTP endpoint of the tool server.
    pub mcp_server_url: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub anthropic_max_tokens: u32,
    /// Browser origins allowed by CORS. `"*"` allows any origin.
    pub cors_allowed_origins: Vec<String>,
    /// Upper bound on live sessions kept in memory.
    pub max_sessions: usize,
}

impl Default for ChatServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            mcp_server_url: DEFAULT_MCP_SERVER_URL.to_string(),
            anthropic_api_key: None,
            anthropic_model: model_to_string(Model::ClaudeSonnet35),
            anthropic_max_tokens: DEFAULT_MAX_TOKENS,
            cors_allowed_origins: vec![DEFAULT_CORS_ORIGIN.to_string()],
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl ChatServerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or(get("PORT"), "PORT", defaults.port)?,
            mcp_server_url: get("MCP_SERVER_URL").unwrap_or(defaults.mcp_server_url),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            anthropic_model: get("ANTHROPIC_MODEL").unwrap_or(defaults.anthropic_model),
            anthropic_max_tokens: parse_or(
                get("ANTHROPIC_MAX_TOKENS"),
                "ANTHROPIC_MAX_TOKENS",
                defaults.anthropic_max_tokens,
            )?,
            cors_allowed_origins: match get("CORS_ALLOWED_ORIGINS") {
                Some(raw) => raw
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect(),
                None => defaults.cors_allowed_origins,
            },
            max_sessions: parse_or(get("MAX_SESSIONS"), "MAX_SESSIONS", defaults.max_sessions)?,
        })
    }

    /// `host:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The Anthropic key, or [`ConfigError::MissingValue`] when unset.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.anthropic_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingValue("ANTHROPIC_API_KEY".to_string()))
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_allowed_origins.iter().any(|origin| origin == "*")
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
            value,
        }),
    }
}
