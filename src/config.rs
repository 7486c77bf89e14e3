//! Runtime configuration
//!
//! Everything is read from environment variables so the binary can run
//! without a config file.

use std::time::Duration;
use thiserror::Error;

const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a number, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

/// Configuration for the studio and its collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioConfig {
    /// Base URL of the generation backend (streaming + REST surface)
    pub backend_url: String,
    /// Port for the local HTTP API
    pub port: u16,
    /// Connect timeout for backend requests
    pub connect_timeout: Duration,
    /// A stream that stays silent this long is treated as a connection
    /// error. `None` keeps the stream open until it ends or is cancelled.
    pub stream_idle_timeout: Option<Duration>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stream_idle_timeout: None,
        }
    }
}

impl StudioConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (tests pass a map)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backend_url = lookup("STUDIO_BACKEND_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.backend_url);

        let port = match lookup("STUDIO_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidNumber {
                    var: "STUDIO_PORT",
                    value: raw.clone(),
                })?,
            None => defaults.port,
        };

        let connect_timeout = parse_secs(&lookup, "STUDIO_CONNECT_TIMEOUT_SECS")?
            .unwrap_or(defaults.connect_timeout);
        let stream_idle_timeout = parse_secs(&lookup, "STUDIO_STREAM_IDLE_TIMEOUT_SECS")?;

        Ok(Self {
            backend_url,
            port,
            connect_timeout,
            stream_idle_timeout,
        })
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: raw.clone(),
    })?;
    if secs == 0 {
        return Err(ConfigError::Zero { var });
    }
    Ok(Some(Duration::from_secs(secs)))
}
