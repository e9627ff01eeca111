use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::feed::DEFAULT_FANOUT;

#[derive(Debug, Error)]
pub enum ConfigError {
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
    // Database
    pub database_path: PathBuf,

    // Web Server
    pub web_host: String,
    pub web_port: u16,
    pub request_timeout: Duration,

    // Feed
    pub feed_fanout: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/feed.sqlite"),
            web_host: "0.0.0.0".to_string(),
            web_port: 8080,
            request_timeout: Duration::from_secs(10),
            feed_fanout: DEFAULT_FANOUT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a set variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            // Database
            database_path: optional_env("DATABASE_PATH")
                .map_or(defaults.database_path, PathBuf::from),

            // Web Server
            web_host: env_or_default("WEB_HOST", &defaults.web_host),
            web_port: parse_env_u16("WEB_PORT", defaults.web_port)?,
            request_timeout: Duration::from_secs(parse_env_u64(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),

            // Feed
            feed_fanout: parse_env_usize("FEED_FANOUT", defaults.feed_fanout)?,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed_fanout == 0 {
            return Err(ConfigError::InvalidValue {
                name: "FEED_FANOUT".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "REQUEST_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.web_host.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "WEB_HOST".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    optional_env(name).unwrap_or_else(|| default.to_string())
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

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
