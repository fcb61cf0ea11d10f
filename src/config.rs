//! Runtime configuration
//!
//! Read once at startup from the environment (after `.env` is loaded by the
//! binary). Every value has a default so a bare run works against the public
//! placeholder endpoint.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SERVER_URL: &str = "https://jsonplaceholder.typicode.com/posts";
pub const DEFAULT_API_TOKEN: &str = "mock-token";
pub const DEFAULT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_SERVER_URL: &str = "QUOTE_SYNC_SERVER_URL";
pub const ENV_API_TOKEN: &str = "QUOTE_SYNC_API_TOKEN";
pub const ENV_DB_PATH: &str = "QUOTE_SYNC_DB_PATH";
pub const ENV_INTERVAL_SECS: &str = "QUOTE_SYNC_INTERVAL_SECS";
pub const ENV_TIMEOUT_SECS: &str = "QUOTE_SYNC_TIMEOUT_SECS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("Failed to get app directories - cannot determine data location")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub server_url: String,
    /// Empty token disables the Authorization header
    pub api_token: Option<String>,
    pub db_path: PathBuf,
    pub sync_interval_secs: u64,
    pub request_timeout: Duration,
}

impl AppConfig {
    /// Build the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

        let server_url = get(ENV_SERVER_URL)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        validate_url(&server_url)?;

        let api_token = match get(ENV_API_TOKEN) {
            Some(token) if token.is_empty() => None,
            Some(token) => Some(token),
            None => Some(DEFAULT_API_TOKEN.to_string()),
        };

        let db_path = match get(ENV_DB_PATH).filter(|v| !v.is_empty()) {
            Some(path) => PathBuf::from(path),
            None => default_db_path()?,
        };

        let sync_interval_secs = parse_secs(ENV_INTERVAL_SECS, get(ENV_INTERVAL_SECS), DEFAULT_INTERVAL_SECS)?;
        let timeout_secs = parse_secs(ENV_TIMEOUT_SECS, get(ENV_TIMEOUT_SECS), DEFAULT_TIMEOUT_SECS)?;

        Ok(Self {
            server_url,
            api_token,
            db_path,
            sync_interval_secs,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn validate_url(value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        key: ENV_SERVER_URL,
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidValue {
            key: ENV_SERVER_URL,
            reason: format!("unsupported scheme {}", other),
        }),
    }
}

fn parse_secs(key: &'static str, raw: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match raw.filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => match value.parse::<u64>() {
            Ok(0) => Err(ConfigError::InvalidValue {
                key,
                reason: "must be greater than zero".to_string(),
            }),
            Ok(secs) => Ok(secs),
            Err(e) => Err(ConfigError::InvalidValue {
                key,
                reason: format!("{}: {}", value, e),
            }),
        },
    }
}

/// `<data dir>/quotes.db`, the data directory is created if missing
fn default_db_path() -> Result<PathBuf, ConfigError> {
    let app_dir = directories::ProjectDirs::from("com", "quote-sync", "quote-sync")
        .ok_or(ConfigError::NoDataDir)?;

    let data_dir = app_dir.data_dir();
    std::fs::create_dir_all(data_dir).map_err(|e| ConfigError::InvalidValue {
        key: ENV_DB_PATH,
        reason: format!("Failed to create data directory at {:?}: {}", data_dir, e),
    })?;

    Ok(data_dir.join("quotes.db"))
}
