//! services/elibrary/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Backend origin, without the `/api` suffix.
    pub api_url: String,
    pub data_dir: PathBuf,
    pub log_level: Level,
    pub demo_seed: bool,
    pub demo_auth: bool,
    /// `None` disables the background reconciler.
    pub sync_interval: Option<Duration>,
    pub sync_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000".to_string(),
            data_dir: PathBuf::from("./.elibrary"),
            log_level: Level::INFO,
            demo_seed: true,
            demo_auth: false,
            sync_interval: Some(Duration::from_secs(30)),
            sync_max_attempts: 5,
        }
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
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // --- Backend and Storage ---
        let api_url = lookup("API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "API_URL".to_string(),
                "URL must start with http:// or https://".to_string(),
            ));
        }

        let data_dir = lookup("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Demo Behaviour ---
        let demo_seed = parse_bool(&lookup, "DEMO_SEED", defaults.demo_seed)?;
        let demo_auth = parse_bool(&lookup, "DEMO_AUTH", defaults.demo_auth)?;

        // --- Reconciliation ---
        let sync_interval = match lookup("SYNC_INTERVAL_SECS") {
            None => defaults.sync_interval,
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|e| {
                    ConfigError::InvalidValue("SYNC_INTERVAL_SECS".to_string(), e.to_string())
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
        };

        let sync_max_attempts = match lookup("SYNC_MAX_ATTEMPTS") {
            None => defaults.sync_max_attempts,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(0) => {
                    return Err(ConfigError::InvalidValue(
                        "SYNC_MAX_ATTEMPTS".to_string(),
                        "must be at least 1".to_string(),
                    ))
                }
                Ok(n) => n,
                Err(e) => {
                    return Err(ConfigError::InvalidValue(
                        "SYNC_MAX_ATTEMPTS".to_string(),
                        e.to_string(),
                    ))
                }
            },
        };

        Ok(Self {
            api_url,
            data_dir,
            log_level,
            demo_seed,
            demo_auth,
            sync_interval,
            sync_max_attempts,
        })
    }

    /// Base URL every REST path is joined onto.
    pub fn api_base(&self) -> String {
        format!("{}/api", self.api_url)
    }
}

fn parse_bool<F>(lookup: &F, name: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("'{}' is not a boolean", other),
            )),
        },
    }
}
