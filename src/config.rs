//! Almanac configuration.
//!
//! Loaded from `~/.almanac/config.toml`. Every key is optional; a missing
//! file means defaults. `ALMANAC_API_URL` overrides `api-url`.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::Replica;

/// Environment variable overriding `api-url`.
pub const API_URL_ENV: &str = "ALMANAC_API_URL";

/// Almanac configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the remote API, e.g. `https://example.org/api/`.
    pub api_url: Option<String>,

    /// Async worker threads.
    pub worker_threads: usize,

    /// Per-request timeout for remote fetches, in seconds.
    pub fetch_timeout_secs: u64,

    /// Replica database. Defaults to `~/.almanac/replica.sqlite`.
    pub database: Option<PathBuf>,

    /// Completed sync records kept by `syncs prune`.
    pub keep_syncs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            worker_threads: 2,
            fetch_timeout_secs: 10,
            database: None,
            keep_syncs: 100,
        }
    }
}

impl Config {
    /// Load config from `~/.almanac/config.toml`, then apply the environment.
    pub fn load() -> Result<Self, String> {
        let path = Self::path().ok_or("could not determine home directory")?;

        let config = if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
            Self::parse(&contents)
                .map_err(|e| format!("invalid config at {}: {e}", path.display()))?
        } else {
            Self::default()
        };

        Ok(config.with_api_url_override(std::env::var(API_URL_ENV).ok()))
    }

    /// Parses and validates a config file's contents.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(contents).map_err(|e| e.to_string())?;
        if config.worker_threads == 0 {
            return Err("worker-threads must be at least 1".to_string());
        }
        if config.fetch_timeout_secs == 0 {
            return Err("fetch-timeout-secs must be at least 1".to_string());
        }
        Ok(config)
    }

    /// Replaces `api_url` with `value` when it is set and non-empty.
    #[must_use]
    pub fn with_api_url_override(self, value: Option<String>) -> Self {
        match value {
            Some(url) if !url.trim().is_empty() => Self {
                api_url: Some(url),
                ..self
            },
            _ => self,
        }
    }

    /// The API base URL. Only commands that talk to the remote need it.
    pub fn api_url(&self) -> Result<&str, String> {
        self.api_url.as_deref().ok_or_else(|| {
            let path = Self::path().map_or_else(
                || "~/.almanac/config.toml".to_string(),
                |p| p.display().to_string(),
            );
            format!(
                "no API URL configured\n\
                 Set {API_URL_ENV}, or add to {path}:\n\n\
                 api-url = \"https://example.org/api/\""
            )
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// The replica database path: configured, or the default location.
    pub fn database_path(&self) -> Result<PathBuf, String> {
        self.database
            .clone()
            .or_else(Replica::default_path)
            .ok_or_else(|| "could not determine home directory".to_string())
    }

    /// The config file path: `~/.almanac/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".almanac").join("config.toml"))
    }
}
