use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_FILE_PATH: &str = "simulation.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Runtime settings for the simulation controller and its HTTP collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub auth_token: Option<String>,
    /// Route prefix for simulation pages, e.g. `/simulation/{case}/session/{id}`.
    pub simulation_base_path: String,
    pub case_list_path: String,
    pub login_path: String,
    pub stream_timeout_secs: u64,
    /// Limit on each start/end-session call and on opening a stream.
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub phase_delay_ms: u64,
    pub redirect_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/api".to_string(),
            auth_token: None,
            simulation_base_path: "/simulation".to_string(),
            case_list_path: "/cases".to_string(),
            login_path: "/login".to_string(),
            stream_timeout_secs: 60,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            phase_delay_ms: 250,
            redirect_delay_secs: 3,
        }
    }
}

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {} = {:?}: not a valid value", name, raw);
            None
        }
    }
}

impl Config {
    /// Load `simulation.toml` from the working directory when present, then
    /// apply environment overrides. A broken file falls back to defaults.
    pub fn new() -> Self {
        let mut config = if Path::new(CONFIG_FILE_PATH).exists() {
            match Self::from_file(CONFIG_FILE_PATH) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Failed to load {}: {}", CONFIG_FILE_PATH, e);
                    Config::default()
                }
            }
        } else {
            Config::default()
        };

        config.apply_env();
        config
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<Config>(content)?)
    }

    /// Override fields from `SIM_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(api_base) = std::env::var("SIM_API_BASE") {
            self.api_base = api_base;
        }
        if let Ok(token) = std::env::var("SIM_AUTH_TOKEN") {
            if !token.trim().is_empty() {
                self.auth_token = Some(token);
            }
        }
        if let Some(secs) = parse_env("SIM_STREAM_TIMEOUT_SECS") {
            self.stream_timeout_secs = secs;
        }
        if let Some(secs) = parse_env("SIM_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs;
        }
        if let Some(retries) = parse_env("SIM_MAX_RETRIES") {
            self.max_retries = retries;
        }
        if let Some(delay) = parse_env("SIM_PHASE_DELAY_MS") {
            self.phase_delay_ms = delay;
        }
        if let Some(delay) = parse_env("SIM_REDIRECT_DELAY_SECS") {
            self.redirect_delay_secs = delay;
        }
        if let Ok(fast) = std::env::var("SIM_FAST_STARTUP") {
            if parse_bool_env(&fast) {
                self.phase_delay_ms = 0;
            }
        }
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn phase_delay(&self) -> Duration {
        Duration::from_millis(self.phase_delay_ms)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_secs(self.redirect_delay_secs)
    }

    /// Exponential backoff for the `attempt`-th retry (1-based), capped at
    /// `retry_max_delay_ms`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .retry_base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        Duration::from_millis(delay.min(self.retry_max_delay_ms))
    }
}
