// [[PAWS]]/apps/inference-server/src/config.rs
// Purpose: Environment-driven server configuration, read once at boot.
// Architecture: Application Boot

use std::env;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MODEL_SERVICE_URL: &str = "http://127.0.0.1:8001";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub api_token: String,
    pub enable_prometheus: bool,
    pub redis_url: Option<String>,
    pub model_service_url: String,
    pub discord_webhook_url: Option<String>,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match non_empty("API_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "API_PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let max_upload_bytes = match non_empty("MAX_UPLOAD_BYTES") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "MAX_UPLOAD_BYTES",
                value: raw,
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let api_token = non_empty("API_TOKEN").ok_or(ConfigError::Missing("API_TOKEN"))?;

        let enable_prometheus = non_empty("ENABLE_PROMETHEUS")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(ServerConfig {
            port,
            api_token,
            enable_prometheus,
            redis_url: non_empty("REDIS_URL"),
            model_service_url: non_empty("MODEL_SERVICE_URL")
                .unwrap_or_else(|| DEFAULT_MODEL_SERVICE_URL.to_string()),
            discord_webhook_url: non_empty("DISCORD_WEBHOOK_URL"),
            max_upload_bytes,
        })
    }
}
