//! Environment-sourced configuration: provider credentials/endpoints, log
//! level, and the data root for history snapshots.
//!
//! Grounded on the reference scheduler's settings module, which reads one
//! environment variable per provider. This crate keeps the same
//! `<PROVIDER>_API_KEY` / `<PROVIDER>_BASE_URL` convention but resolves it
//! generically instead of hard-coding a fixed provider list, so the core
//! does not need to be recompiled to add a provider.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use log::LevelFilter;

use crate::cloudllm::error::ConfigError;

/// Resolved credentials/endpoint for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Resolve `get_api_config(provider) -> {api_key, base_url?, timeout}` from
/// the process environment.
///
/// Reads `<PROVIDER>_API_KEY` (required) and `<PROVIDER>_BASE_URL`
/// (optional), with `<PROVIDER>` uppercased. Falls back to `DEFAULT_TIMEOUT`
/// (seconds) when no provider-specific override exists.
pub fn get_api_config(provider: &str) -> Result<ApiConfig, ConfigError> {
    if provider.trim().is_empty() {
        return Err(ConfigError::UnknownProvider(provider.to_string()));
    }
    let prefix = provider.to_uppercase();

    let api_key = env::var(format!("{}_API_KEY", prefix))
        .map_err(|_| ConfigError::MissingCredential(provider.to_string()))?;
    let base_url = env::var(format!("{}_BASE_URL", prefix)).ok();
    let timeout_secs = env::var(format!("{}_TIMEOUT", prefix))
        .or_else(|_| env::var("DEFAULT_TIMEOUT"))
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    Ok(ApiConfig {
        api_key,
        base_url,
        timeout: Duration::from_secs(timeout_secs),
    })
}

/// The process-wide log level, read from `LOG_LEVEL` (default `info`).
pub fn log_level() -> LevelFilter {
    match env::var("LOG_LEVEL").unwrap_or_default().to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// The root directory under which `<task_id>/message_history.json`
/// snapshots are written, read from `SWARM_DATA_ROOT` (default `./data`).
pub fn data_root() -> PathBuf {
    env::var("SWARM_DATA_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./data"))
}

/// Initialize the process-wide logging backend from [`log_level`]. Safe to
/// call more than once; only the first call takes effect.
pub fn init_logging() {
    let _ = env_logger::Builder::new().filter_level(log_level()).try_init();
}
