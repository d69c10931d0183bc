//! Configuration management for imgpilot

use crate::error::{Error, Result};
use crate::format::LinkFormat;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration directory name
const CONFIG_DIR: &str = "imgpilot";

/// Configuration file name
const CONFIG_FILE: &str = "config.toml";

/// Upload history file name
const HISTORY_FILE: &str = "history.json";

pub const RETRY_ATTEMPTS_RANGE: (u32, u32) = (0, 5);
pub const RETRY_BASE_DELAY_RANGE: (u64, u64) = (200, 5000);
pub const MAX_FILE_SIZE_MB_RANGE: (u64, u64) = (1, 200);
pub const MAX_CONCURRENT_RANGE: (usize, usize) = (1, 6);
pub const REQUEST_TIMEOUT_RANGE: (u64, u64) = (5000, 120_000);

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub host: HostConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub logging: Option<LoggingConfig>,
}

/// Image host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub domain: String,
    pub api_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_id: Option<String>,
}

/// Retry, size and concurrency limits, stored as entered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_max_file_size")]
    pub max_file_size_mb: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            max_file_size_mb: default_max_file_size(),
            max_concurrent: default_max_concurrent(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub default_format: LinkFormat,
}

// Default values
fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_base_delay() -> u64 {
    800
}

fn default_max_file_size() -> u64 {
    10
}

fn default_max_concurrent() -> usize {
    3
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Read-only snapshot of the upload limits, clamped to their allowed ranges.
///
/// One snapshot is taken per batch; later config edits do not affect tasks
/// that are already queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_file_size_bytes: u64,
    pub max_concurrent: usize,
    pub request_timeout: Duration,
}

impl UploadConfig {
    pub fn settings(&self) -> UploadSettings {
        let clamp_u64 = |v: u64, (lo, hi): (u64, u64)| v.clamp(lo, hi);
        UploadSettings {
            max_attempts: self
                .retry_attempts
                .clamp(RETRY_ATTEMPTS_RANGE.0, RETRY_ATTEMPTS_RANGE.1),
            base_delay: Duration::from_millis(clamp_u64(
                self.retry_base_delay_ms,
                RETRY_BASE_DELAY_RANGE,
            )),
            max_file_size_bytes: clamp_u64(self.max_file_size_mb, MAX_FILE_SIZE_MB_RANGE)
                * 1024
                * 1024,
            max_concurrent: self
                .max_concurrent
                .clamp(MAX_CONCURRENT_RANGE.0, MAX_CONCURRENT_RANGE.1),
            request_timeout: Duration::from_millis(clamp_u64(
                self.request_timeout_ms,
                REQUEST_TIMEOUT_RANGE,
            )),
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        UploadConfig::default().settings()
    }
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let home = home_dir()
        .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
    let config_dir = home.join(".config").join(CONFIG_DIR);

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).map_err(|e| {
            Error::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    Ok(config_dir)
}

/// Get the configuration file path
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE))
}

/// Get the history file path
pub fn get_history_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(HISTORY_FILE))
}

/// History file kept next to an explicit configuration file
pub fn history_path_for(config_path: &Path) -> PathBuf {
    config_path.with_file_name(HISTORY_FILE)
}

/// Load configuration from the default location
pub fn load_config() -> Result<ConfigFile> {
    load_config_from(&get_config_path()?)
}

/// Load configuration from an explicit path
pub fn load_config_from(config_path: &Path) -> Result<ConfigFile> {
    if !config_path.exists() {
        return Err(Error::ConfigNotFound(config_path.to_path_buf()));
    }

    let content = fs::read_to_string(config_path).map_err(|e| {
        Error::InvalidConfig(format!("Failed to read config file: {}", e))
    })?;

    let config: ConfigFile = toml::from_str(&content).map_err(|e| {
        Error::InvalidConfig(format!("Failed to parse config file: {}", e))
    })?;

    Ok(config)
}

/// Save configuration to the default location
pub fn save_config(config: &ConfigFile) -> Result<()> {
    save_config_to(config, &get_config_path()?)
}

/// Save configuration to an explicit path
pub fn save_config_to(config: &ConfigFile, config_path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).map_err(|e| {
        Error::InvalidConfig(format!("Failed to serialize config: {}", e))
    })?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(config_path, content).map_err(|e| {
        Error::Config(format!("Failed to write config file: {}", e))
    })?;

    // The file holds the API token: owner read/write only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(config_path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(config_path, perms)?;
    }

    Ok(())
}

/// Add a scheme to a bare host name and drop a trailing slash
pub fn normalize_domain(raw: &str) -> String {
    let value = raw.trim().trim_end_matches('/');
    if value.is_empty() || value.starts_with("http://") || value.starts_with("https://") {
        value.to_string()
    } else if value.starts_with("localhost") {
        format!("http://{}", value)
    } else {
        format!("https://{}", value)
    }
}

/// Check the API token shape: 10 to 200 of `[A-Za-z0-9._|:-]`
pub fn is_valid_token(token: &str) -> bool {
    (10..=200).contains(&token.len())
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '|' | ':' | '-'))
}

/// Validate configuration
pub fn validate_config(config: &ConfigFile) -> Result<()> {
    let domain = config.host.domain.trim();
    if domain.is_empty() {
        return Err(Error::InvalidInput("Image host domain cannot be empty".to_string()));
    }

    let url = reqwest::Url::parse(domain).map_err(|e| {
        Error::InvalidInput(format!("Invalid image host domain '{}': {}", domain, e))
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::InvalidInput(format!(
            "Image host domain must be an http(s) URL, got '{}'",
            domain
        )));
    }

    if config.host.api_token.is_empty() {
        return Err(Error::Config("No API token configured".to_string()));
    }

    if !is_valid_token(&config.host.api_token) {
        return Err(Error::InvalidInput(
            "Invalid API token format (expected 10-200 characters of A-Z a-z 0-9 . _ | : -)"
                .to_string(),
        ));
    }

    Ok(())
}

/// Check if configuration exists
pub fn config_exists() -> bool {
    get_config_path().map(|p| p.exists()).unwrap_or(false)
}

/// Public alias for ConfigFile (used by lib.rs)
pub use ConfigFile as Config;
