//! Gateway configuration loading and parsing

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "/etc/watchgate/config.toml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            backend: BackendConfig::default(),
            rate_limit: RateLimitConfig::default(),
            validation: ValidationConfig::default(),
            logging: LoggingConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_secs: default_backend_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum burst size (bucket capacity in tokens)
    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: u32,
    /// Sustained rate: tokens refilled per minute
    #[serde(default = "default_per_minute")]
    pub per_minute: f64,
    /// Buckets untouched for this long are purged from the registry
    #[serde(default = "default_idle_eviction")]
    pub idle_eviction_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst_capacity: default_burst_capacity(),
            per_minute: default_per_minute(),
            idle_eviction_secs: default_idle_eviction(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_max_param_len")]
    pub max_param_len: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_param_len: default_max_param_len(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Parameter fields replaced with a placeholder in log events
    #[serde(default = "default_redact_fields")]
    pub redact_fields: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            redact_fields: default_redact_fields(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origin: default_allowed_origin(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8090".to_string()
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_backend_timeout() -> u64 {
    30
}

fn default_burst_capacity() -> u32 {
    10
}

fn default_per_minute() -> f64 {
    60.0
}

fn default_idle_eviction() -> u64 {
    900
}

fn default_max_param_len() -> usize {
    256
}

fn default_redact_fields() -> Vec<String> {
    ["api_key", "authorization", "token", "secret", "password"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_allowed_origin() -> String {
    "*".to_string()
}

/// Load configuration from the TOML file (if present), then apply
/// environment overrides for deployment-provided values.
pub fn load() -> Result<GatewayConfig> {
    let path = std::env::var("WATCHGATE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = load_file(Path::new(&path))?;

    if let Ok(v) = std::env::var("CHANGEDETECTION_URL") {
        config.backend.base_url = v;
    }
    if let Ok(v) = std::env::var("CHANGEDETECTION_API_KEY") {
        config.backend.api_key = v;
    }
    if let Ok(v) = std::env::var("WATCHGATE_LISTEN") {
        config.listen_addr = v;
    }

    Ok(config)
}

fn load_file(path: &Path) -> Result<GatewayConfig> {
    if !path.exists() {
        return Ok(GatewayConfig::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Failed to parse config: {}", path.display()))
}
