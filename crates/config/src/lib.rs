//! Configuration management for Marshal
//!
//! Loads and saves the JSON configuration that seeds breaker thresholds,
//! HTTP retry policy, normalizer behaviour and named adapter presets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;
pub mod telemetry;

pub use paths::{config_path, data_dir};

/// Errors in configuration handling
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG IO ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("CONFIG PARSE FAILED: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UNKNOWN ADAPTER PRESET: {0}")]
    UnknownPreset(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Circuit breaker thresholds shared by every adapter type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakerConfig {
    /// Failures tolerated inside one window before the circuit opens
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    /// Sliding window for counting failures
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Time an open circuit waits before closing again
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: default_max_failures(),
            window_ms: default_window_ms(),
            refresh_ms: default_refresh_ms(),
        }
    }
}

fn default_max_failures() -> u32 {
    5
}

fn default_window_ms() -> u64 {
    10_000
}

fn default_refresh_ms() -> u64 {
    30_000
}

/// Exponential backoff policy for HTTP delivery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    5_000
}

/// HTTP and webhook delivery defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_http_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_http_timeout_ms() -> u64 {
    5_000
}

/// Which context wins when a list element carries its own context and the
/// caller supplies a shared one
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContextPrecedence {
    /// Shared context overrides the element's own keys
    #[default]
    SharedWins,
    /// The element's own context overrides shared keys
    ItemWins,
}

/// Instruction normalizer settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NormalizerConfig {
    #[serde(default)]
    pub context_precedence: ContextPrecedence,
}

/// A named dispatch configuration that can be referenced by name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdapterPreset {
    pub adapter_type: String,
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl AdapterPreset {
    pub fn new(adapter_type: impl Into<String>) -> Self {
        Self {
            adapter_type: adapter_type.into(),
            options: serde_json::Map::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.options.insert(key.into(), value);
        }
        self
    }
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub adapters: BTreeMap<String, AdapterPreset>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            breaker: BreakerConfig::default(),
            http: HttpConfig::default(),
            normalizer: NormalizerConfig::default(),
            adapters: BTreeMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from specific location, falling back to defaults if absent
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("◆ NO CONFIG AT {:?}, USING DEFAULTS", path);
            return Ok(Config::default());
        }

        debug!("◆ READING CONFIG FROM {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("◆ WRITING CONFIG TO {:?}", path);

        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Look up a named adapter preset
    pub fn preset(&self, name: &str) -> Result<&AdapterPreset> {
        self.adapters
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))
    }
}

/// Write a default configuration to `path` unless one already exists, then load it
pub async fn init_at(path: &Path) -> Result<Config> {
    if path.exists() {
        warn!("◆ CONFIG ALREADY PRESENT AT {:?}", path);
    } else {
        Config::default().save_to(path).await?;
        info!("◆ CONFIG WRITTEN TO {:?}", path);
    }

    Config::load_from(path).await
}

/// Initialize the default configuration file
pub async fn init() -> Result<Config> {
    init_at(&config_path()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_match_breaker_and_retry_policy() {
        let config = Config::default();
        assert_eq!(config.breaker.max_failures, 5);
        assert_eq!(config.breaker.window_ms, 10_000);
        assert_eq!(config.breaker.refresh_ms, 30_000);
        assert_eq!(config.http.retry.max_attempts, 3);
        assert_eq!(config.http.retry.base_delay_ms, 1_000);
        assert_eq!(config.http.retry.max_delay_ms, 5_000);
        assert_eq!(
            config.normalizer.context_precedence,
            ContextPrecedence::SharedWins
        );
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config = serde_json::from_value(json!({
            "breaker": { "max_failures": 2 },
            "normalizer": { "context_precedence": "item_wins" }
        }))
        .unwrap();

        assert_eq!(config.breaker.max_failures, 2);
        assert_eq!(config.breaker.window_ms, 10_000);
        assert_eq!(config.log_level, "info");
        assert_eq!(
            config.normalizer.context_precedence,
            ContextPrecedence::ItemWins
        );
    }

    #[test]
    fn test_preset_lookup() {
        let mut config = Config::default();
        config.adapters.insert(
            "audit".to_string(),
            AdapterPreset::new("http").with_option("url", "http://localhost/audit"),
        );

        let preset = config.preset("audit").unwrap();
        assert_eq!(preset.adapter_type, "http");
        assert_eq!(preset.options["url"], json!("http://localhost/audit"));

        assert!(matches!(
            config.preset("missing"),
            Err(ConfigError::UnknownPreset(name)) if name == "missing"
        ));
    }
}
