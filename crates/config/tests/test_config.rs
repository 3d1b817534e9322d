//! Tests for Config serialization, deserialization, and core functionality

use marshal_config::{
    AdapterPreset, BreakerConfig, Config, ContextPrecedence, HttpConfig, NormalizerConfig,
    RetryConfig,
};
use serde_json::json;
use tempfile::TempDir;

/// Helper to create a temporary directory for tests
fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Test that default Config has expected values
#[test]
fn test_config_defaults() {
    let config = Config::default();

    assert_eq!(config.log_level, "info");
    assert_eq!(config.breaker, BreakerConfig::default());
    assert_eq!(config.http.timeout_ms, 5_000);
    assert_eq!(config.http.retry, RetryConfig::default());
    assert_eq!(config.normalizer, NormalizerConfig::default());
    assert!(config.adapters.is_empty());
}

/// Test HttpConfig defaults
#[test]
fn test_http_config_defaults() {
    let http = HttpConfig::default();
    assert_eq!(http.timeout_ms, 5_000);
    assert_eq!(http.retry.max_attempts, 3);
    assert_eq!(http.retry.base_delay_ms, 1_000);
    assert_eq!(http.retry.max_delay_ms, 5_000);
}

/// Test empty JSON object deserializes to defaults
#[test]
fn test_empty_json_uses_defaults() {
    let config: Config = serde_json::from_str("{}").expect("Should deserialize");
    assert_eq!(config, Config::default());
}

/// Test ContextPrecedence serializes as snake_case
#[test]
fn test_context_precedence_serialization() {
    assert_eq!(
        serde_json::to_value(ContextPrecedence::SharedWins).unwrap(),
        json!("shared_wins")
    );
    assert_eq!(
        serde_json::to_value(ContextPrecedence::ItemWins).unwrap(),
        json!("item_wins")
    );
}

/// Test adapter presets deserialize with options
#[test]
fn test_adapter_presets_deserialize() {
    let config: Config = serde_json::from_value(json!({
        "adapters": {
            "audit": {
                "adapter_type": "webhook",
                "options": { "url": "https://example.com/hook", "secret": "s3cr3t" }
            },
            "quiet": { "adapter_type": "noop" }
        }
    }))
    .expect("Should deserialize");

    assert_eq!(config.adapters.len(), 2);
    let audit = config.preset("audit").unwrap();
    assert_eq!(audit.adapter_type, "webhook");
    assert_eq!(audit.options["secret"], json!("s3cr3t"));
    assert!(config.preset("quiet").unwrap().options.is_empty());
}

/// Test AdapterPreset builder
#[test]
fn test_adapter_preset_builder() {
    let preset = AdapterPreset::new("pubsub")
        .with_option("target", "events")
        .with_option("topic", "orders");

    assert_eq!(preset.adapter_type, "pubsub");
    assert_eq!(preset.options["target"], json!("events"));
    assert_eq!(preset.options["topic"], json!("orders"));
}

/// Test save then load preserves every section
#[tokio::test]
async fn test_save_and_load_roundtrip() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");

    let mut config = Config::default();
    config.log_level = "debug".to_string();
    config.breaker.max_failures = 3;
    config.http.retry.max_attempts = 7;
    config.normalizer.context_precedence = ContextPrecedence::ItemWins;
    config
        .adapters
        .insert("log".to_string(), AdapterPreset::new("logger"));

    config.save_to(&path).await.expect("Failed to save");
    let loaded = Config::load_from(&path).await.expect("Failed to load");

    assert_eq!(loaded, config);
}

/// Test loading a missing file yields defaults
#[tokio::test]
async fn test_load_missing_file_returns_defaults() {
    let dir = temp_dir();
    let loaded = Config::load_from(&dir.path().join("absent.json"))
        .await
        .expect("Should fall back to defaults");

    assert_eq!(loaded, Config::default());
}

/// Test save creates parent directories
#[tokio::test]
async fn test_save_creates_parent_dirs() {
    let dir = temp_dir();
    let path = dir.path().join("nested").join("deeper").join("config.json");

    Config::default().save_to(&path).await.expect("Failed to save");
    assert!(path.exists());
}
