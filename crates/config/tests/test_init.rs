//! Tests for config initialization

use marshal_config::{init_at, Config};
use tempfile::TempDir;

/// Test init writes defaults when no config exists
#[tokio::test]
async fn test_init_creates_default_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join(".marshal").join("config.json");

    assert!(!config_path.exists());

    let config = init_at(&config_path).await.expect("Init failed");

    assert!(config_path.exists());
    assert_eq!(config, Config::default());
}

/// Test init keeps an existing config untouched
#[tokio::test]
async fn test_init_existing_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("config.json");

    let mut config = Config::default();
    config.log_level = "trace".to_string();
    config.save_to(&config_path).await.expect("Failed to save");

    let loaded = init_at(&config_path).await.expect("Init failed");
    assert_eq!(loaded.log_level, "trace");
}
