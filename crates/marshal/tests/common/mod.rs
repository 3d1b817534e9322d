//! Common test utilities for Marshal integration tests
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Isolated home directory with its own config location
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let config_dir = temp_dir.path().join(".marshal");

        Ok(Self {
            temp_dir,
            config_dir,
        })
    }

    /// Default config file under the isolated home
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    /// Command with HOME pointed at the test environment
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_marshal"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Write a config with a couple of presets
    pub fn create_config(&self) -> anyhow::Result<()> {
        let config = r#"{
  "log_level": "warn",
  "breaker": { "max_failures": 2 },
  "adapters": {
    "quiet": { "adapter_type": "noop" },
    "audit": { "adapter_type": "logger", "options": { "level": "warn" } }
  }
}"#;
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::write(self.config_file(), config)?;
        Ok(())
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
