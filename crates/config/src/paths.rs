//! Filesystem locations for Marshal state

use std::path::{Path, PathBuf};

/// Marshal data directory (~/.marshal)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".marshal")
}

/// Default configuration file location
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Ensure directory exists
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}
