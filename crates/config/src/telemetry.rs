//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber on stderr. `RUST_LOG` takes precedence over `level`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
