//! Marshal command implementations

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

use marshal_config::Config;
use marshal_dispatch::adapters::BUILTIN;
use marshal_dispatch::{Delivery, DispatchConfig, Dispatcher, Signal};

use crate::SendArgs;

/// Initialize the config file
pub async fn init_command(path: &Path) -> Result<()> {
    println!("◆ Initializing Marshal...");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let existed = path.exists();
    marshal_config::init_at(path)
        .await
        .with_context(|| format!("could not initialize {}", path.display()))?;

    if existed {
        println!("Config already present at {}", path.display());
    } else {
        println!("✓ Config written to {}", path.display());
    }

    println!("\nNext steps:");
    println!("  1. Add adapter presets under \"adapters\" in the config file");
    println!("  2. Send a signal: marshal send -a console -t demo.hello");

    Ok(())
}

/// Print the effective configuration
pub async fn config_show_command(path: &Path) -> Result<()> {
    let config = Config::load_from(path)
        .await
        .with_context(|| format!("could not load {}", path.display()))?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Print the config file location
pub fn config_path_command(path: &Path) {
    println!("{}", path.display());
}

/// List adapter types and configured presets
pub async fn adapters_command(path: &Path) -> Result<()> {
    let config = Config::load_from(path).await?;

    println!("◆ Adapter Types");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for adapter_type in BUILTIN {
        println!("  {}", adapter_type);
    }

    if !config.adapters.is_empty() {
        println!("\n◆ Presets");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for (name, preset) in &config.adapters {
            println!("  {} ({})", name, preset.adapter_type);
        }
    }

    Ok(())
}

/// Resolve `--adapter` against presets first, then built-in types
fn resolve_target(config: &Config, adapter: &str) -> Result<DispatchConfig> {
    if let Ok(preset) = config.preset(adapter) {
        debug!("◆ USING PRESET {}", adapter);
        return Ok(DispatchConfig::from(preset.clone()));
    }
    if BUILTIN.contains(&adapter) {
        return Ok(DispatchConfig::new(adapter));
    }
    bail!(
        "{} is neither a configured preset nor an adapter type ({})",
        adapter,
        BUILTIN.join(", ")
    )
}

/// Build a signal and dispatch it
pub async fn send_command(path: &Path, args: SendArgs) -> Result<()> {
    let config = Config::load_from(path).await?;

    let mut target = resolve_target(&config, &args.adapter)?;
    for (key, value) in args.options {
        target.options.insert(key, value);
    }

    let mut signal = Signal::new(args.signal_type, args.source);
    if let Some(raw) = args.data {
        let data: Value = serde_json::from_str(&raw).context("--data must be valid JSON")?;
        signal = signal.with_data(data);
    }

    let dispatcher = Dispatcher::from_config(&config);
    info!("◆ SENDING {} VIA {}", signal.signal_type, target.adapter_type);

    match dispatcher.dispatch(&signal, &target).await? {
        Delivery::Delivered => {
            println!("✓ Delivered {} via {}", signal.id, target.adapter_type);
        }
        Delivery::Reply(reply) => {
            println!("✓ Delivered {} via {}", signal.id, target.adapter_type);
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use marshal_config::AdapterPreset;

    #[test]
    fn test_resolve_prefers_presets() {
        let mut config = Config::default();
        config.adapters.insert(
            "noop".to_string(),
            AdapterPreset::new("logger").with_option("level", "warn"),
        );

        let target = resolve_target(&config, "noop").unwrap();
        assert_eq!(target.adapter_type, "logger");
        assert_eq!(target.options["level"], "warn");

        let target = resolve_target(&config, "console").unwrap();
        assert_eq!(target, DispatchConfig::console());
    }

    #[test]
    fn test_resolve_unknown_adapter() {
        let err = resolve_target(&Config::default(), "smtp").unwrap_err();
        assert!(err.to_string().contains("smtp"));
    }
}
