//! Marshal - signal dispatch from the terminal

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing::error;

mod commands;

use commands::{
    adapters_command, config_path_command, config_show_command, init_command, send_command,
};

/// Marshal - deliver signals through pluggable adapters
#[derive(Parser)]
#[command(name = "marshal")]
#[command(about = "◆ Signal dispatch with circuit breakers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Config file to use instead of ~/.marshal/config.json
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the config file
    Init,
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Build a signal and dispatch it
    Send(SendArgs),
    /// List adapter types and configured presets
    Adapters,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
}

#[derive(Args)]
pub struct SendArgs {
    /// Adapter type or configured preset name
    #[arg(short, long)]
    pub adapter: String,

    /// Adapter option as key=value; JSON values are parsed
    #[arg(short, long = "option", value_parser = parse_option)]
    pub options: Vec<(String, Value)>,

    /// Signal type
    #[arg(short = 't', long = "type")]
    pub signal_type: String,

    /// Signal source
    #[arg(short, long, default_value = "/marshal/cli")]
    pub source: String,

    /// Signal payload as JSON
    #[arg(short, long)]
    pub data: Option<String>,
}

fn parse_option(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in {:?}", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(marshal_config::config_path);

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        marshal_config::Config::load_from(&config_path)
            .await
            .map(|config| config.log_level)
            .unwrap_or_else(|_| "info".to_string())
    };
    marshal_config::telemetry::init(&level);

    match cli.command {
        Commands::Init => {
            if let Err(e) = init_command(&config_path).await {
                error!("Init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                if let Err(e) = config_show_command(&config_path).await {
                    error!("Config show failed: {:#}", e);
                    std::process::exit(1);
                }
            }
            ConfigCommands::Path => config_path_command(&config_path),
        },
        Commands::Send(args) => {
            if let Err(e) = send_command(&config_path, args).await {
                error!("Send failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::Adapters => {
            if let Err(e) = adapters_command(&config_path).await {
                error!("Adapters failed: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}
