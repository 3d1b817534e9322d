//! Adapters that never fail: tracing output, stdout, and a sink

use async_trait::async_trait;
use tracing::{debug, error, info, trace, warn};

use super::{Delivery, DispatchAdapter, CONSOLE, LOGGER, NOOP};
use crate::{Options, Result, Signal};

/// Logs the signal through `tracing` at the `level` option (default info)
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggerAdapter;

#[async_trait]
impl DispatchAdapter for LoggerAdapter {
    fn adapter_type(&self) -> &str {
        LOGGER
    }

    fn validate_opts(&self, options: &Options) -> Result<Options> {
        Ok(options.clone())
    }

    async fn deliver(&self, signal: &Signal, options: &Options) -> Result<Delivery> {
        let level = options
            .get("level")
            .and_then(|level| level.as_str())
            .unwrap_or("info");

        match level {
            "trace" => trace!("◆ SIGNAL {} FROM {}: {}", signal.signal_type, signal.source, signal.data),
            "debug" => debug!("◆ SIGNAL {} FROM {}: {}", signal.signal_type, signal.source, signal.data),
            "warn" => warn!("◆ SIGNAL {} FROM {}: {}", signal.signal_type, signal.source, signal.data),
            "error" => error!("◆ SIGNAL {} FROM {}: {}", signal.signal_type, signal.source, signal.data),
            _ => info!("◆ SIGNAL {} FROM {}: {}", signal.signal_type, signal.source, signal.data),
        }
        Ok(Delivery::Delivered)
    }
}

/// Prints the signal's JSON to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleAdapter;

#[async_trait]
impl DispatchAdapter for ConsoleAdapter {
    fn adapter_type(&self) -> &str {
        CONSOLE
    }

    fn validate_opts(&self, options: &Options) -> Result<Options> {
        Ok(options.clone())
    }

    async fn deliver(&self, signal: &Signal, _options: &Options) -> Result<Delivery> {
        match serde_json::to_string_pretty(signal) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{:?}", signal),
        }
        Ok(Delivery::Delivered)
    }
}

/// Discards every signal
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdapter;

#[async_trait]
impl DispatchAdapter for NoopAdapter {
    fn adapter_type(&self) -> &str {
        NOOP
    }

    fn validate_opts(&self, options: &Options) -> Result<Options> {
        Ok(options.clone())
    }

    async fn deliver(&self, _signal: &Signal, _options: &Options) -> Result<Delivery> {
        Ok(Delivery::Delivered)
    }
}
