//! Direct delivery to a process mailbox, by id or by registered name

use async_trait::async_trait;
use marshal_bus::{MessageFormat, ProcessHandle, ProcessId, ProcessRegistry};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{parse_options, to_options, Delivery, DispatchAdapter, NAMED, PID};
use crate::{DispatchError, Options, Result, Signal};

const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Send and return immediately
    #[default]
    Async,
    /// Wait for the target's reply, bounded by the timeout
    Sync,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PidOptions {
    pub target: ProcessId,
    #[serde(default)]
    pub delivery_mode: DeliveryMode,
    /// Milliseconds, sync mode only
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub message_format: MessageFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedOptions {
    pub target: String,
    #[serde(default)]
    pub delivery_mode: DeliveryMode,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub message_format: MessageFormat,
}

async fn deliver_to(
    handle: ProcessHandle,
    mode: DeliveryMode,
    timeout: u64,
    format: MessageFormat,
    signal: &Signal,
) -> Result<Delivery> {
    let message = format.render(signal);

    match mode {
        DeliveryMode::Async => {
            if !handle.is_alive() {
                return Err(DispatchError::ProcessNotAlive(handle.id().to_string()));
            }
            handle.cast(message)?;
            Ok(Delivery::Delivered)
        }
        DeliveryMode::Sync => {
            let reply = handle
                .call(message, Duration::from_millis(timeout))
                .await?;
            Ok(Delivery::Reply(reply))
        }
    }
}

/// Delivers to a process id
#[derive(Debug, Clone, Default)]
pub struct PidAdapter {
    processes: ProcessRegistry,
}

impl PidAdapter {
    pub fn new(processes: ProcessRegistry) -> Self {
        Self { processes }
    }
}

#[async_trait]
impl DispatchAdapter for PidAdapter {
    fn adapter_type(&self) -> &str {
        PID
    }

    fn validate_opts(&self, options: &Options) -> Result<Options> {
        let typed: PidOptions = parse_options(PID, options)?;
        if typed.delivery_mode == DeliveryMode::Sync && typed.timeout == 0 {
            return Err(DispatchError::invalid(PID, "timeout: must be positive"));
        }
        to_options(PID, &typed)
    }

    async fn deliver(&self, signal: &Signal, options: &Options) -> Result<Delivery> {
        let opts: PidOptions = parse_options(PID, options)?;
        debug!("◆ PID {} <- {}", opts.target, signal.signal_type);

        let handle = self.processes.lookup(opts.target)?;
        deliver_to(
            handle,
            opts.delivery_mode,
            opts.timeout,
            opts.message_format,
            signal,
        )
        .await
    }
}

/// Delivers to a registered process name
#[derive(Debug, Clone, Default)]
pub struct NamedAdapter {
    processes: ProcessRegistry,
}

impl NamedAdapter {
    pub fn new(processes: ProcessRegistry) -> Self {
        Self { processes }
    }
}

#[async_trait]
impl DispatchAdapter for NamedAdapter {
    fn adapter_type(&self) -> &str {
        NAMED
    }

    fn validate_opts(&self, options: &Options) -> Result<Options> {
        let typed: NamedOptions = parse_options(NAMED, options)?;
        if typed.target.trim().is_empty() {
            return Err(DispatchError::invalid(NAMED, "target: must not be empty"));
        }
        if typed.delivery_mode == DeliveryMode::Sync && typed.timeout == 0 {
            return Err(DispatchError::invalid(NAMED, "timeout: must be positive"));
        }
        to_options(NAMED, &typed)
    }

    async fn deliver(&self, signal: &Signal, options: &Options) -> Result<Delivery> {
        let opts: NamedOptions = parse_options(NAMED, options)?;
        debug!("◆ NAMED {} <- {}", opts.target, signal.signal_type);

        let handle = self.processes.lookup_name(&opts.target)?;
        deliver_to(
            handle,
            opts.delivery_mode,
            opts.timeout,
            opts.message_format,
            signal,
        )
        .await
    }
}
