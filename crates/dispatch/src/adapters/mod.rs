//! Delivery adapters

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::{DispatchError, Options, Result, Signal};

pub mod http;
pub mod logger;
pub mod pid;
pub mod pubsub;
pub mod webhook;

pub use http::{HttpAdapter, HttpMethod, HttpOptions};
pub use logger::{ConsoleAdapter, LoggerAdapter, NoopAdapter};
pub use pid::{DeliveryMode, NamedAdapter, NamedOptions, PidAdapter, PidOptions};
pub use pubsub::{PubSubAdapter, PubSubOptions};
pub use webhook::{sign, WebhookAdapter, WebhookOptions};

pub const PID: &str = "pid";
pub const NAMED: &str = "named";
pub const PUBSUB: &str = "pubsub";
pub const HTTP: &str = "http";
pub const WEBHOOK: &str = "webhook";
pub const LOGGER: &str = "logger";
pub const CONSOLE: &str = "console";
pub const NOOP: &str = "noop";

/// Every adapter type registered by `Dispatcher::with_defaults`
pub const BUILTIN: &[&str] = &[PID, NAMED, PUBSUB, HTTP, WEBHOOK, LOGGER, CONSOLE, NOOP];

/// Outcome of a successful delivery
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Delivered,
    /// Synchronous deliveries carry the target's reply
    Reply(Value),
}

/// A pluggable delivery backend
#[async_trait]
pub trait DispatchAdapter: Send + Sync {
    /// Type string this adapter is registered under
    fn adapter_type(&self) -> &str;

    /// Typecheck and normalize configuration. Called before delivery.
    fn validate_opts(&self, options: &Options) -> Result<Options>;

    /// Deliver `signal` using options returned by `validate_opts`
    async fn deliver(&self, signal: &Signal, options: &Options) -> Result<Delivery>;
}

/// Deserialize adapter options into their typed form
pub(crate) fn parse_options<T: DeserializeOwned>(adapter: &str, options: &Options) -> Result<T> {
    serde_json::from_value(Value::Object(options.clone()))
        .map_err(|e| DispatchError::invalid(adapter, e.to_string()))
}

/// Serialize typed options back into a map
pub(crate) fn to_options<T: Serialize>(adapter: &str, typed: &T) -> Result<Options> {
    match serde_json::to_value(typed) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DispatchError::invalid(adapter, "options must be a map")),
        Err(e) => Err(DispatchError::invalid(adapter, e.to_string())),
    }
}
