//! Signal delivery
//!
//! Pluggable [`DispatchAdapter`]s realize a signal as an actual delivery:
//! to a process mailbox, a pub/sub topic, an HTTP endpoint or a webhook.
//! Every delivery runs inside the [`CircuitBreaker`] of its adapter type, so
//! a failing dependency fast-fails instead of cascading.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod adapters;
pub mod breaker;
pub mod dispatcher;
pub mod retry;

pub use adapters::{Delivery, DispatchAdapter};
pub use breaker::{BreakerOptions, BreakerRegistry, BreakerStatus, BreakerStrategy, CircuitBreaker};
pub use dispatcher::Dispatcher;
pub use marshal_bus::Signal;
pub use retry::RetryPolicy;

/// Adapter-specific configuration map
pub type Options = serde_json::Map<String, Value>;

/// Delivery errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("UNKNOWN ADAPTER: {0}")]
    UnknownAdapter(String),

    #[error("INVALID {adapter} OPTIONS: {reason}")]
    InvalidOptions { adapter: String, reason: String },

    #[error("PROCESS NOT FOUND: {0}")]
    ProcessNotFound(String),

    #[error("PROCESS NOT ALIVE: {0}")]
    ProcessNotAlive(String),

    #[error("CALLING SELF: {0}")]
    CallingSelf(String),

    #[error("TIMED OUT AFTER {0}ms")]
    Timeout(u64),

    #[error("NO REPLY FROM {0}")]
    NoReply(String),

    #[error("BUS NOT RUNNING: {0}")]
    BusNotRunning(String),

    #[error("HTTP STATUS {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("HTTP REQUEST FAILED: {0}")]
    Http(String),

    #[error("SERIALIZATION FAILED: {0}")]
    Serialization(String),

    #[error("CIRCUIT OPEN: {0}")]
    CircuitOpen(String),

    #[error("ADAPTER PANICKED: {0}")]
    Panicked(String),

    #[error("ADAPTER FAILED: {0}")]
    Adapter(String),
}

impl DispatchError {
    pub fn invalid(adapter: impl Into<String>, reason: impl Into<String>) -> Self {
        DispatchError::InvalidOptions {
            adapter: adapter.into(),
            reason: reason.into(),
        }
    }

    /// The breaker rejected the call; the adapter was never invoked
    pub fn is_not_attempted(&self) -> bool {
        matches!(self, DispatchError::CircuitOpen(_))
    }

    /// Rejected before any side effect
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DispatchError::UnknownAdapter(_) | DispatchError::InvalidOptions { .. }
        )
    }
}

impl From<marshal_bus::BusError> for DispatchError {
    fn from(err: marshal_bus::BusError) -> Self {
        use marshal_bus::BusError;
        match err {
            BusError::ProcessNotFound(target) => DispatchError::ProcessNotFound(target),
            BusError::ProcessNotAlive(id) => DispatchError::ProcessNotAlive(id.to_string()),
            BusError::CallingSelf(id) => DispatchError::CallingSelf(id.to_string()),
            BusError::Timeout(ms) => DispatchError::Timeout(ms),
            BusError::NoReply(id) => DispatchError::NoReply(id.to_string()),
            BusError::BusNotRunning(name) => DispatchError::BusNotRunning(name),
            BusError::NameTaken(name) => DispatchError::Adapter(format!("name taken: {}", name)),
        }
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DispatchError::Http(format!("timed out: {}", err))
        } else {
            DispatchError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Where and how to deliver a signal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    pub adapter_type: String,
    #[serde(default)]
    pub options: Options,
}

impl DispatchConfig {
    pub fn new(adapter_type: impl Into<String>) -> Self {
        Self {
            adapter_type: adapter_type.into(),
            options: Options::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.options.insert(key.into(), value);
        }
        self
    }

    pub fn pid(target: marshal_bus::ProcessId) -> Self {
        Self::new(adapters::PID).with_option("target", target)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(adapters::NAMED).with_option("target", name.into())
    }

    pub fn pubsub(bus: impl Into<String>, topic: impl Into<String>) -> Self {
        Self::new(adapters::PUBSUB)
            .with_option("target", bus.into())
            .with_option("topic", topic.into())
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self::new(adapters::HTTP).with_option("url", url.into())
    }

    pub fn webhook(url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::new(adapters::WEBHOOK)
            .with_option("url", url.into())
            .with_option("secret", secret.into())
    }

    pub fn logger() -> Self {
        Self::new(adapters::LOGGER)
    }

    pub fn console() -> Self {
        Self::new(adapters::CONSOLE)
    }

    pub fn noop() -> Self {
        Self::new(adapters::NOOP)
    }
}

impl From<marshal_config::AdapterPreset> for DispatchConfig {
    fn from(preset: marshal_config::AdapterPreset) -> Self {
        Self {
            adapter_type: preset.adapter_type,
            options: preset.options,
        }
    }
}

/// One dispatch configuration or a fan-out list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DispatchTarget {
    One(DispatchConfig),
    Many(Vec<DispatchConfig>),
}

impl DispatchTarget {
    pub fn configs(&self) -> &[DispatchConfig] {
        match self {
            DispatchTarget::One(config) => std::slice::from_ref(config),
            DispatchTarget::Many(configs) => configs,
        }
    }
}

impl From<DispatchConfig> for DispatchTarget {
    fn from(config: DispatchConfig) -> Self {
        DispatchTarget::One(config)
    }
}

impl From<Vec<DispatchConfig>> for DispatchTarget {
    fn from(configs: Vec<DispatchConfig>) -> Self {
        DispatchTarget::Many(configs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_config_builders() {
        let config = DispatchConfig::pubsub("events", "orders");
        assert_eq!(config.adapter_type, "pubsub");
        assert_eq!(config.options["target"], json!("events"));
        assert_eq!(config.options["topic"], json!("orders"));

        let config = DispatchConfig::webhook("https://example.com", "k");
        assert_eq!(config.adapter_type, "webhook");
        assert_eq!(config.options["secret"], json!("k"));
    }

    #[test]
    fn test_dispatch_target_untagged_serde() {
        let one: DispatchTarget =
            serde_json::from_value(json!({"adapter_type": "noop"})).unwrap();
        assert_eq!(one.configs().len(), 1);

        let many: DispatchTarget = serde_json::from_value(json!([
            {"adapter_type": "noop"},
            {"adapter_type": "logger", "options": {"level": "debug"}}
        ]))
        .unwrap();
        assert_eq!(many.configs().len(), 2);
        assert_eq!(many.configs()[1].adapter_type, "logger");
    }

    #[test]
    fn test_bus_error_mapping() {
        let id = marshal_bus::ProcessId::from_raw(9);
        let err: DispatchError = marshal_bus::BusError::CallingSelf(id).into();
        assert_eq!(err, DispatchError::CallingSelf("#9".to_string()));

        let err: DispatchError = marshal_bus::BusError::Timeout(50).into();
        assert_eq!(err, DispatchError::Timeout(50));
    }

    #[test]
    fn test_error_classification() {
        assert!(DispatchError::CircuitOpen("http".into()).is_not_attempted());
        assert!(!DispatchError::Timeout(1).is_not_attempted());
        assert!(DispatchError::invalid("http", "missing field `url`").is_validation());
        assert!(DispatchError::UnknownAdapter("smtp".into()).is_validation());
    }
}
