//! Directives: inert descriptions of effects for the runtime
//!
//! A directive carries no behaviour. The agent and its strategy only produce
//! them; the hosting runtime decides how and when each one is executed.
//! Host crates add kinds of their own through [`ExtensionDirective`] and make
//! them decodable with a [`DirectiveRegistry`].

use marshal_bus::Signal;
use marshal_dispatch::DispatchTarget;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{AgentError, Result};

/// Where an error directive originated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorContext {
    Normalize,
    Instruction,
    Strategy,
    Custom(String),
}

/// Serializable error payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl ErrorInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

impl From<&AgentError> for ErrorInfo {
    fn from(err: &AgentError) -> Self {
        ErrorInfo::new(err.kind(), err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[default]
    Normal,
    Shutdown,
    Error(String),
}

/// Payload delivered back when a schedule or cron job fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ScheduleMessage {
    /// Invoke the strategy's `tick`
    StrategyTick,
    Signal(Signal),
    Value(Value),
}

/// A directive kind defined outside this crate
pub trait ExtensionDirective: fmt::Debug + Send + Sync {
    /// Discriminator; must not collide with a core kind
    fn kind(&self) -> &str;

    /// Payload fields, without the `kind` key
    fn to_value(&self) -> Value;

    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to an extension directive
#[derive(Debug, Clone)]
pub struct CustomDirective(Arc<dyn ExtensionDirective>);

impl CustomDirective {
    pub fn new<D: ExtensionDirective + 'static>(directive: D) -> Self {
        Self(Arc::new(directive))
    }

    pub fn kind(&self) -> &str {
        self.0.kind()
    }

    pub fn payload(&self) -> Value {
        self.0.to_value()
    }

    pub fn downcast_ref<D: 'static>(&self) -> Option<&D> {
        self.0.as_any().downcast_ref::<D>()
    }
}

impl PartialEq for CustomDirective {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.payload() == other.payload()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    /// Publish a signal, optionally through explicit dispatch configs
    Emit {
        signal: Signal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dispatch: Option<DispatchTarget>,
    },
    Error {
        error: ErrorInfo,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<ErrorContext>,
    },
    Spawn {
        child_spec: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
    },
    SpawnAgent {
        agent_ref: String,
        tag: String,
        #[serde(default)]
        opts: Map<String, Value>,
        #[serde(default)]
        meta: Map<String, Value>,
    },
    StopChild {
        tag: String,
        #[serde(default)]
        reason: StopReason,
    },
    Schedule {
        delay_ms: u64,
        message: ScheduleMessage,
    },
    Stop {
        #[serde(default)]
        reason: StopReason,
    },
    Cron {
        cron_expr: String,
        message: ScheduleMessage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timezone: Option<String>,
    },
    CronCancel {
        job_id: String,
    },
    #[serde(skip)]
    Custom(CustomDirective),
}

/// Discriminators of the core kinds
pub const CORE_KINDS: &[&str] = &[
    "emit",
    "error",
    "spawn",
    "spawn_agent",
    "stop_child",
    "schedule",
    "stop",
    "cron",
    "cron_cancel",
];

fn invalid(kind: &str, reason: impl Into<String>) -> AgentError {
    AgentError::InvalidDirective {
        kind: kind.to_string(),
        reason: reason.into(),
    }
}

fn require(kind: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(kind, format!("{} must not be empty", field)));
    }
    Ok(())
}

impl Directive {
    pub fn emit(signal: Signal) -> Self {
        Directive::Emit {
            signal,
            dispatch: None,
        }
    }

    pub fn emit_to(signal: Signal, dispatch: impl Into<DispatchTarget>) -> Self {
        Directive::Emit {
            signal,
            dispatch: Some(dispatch.into()),
        }
    }

    pub fn error(error: ErrorInfo, context: Option<ErrorContext>) -> Self {
        Directive::Error { error, context }
    }

    pub fn spawn(child_spec: Value, tag: Option<String>) -> Result<Self> {
        if child_spec.is_null() {
            return Err(invalid("spawn", "child_spec must not be null"));
        }
        Ok(Directive::Spawn { child_spec, tag })
    }

    pub fn spawn_agent(agent_ref: impl Into<String>, tag: impl Into<String>) -> Result<Self> {
        let agent_ref = agent_ref.into();
        let tag = tag.into();
        require("spawn_agent", "agent_ref", &agent_ref)?;
        require("spawn_agent", "tag", &tag)?;
        Ok(Directive::SpawnAgent {
            agent_ref,
            tag,
            opts: Map::new(),
            meta: Map::new(),
        })
    }

    pub fn stop_child(tag: impl Into<String>, reason: StopReason) -> Result<Self> {
        let tag = tag.into();
        require("stop_child", "tag", &tag)?;
        Ok(Directive::StopChild { tag, reason })
    }

    /// Fails on a negative delay
    pub fn schedule(delay_ms: i64, message: ScheduleMessage) -> Result<Self> {
        let delay_ms = u64::try_from(delay_ms)
            .map_err(|_| invalid("schedule", format!("delay_ms must be >= 0, got {}", delay_ms)))?;
        Ok(Directive::Schedule { delay_ms, message })
    }

    pub fn stop(reason: StopReason) -> Self {
        Directive::Stop { reason }
    }

    /// Fails when `cron_expr` does not parse
    pub fn cron(
        cron_expr: impl Into<String>,
        message: ScheduleMessage,
        job_id: Option<String>,
        timezone: Option<String>,
    ) -> Result<Self> {
        let cron_expr = cron_expr.into();
        require("cron", "cron_expr", &cron_expr)?;
        cron_parser::parse(&cron_expr, &chrono::Utc::now())
            .map_err(|e| invalid("cron", format!("cron_expr {:?}: {:?}", cron_expr, e)))?;
        if let Some(timezone) = &timezone {
            require("cron", "timezone", timezone)?;
        }
        Ok(Directive::Cron {
            cron_expr,
            message,
            job_id,
            timezone,
        })
    }

    pub fn cron_cancel(job_id: impl Into<String>) -> Result<Self> {
        let job_id = job_id.into();
        require("cron_cancel", "job_id", &job_id)?;
        Ok(Directive::CronCancel { job_id })
    }

    pub fn custom<D: ExtensionDirective + 'static>(directive: D) -> Self {
        Directive::Custom(CustomDirective::new(directive))
    }

    pub fn kind(&self) -> &str {
        match self {
            Directive::Emit { .. } => "emit",
            Directive::Error { .. } => "error",
            Directive::Spawn { .. } => "spawn",
            Directive::SpawnAgent { .. } => "spawn_agent",
            Directive::StopChild { .. } => "stop_child",
            Directive::Schedule { .. } => "schedule",
            Directive::Stop { .. } => "stop",
            Directive::Cron { .. } => "cron",
            Directive::CronCancel { .. } => "cron_cancel",
            Directive::Custom(custom) => custom.kind(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Directive::Error { .. })
    }

    /// JSON form, `kind` included. Extension kinds serialize through their payload.
    pub fn to_value(&self) -> Result<Value> {
        match self {
            Directive::Custom(custom) => {
                let mut fields = match custom.payload() {
                    Value::Object(map) => map,
                    Value::Null => Map::new(),
                    other => {
                        let mut map = Map::new();
                        map.insert("value".to_string(), other);
                        map
                    }
                };
                fields.insert("kind".to_string(), Value::String(custom.kind().to_string()));
                Ok(Value::Object(fields))
            }
            core => serde_json::to_value(core)
                .map_err(|e| invalid(core.kind(), e.to_string())),
        }
    }
}

type Decoder = Box<dyn Fn(&Value) -> Result<CustomDirective> + Send + Sync>;

/// Decodes directives from JSON, core kinds plus registered extensions
#[derive(Default)]
pub struct DirectiveRegistry {
    decoders: HashMap<String, Decoder>,
}

impl fmt::Debug for DirectiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl DirectiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder for an extension kind. Core kinds cannot be replaced.
    pub fn register<F>(&mut self, kind: impl Into<String>, decoder: F) -> Result<()>
    where
        F: Fn(&Value) -> Result<CustomDirective> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if CORE_KINDS.contains(&kind.as_str()) {
            return Err(invalid(&kind, "core kinds cannot be overridden"));
        }
        self.decoders.insert(kind, Box::new(decoder));
        Ok(())
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = CORE_KINDS.iter().map(|k| k.to_string()).collect();
        let mut extensions: Vec<String> = self.decoders.keys().cloned().collect();
        extensions.sort();
        kinds.extend(extensions);
        kinds
    }

    pub fn decode(&self, value: &Value) -> Result<Directive> {
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::InvalidFormat("directive without a kind".to_string()))?;

        if CORE_KINDS.contains(&kind) {
            return serde_json::from_value(value.clone()).map_err(|e| invalid(kind, e.to_string()));
        }

        match self.decoders.get(kind) {
            Some(decoder) => decoder(value).map(Directive::Custom),
            None => Err(AgentError::UnknownDirective(kind.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validating_constructors() {
        assert!(Directive::spawn_agent("", "worker").is_err());
        assert!(Directive::spawn_agent("billing", "").is_err());
        assert!(Directive::stop_child(" ", StopReason::Normal).is_err());
        assert!(Directive::schedule(-1, ScheduleMessage::StrategyTick).is_err());
        assert!(Directive::schedule(0, ScheduleMessage::StrategyTick).is_ok());
        assert!(Directive::cron_cancel("").is_err());
        assert!(Directive::spawn(Value::Null, None).is_err());
    }

    #[test]
    fn test_cron_expression_checked() {
        assert!(Directive::cron("*/5 * * * *", ScheduleMessage::StrategyTick, None, None).is_ok());
        let err = Directive::cron("every tuesday", ScheduleMessage::StrategyTick, None, None)
            .unwrap_err();
        assert!(err.to_string().contains("cron"));
    }

    #[test]
    fn test_kind_discriminators() {
        assert_eq!(Directive::stop(StopReason::Normal).kind(), "stop");
        assert_eq!(
            Directive::schedule(10, ScheduleMessage::StrategyTick)
                .unwrap()
                .kind(),
            "schedule"
        );
    }

    #[test]
    fn test_core_json_shape() {
        let directive = Directive::stop_child("worker-1", StopReason::default()).unwrap();
        assert_eq!(
            directive.to_value().unwrap(),
            json!({"kind": "stop_child", "tag": "worker-1", "reason": "normal"})
        );
    }

    #[test]
    fn test_defaults_on_decode() {
        let registry = DirectiveRegistry::new();
        let directive = registry.decode(&json!({"kind": "stop"})).unwrap();
        assert_eq!(directive, Directive::stop(StopReason::Normal));

        assert!(matches!(
            registry.decode(&json!({"kind": "teleport"})),
            Err(AgentError::UnknownDirective(_))
        ));
        assert!(registry.decode(&json!({"tag": "x"})).is_err());
    }
}
