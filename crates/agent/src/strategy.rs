//! The strategy contract and signal routing

use marshal_bus::Signal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::agent::Agent;
use crate::directive::Directive;
use crate::effect::Effect;
use crate::instruction::{ActionRef, Instruction};
use crate::schema::ParamSchema;

/// Reserved state key holding strategy bookkeeping
pub const STRATEGY_KEY: &str = "__strategy__";

/// What the runtime hands to every strategy call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyContext {
    pub agent_module: String,
    pub strategy_opts: Map<String, Value>,
}

impl StrategyContext {
    pub fn new(agent_module: impl Into<String>) -> Self {
        Self {
            agent_module: agent_module.into(),
            strategy_opts: Map::new(),
        }
    }

    pub fn with_opt(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.strategy_opts.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Idle,
    Running,
    Waiting,
    Success,
    Failure,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Success | Status::Failure)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Status::Running | Status::Waiting)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub status: Status,
    pub done: bool,
    pub result: Value,
    pub details: Map<String, Value>,
}

impl Snapshot {
    /// Read `status` and `result` from the reserved strategy key. Anything
    /// else stored there is reported as details.
    pub fn from_state(state: &Map<String, Value>) -> Self {
        let Some(Value::Object(strategy)) = state.get(STRATEGY_KEY) else {
            return Snapshot::default();
        };

        let status = strategy
            .get("status")
            .and_then(|s| serde_json::from_value(s.clone()).ok())
            .unwrap_or_default();
        let result = strategy.get("result").cloned().unwrap_or(Value::Null);
        let details = strategy
            .iter()
            .filter(|(k, _)| k.as_str() != "status" && k.as_str() != "result")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Snapshot {
            status,
            done: status.is_terminal(),
            result,
            details,
        }
    }
}

/// Per-action metadata a strategy may expose
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionSpec {
    pub schema: Option<ParamSchema>,
    pub doc: Option<String>,
    pub name: Option<String>,
}

/// What a matched signal turns into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum RouteTarget {
    /// Run `action` through `cmd` with the signal data as params
    StrategyCmd { action: ActionRef },
    StrategyTick,
    /// Opaque term handed back to the runtime
    Custom { term: Value },
}

type Predicate = Arc<dyn Fn(&Signal) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct SignalRoute {
    /// Dot-separated pattern; `*` matches one segment, `**` any number
    pub signal_type: String,
    pub target: RouteTarget,
    pub predicate: Option<Predicate>,
    pub priority: i32,
}

impl fmt::Debug for SignalRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalRoute")
            .field("signal_type", &self.signal_type)
            .field("target", &self.target)
            .field("predicate", &self.predicate.is_some())
            .field("priority", &self.priority)
            .finish()
    }
}

impl SignalRoute {
    pub fn new(signal_type: impl Into<String>, target: RouteTarget) -> Self {
        Self {
            signal_type: signal_type.into(),
            target,
            predicate: None,
            priority: 0,
        }
    }

    pub fn cmd(signal_type: impl Into<String>, action: impl Into<ActionRef>) -> Self {
        Self::new(
            signal_type,
            RouteTarget::StrategyCmd {
                action: action.into(),
            },
        )
    }

    pub fn tick(signal_type: impl Into<String>) -> Self {
        Self::new(signal_type, RouteTarget::StrategyTick)
    }

    pub fn custom(signal_type: impl Into<String>, term: Value) -> Self {
        Self::new(signal_type, RouteTarget::Custom { term })
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Signal) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn matches(&self, signal: &Signal) -> bool {
        type_matches(&self.signal_type, &signal.signal_type)
            && self.predicate.as_ref().map_or(true, |p| p(signal))
    }
}

/// Match a dot-separated signal type against a pattern
pub fn type_matches(pattern: &str, signal_type: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let segments: Vec<&str> = signal_type.split('.').collect();
    match_segments(&pattern, &segments)
}

fn match_segments(pattern: &[&str], segments: &[&str]) -> bool {
    match pattern.split_first() {
        None => segments.is_empty(),
        Some((&"**", rest)) => {
            (0..=segments.len()).any(|skip| match_segments(rest, &segments[skip..]))
        }
        Some((&head, rest)) => match segments.split_first() {
            Some((&segment, remaining)) => {
                (head == "*" || head == segment) && match_segments(rest, remaining)
            }
            None => false,
        },
    }
}

/// Highest-priority matching route; ties go to the earliest declared
pub fn route<'a>(routes: &'a [SignalRoute], signal: &Signal) -> Option<&'a SignalRoute> {
    let mut best: Option<&SignalRoute> = None;
    for candidate in routes.iter().filter(|r| r.matches(signal)) {
        match best {
            Some(current) if current.priority >= candidate.priority => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// How an agent turns instructions into state changes and directives.
///
/// Every call is a pure function of the agent snapshot it receives. The
/// runtime runs one cycle per agent at a time. Failures are reported as
/// [`Directive::Error`], never by panicking.
pub trait Strategy: Send + Sync {
    /// Execute instructions, returning the updated agent and raw effects
    fn cmd(
        &self,
        agent: Agent,
        instructions: Vec<Instruction>,
        ctx: &StrategyContext,
    ) -> (Agent, Vec<Effect>);

    /// May run twice (construction and runtime start); must be idempotent
    fn init(&self, agent: Agent, _ctx: &StrategyContext) -> (Agent, Vec<Directive>) {
        (agent, Vec::new())
    }

    /// Invoked when a scheduled strategy tick fires
    fn tick(&self, agent: Agent, _ctx: &StrategyContext) -> (Agent, Vec<Directive>) {
        (agent, Vec::new())
    }

    fn snapshot(&self, agent: &Agent, _ctx: &StrategyContext) -> Snapshot {
        Snapshot::from_state(&agent.state)
    }

    fn action_spec(&self, _action: &ActionRef) -> Option<ActionSpec> {
        None
    }

    fn signal_routes(&self, _ctx: &StrategyContext) -> Vec<SignalRoute> {
        Vec::new()
    }
}
