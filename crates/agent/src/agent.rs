//! Agent identity and the instruction cycle

use marshal_bus::Signal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::apply::apply;
use crate::directive::{Directive, ErrorContext, ErrorInfo};
use crate::instruction::Opts;
use crate::normalize::{InstructionInput, Normalizer};
use crate::strategy::{route, RouteTarget, Snapshot, Strategy, StrategyContext, STRATEGY_KEY};

/// A stateful entity whose state changes only through state ops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: Map<String, Value>,
}

/// Result of offering a signal to an agent
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// A route ran `cmd` or `tick`
    Handled(Agent, Vec<Directive>),
    /// A custom route matched; the term is the runtime's to interpret
    Custom(Agent, Value),
    /// No route matched
    Unrouted(Agent),
}

impl Agent {
    /// Create an agent with a fresh id and empty state
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            state: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_state(mut self, state: Map<String, Value>) -> Self {
        self.state = state;
        self
    }

    /// Strategy bookkeeping kept under the reserved state key
    pub fn strategy_state(&self) -> Option<&Map<String, Value>> {
        self.state.get(STRATEGY_KEY).and_then(Value::as_object)
    }

    pub fn snapshot(&self, strategy: &dyn Strategy, ctx: &StrategyContext) -> Snapshot {
        strategy.snapshot(self, ctx)
    }

    /// One instruction cycle: normalize, run the strategy, apply state ops.
    pub fn cmd(
        self,
        strategy: &dyn Strategy,
        input: impl Into<InstructionInput>,
        ctx: &StrategyContext,
    ) -> (Agent, Vec<Directive>) {
        let normalizer = Normalizer::new().with_strategy(strategy);
        self.cmd_with(strategy, &normalizer, input, ctx)
    }

    /// As [`Agent::cmd`] with explicit normalizer settings. Input that fails
    /// to normalize leaves the agent untouched and yields a single error
    /// directive.
    pub fn cmd_with(
        self,
        strategy: &dyn Strategy,
        normalizer: &Normalizer<'_>,
        input: impl Into<InstructionInput>,
        ctx: &StrategyContext,
    ) -> (Agent, Vec<Directive>) {
        let instructions = match normalizer.normalize(input, &Map::new(), &Opts::new()) {
            Ok(instructions) => instructions,
            Err(err) => {
                warn!("◆ AGENT {} REJECTED INPUT: {}", self.id, err);
                let directive = Directive::error(ErrorInfo::from(&err), Some(ErrorContext::Normalize));
                return (self, vec![directive]);
            }
        };

        debug!(
            "◆ AGENT {} CYCLE WITH {} INSTRUCTIONS",
            self.id,
            instructions.len()
        );
        let (agent, effects) = strategy.cmd(self, instructions, ctx);
        apply(agent, effects)
    }

    /// Route an inbound signal through the strategy's signal routes
    pub fn handle_signal(
        self,
        strategy: &dyn Strategy,
        signal: &Signal,
        ctx: &StrategyContext,
    ) -> Routed {
        let routes = strategy.signal_routes(ctx);
        let Some(matched) = route(&routes, signal) else {
            debug!("◆ AGENT {} NO ROUTE FOR {}", self.id, signal.signal_type);
            return Routed::Unrouted(self);
        };

        match &matched.target {
            RouteTarget::StrategyCmd { action } => {
                let params = match &signal.data {
                    Value::Object(map) => map.clone(),
                    Value::Null => Map::new(),
                    other => {
                        let mut map = Map::new();
                        map.insert("data".to_string(), other.clone());
                        map
                    }
                };
                let mut context = Map::new();
                context.insert("signal_id".to_string(), Value::String(signal.id.clone()));
                context.insert(
                    "signal_type".to_string(),
                    Value::String(signal.signal_type.clone()),
                );
                context.insert(
                    "signal_source".to_string(),
                    Value::String(signal.source.clone()),
                );

                let input = InstructionInput::WithContext(action.clone(), params, context);
                let (agent, directives) = self.cmd(strategy, input, ctx);
                Routed::Handled(agent, directives)
            }
            RouteTarget::StrategyTick => {
                let (agent, directives) = strategy.tick(self, ctx);
                Routed::Handled(agent, directives)
            }
            RouteTarget::Custom { term } => Routed::Custom(self, term.clone()),
        }
    }
}
