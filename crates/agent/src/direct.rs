//! Sequential execution of instructions against an action registry

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::action::{ActionContext, ActionRegistry};
use crate::agent::Agent;
use crate::apply::{apply, apply_result};
use crate::directive::{Directive, ErrorContext, ErrorInfo};
use crate::effect::Effect;
use crate::instruction::{ActionRef, Instruction};
use crate::state_op::StateOp;
use crate::strategy::{ActionSpec, SignalRoute, Status, Strategy, StrategyContext, STRATEGY_KEY};
use crate::AgentError;

/// Runs each instruction in order. Results merge into state as they arrive,
/// so later actions see earlier ones. The first failure stops the batch.
#[derive(Debug, Clone, Default)]
pub struct Direct {
    actions: ActionRegistry,
    routes: Vec<SignalRoute>,
}

impl Direct {
    pub fn new(actions: ActionRegistry) -> Self {
        Self {
            actions,
            routes: Vec::new(),
        }
    }

    pub fn with_route(mut self, route: SignalRoute) -> Self {
        self.routes.push(route);
        self
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    fn status_ops(status: Status, result: Value, error: Option<&ErrorInfo>) -> Vec<Effect> {
        let mut ops: Vec<Effect> = vec![
            StateOp::set_path([STRATEGY_KEY, "status"], json!(status)).into(),
            StateOp::set_path([STRATEGY_KEY, "result"], result).into(),
        ];
        match error {
            Some(error) => ops.push(StateOp::set_path([STRATEGY_KEY, "error"], json!(error)).into()),
            None => ops.push(StateOp::delete_path([STRATEGY_KEY, "error"]).into()),
        }
        ops
    }

    fn failure(instruction: &Instruction, error: ErrorInfo) -> ErrorInfo {
        error.with_details(json!({
            "action": instruction.action.as_str(),
            "instruction_id": instruction.id,
        }))
    }
}

impl Strategy for Direct {
    fn cmd(
        &self,
        mut agent: Agent,
        instructions: Vec<Instruction>,
        _ctx: &StrategyContext,
    ) -> (Agent, Vec<Effect>) {
        let mut effects: Vec<Effect> = Vec::new();
        let mut last_result = Value::Null;

        for instruction in instructions {
            let Some(action) = self.actions.get(instruction.action.as_str()) else {
                let err = AgentError::UnknownAction(instruction.action.to_string());
                warn!("◆ AGENT {} {}", agent.id, err);
                let info = Self::failure(&instruction, ErrorInfo::from(&err));
                effects.push(Directive::error(info.clone(), Some(ErrorContext::Instruction)).into());
                effects.extend(Self::status_ops(Status::Failure, Value::Null, Some(&info)));
                return (agent, effects);
            };

            debug!("◆ AGENT {} RUNNING {}", agent.id, instruction.action);
            let outcome = {
                let ctx = ActionContext {
                    agent_id: &agent.id,
                    state: &agent.state,
                    context: &instruction.context,
                    opts: &instruction.opts,
                };
                action.run(&instruction.params, &ctx)
            };

            match outcome {
                Ok(output) => {
                    agent = apply_result(agent, output.result.clone());
                    let (next, directives) = apply(agent, output.effects);
                    agent = next;
                    effects.extend(directives.into_iter().map(Effect::Directive));
                    last_result = Value::Object(output.result);
                }
                Err(err) => {
                    warn!("◆ AGENT {} ACTION {} FAILED: {}", agent.id, instruction.action, err);
                    let info = Self::failure(
                        &instruction,
                        ErrorInfo::new(err.kind(), err.to_string()),
                    );
                    effects.push(
                        Directive::error(info.clone(), Some(ErrorContext::Instruction)).into(),
                    );
                    effects.extend(Self::status_ops(Status::Failure, Value::Null, Some(&info)));
                    return (agent, effects);
                }
            }
        }

        effects.extend(Self::status_ops(Status::Success, last_result, None));
        (agent, effects)
    }

    fn init(&self, mut agent: Agent, _ctx: &StrategyContext) -> (Agent, Vec<Directive>) {
        if !agent.state.contains_key(STRATEGY_KEY) {
            let mut bookkeeping = Map::new();
            bookkeeping.insert("status".to_string(), json!(Status::Idle));
            agent
                .state
                .insert(STRATEGY_KEY.to_string(), Value::Object(bookkeeping));
        }
        (agent, Vec::new())
    }

    fn action_spec(&self, action: &ActionRef) -> Option<ActionSpec> {
        self.actions.get(action.as_str()).map(|registered| ActionSpec {
            schema: registered.schema(),
            doc: Some(registered.description().to_string()).filter(|d| !d.is_empty()),
            name: Some(registered.name().to_string()),
        })
    }

    fn signal_routes(&self, _ctx: &StrategyContext) -> Vec<SignalRoute> {
        self.routes.clone()
    }
}
