//! Fold effects into agent state, keeping only directives for the runtime

use serde_json::{Map, Value};
use tracing::trace;

use crate::agent::Agent;
use crate::directive::Directive;
use crate::effect::Effect;
use crate::state_op::deep_merge;

/// Apply state ops left to right and collect directives in order.
/// State ops see the result of every earlier op and never appear in the output.
pub fn apply(mut agent: Agent, effects: Vec<Effect>) -> (Agent, Vec<Directive>) {
    let mut directives = Vec::new();

    for effect in effects {
        match effect {
            Effect::StateOp(op) => {
                trace!("◆ AGENT {} APPLY {:?}", agent.id, op);
                op.apply_to(&mut agent.state);
            }
            Effect::Directive(directive) => directives.push(directive),
        }
    }

    (agent, directives)
}

/// Deep-merge an action result into state, like `SetState`
pub fn apply_result(mut agent: Agent, result: Map<String, Value>) -> Agent {
    deep_merge(&mut agent.state, result);
    agent
}
