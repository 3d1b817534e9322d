//! Executable actions and their registry

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::effect::Effect;
use crate::instruction::Opts;
use crate::schema::ParamSchema;

/// Failures reported by an action
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("◆ ACTION FAILED: {0}")]
    Failed(String),

    #[error("◆ ACTION REJECTED PARAMS: {0}")]
    InvalidParams(String),

    #[error("◆ ACTION HALTED: {0}")]
    Halted(String),
}

impl ActionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ActionError::Failed(_) => "action_failed",
            ActionError::InvalidParams(_) => "invalid_params",
            ActionError::Halted(_) => "halted",
        }
    }
}

/// What an action sees while it runs
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub agent_id: &'a str,
    pub state: &'a Map<String, Value>,
    pub context: &'a Map<String, Value>,
    pub opts: &'a Opts,
}

/// Result map merged into state, plus effects for the applier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutput {
    pub result: Map<String, Value>,
    pub effects: Vec<Effect>,
}

impl ActionOutput {
    pub fn new(result: Map<String, Value>) -> Self {
        Self {
            result,
            effects: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_effect(mut self, effect: impl Into<Effect>) -> Self {
        self.effects.push(effect.into());
        self
    }
}

/// A synchronous unit of work
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Declared params, used to normalize instructions before `run`
    fn schema(&self) -> Option<ParamSchema> {
        None
    }

    fn run(
        &self,
        params: &Map<String, Value>,
        ctx: &ActionContext<'_>,
    ) -> Result<ActionOutput, ActionError>;
}

type ActionFnBody =
    dyn Fn(&Map<String, Value>, &ActionContext<'_>) -> Result<ActionOutput, ActionError> + Send + Sync;

/// Action backed by a closure
pub struct FnAction {
    name: String,
    description: String,
    schema: Option<ParamSchema>,
    body: Box<ActionFnBody>,
}

impl FnAction {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Map<String, Value>, &ActionContext<'_>) -> Result<ActionOutput, ActionError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            schema: None,
            body: Box::new(body),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_schema(mut self, schema: ParamSchema) -> Self {
        self.schema = Some(schema);
        self
    }
}

impl fmt::Debug for FnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction").field("name", &self.name).finish()
    }
}

impl Action for FnAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> Option<ParamSchema> {
        self.schema.clone()
    }

    fn run(
        &self,
        params: &Map<String, Value>,
        ctx: &ActionContext<'_>,
    ) -> Result<ActionOutput, ActionError> {
        (self.body)(params, ctx)
    }
}

/// Actions keyed by name
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<A: Action + 'static>(&mut self, action: A) {
        let name = action.name().to_string();
        self.actions.insert(name, Arc::new(action));
    }

    pub fn with<A: Action + 'static>(mut self, action: A) -> Self {
        self.register(action);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Action>> {
        self.actions.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx<'a>(state: &'a Map<String, Value>, opts: &'a Opts) -> ActionContext<'a> {
        ActionContext {
            agent_id: "agent-1",
            state,
            context: state,
            opts,
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ActionRegistry::new()
            .with(FnAction::new("b", |_, _| Ok(ActionOutput::empty())))
            .with(FnAction::new("a", |_, _| Ok(ActionOutput::empty())));

        assert!(registry.has("a"));
        assert!(!registry.has("c"));
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_fn_action_runs() {
        let action = FnAction::new("double", |params, _| {
            let n = params.get("n").and_then(Value::as_i64).unwrap_or(0);
            Ok(ActionOutput::new(
                json!({"doubled": n * 2}).as_object().cloned().unwrap_or_default(),
            ))
        });

        let state = Map::new();
        let opts = Opts::new();
        let params = json!({"n": 21}).as_object().cloned().unwrap();
        let output = action.run(&params, &ctx(&state, &opts)).unwrap();
        assert_eq!(output.result["doubled"], json!(42));
    }
}
