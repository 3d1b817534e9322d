//! Turn shorthand input into canonical instructions
//!
//! Accepted shapes are a bare action, an action with params, with params and
//! context, with params, context and opts, a built [`Instruction`], or a flat
//! list of those. A list nested inside a list is rejected outright. Lists
//! normalize element by element and stop at the first failure, so a caller
//! gets either every instruction or none.

use marshal_config::{ContextPrecedence, NormalizerConfig};
use serde_json::{Map, Value};
use tracing::debug;

use crate::action::ActionRegistry;
use crate::instruction::{ActionRef, Instruction, Opts};
use crate::strategy::Strategy;
use crate::{AgentError, Result};

/// Shorthand accepted by [`normalize`]
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionInput {
    Action(ActionRef),
    WithParams(ActionRef, Map<String, Value>),
    WithContext(ActionRef, Map<String, Value>, Map<String, Value>),
    WithOpts(ActionRef, Map<String, Value>, Map<String, Value>, Opts),
    Instruction(Instruction),
    List(Vec<InstructionInput>),
}

impl InstructionInput {
    pub fn is_list(&self) -> bool {
        matches!(self, InstructionInput::List(_))
    }
}

impl From<&str> for InstructionInput {
    fn from(action: &str) -> Self {
        InstructionInput::Action(action.into())
    }
}

impl From<String> for InstructionInput {
    fn from(action: String) -> Self {
        InstructionInput::Action(action.into())
    }
}

impl From<ActionRef> for InstructionInput {
    fn from(action: ActionRef) -> Self {
        InstructionInput::Action(action)
    }
}

impl From<Instruction> for InstructionInput {
    fn from(instruction: Instruction) -> Self {
        InstructionInput::Instruction(instruction)
    }
}

impl<A: Into<ActionRef>> From<(A, Map<String, Value>)> for InstructionInput {
    fn from((action, params): (A, Map<String, Value>)) -> Self {
        InstructionInput::WithParams(action.into(), params)
    }
}

impl<A: Into<ActionRef>> From<(A, Map<String, Value>, Map<String, Value>)> for InstructionInput {
    fn from((action, params, context): (A, Map<String, Value>, Map<String, Value>)) -> Self {
        InstructionInput::WithContext(action.into(), params, context)
    }
}

impl<A: Into<ActionRef>> From<(A, Map<String, Value>, Map<String, Value>, Opts)>
    for InstructionInput
{
    fn from(
        (action, params, context, opts): (A, Map<String, Value>, Map<String, Value>, Opts),
    ) -> Self {
        InstructionInput::WithOpts(action.into(), params, context, opts)
    }
}

impl<T: Into<InstructionInput>> From<Vec<T>> for InstructionInput {
    fn from(items: Vec<T>) -> Self {
        InstructionInput::List(items.into_iter().map(Into::into).collect())
    }
}

fn object_field(value: &Value, field: &str) -> Result<Map<String, Value>> {
    match value.get(field) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(AgentError::InvalidFormat(format!(
            "{} must be a map, got {}",
            field, other
        ))),
    }
}

/// JSON form: a string is an action, an object carries `action` plus
/// optional `params`, `context`, `opts` and `id`, an array is a list.
impl TryFrom<Value> for InstructionInput {
    type Error = AgentError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::String(action) => Ok(InstructionInput::Action(action.into())),
            Value::Array(items) => items
                .into_iter()
                .map(InstructionInput::try_from)
                .collect::<Result<Vec<_>>>()
                .map(InstructionInput::List),
            Value::Object(_) => {
                let action = value
                    .get("action")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        AgentError::InvalidFormat("instruction object needs an action".to_string())
                    })?;
                let params = object_field(&value, "params")?;
                let context = object_field(&value, "context")?;
                let opts = Opts::from_value(value.get("opts").unwrap_or(&Value::Null))?;

                match value.get("id").and_then(Value::as_str) {
                    Some(id) => Ok(InstructionInput::Instruction(
                        Instruction::new(action)?
                            .with_id(id)
                            .with_params(params)
                            .with_context(context)
                            .with_opts(opts),
                    )),
                    None => Ok(InstructionInput::WithOpts(
                        action.into(),
                        params,
                        context,
                        opts,
                    )),
                }
            }
            other => Err(AgentError::InvalidFormat(format!(
                "cannot build an instruction from {}",
                other
            ))),
        }
    }
}

/// Normalization settings: context precedence, plus optional action
/// resolution and per-action param schemas
#[derive(Clone, Copy, Default)]
pub struct Normalizer<'a> {
    precedence: ContextPrecedence,
    actions: Option<&'a ActionRegistry>,
    strategy: Option<&'a dyn Strategy>,
}

impl From<&NormalizerConfig> for Normalizer<'_> {
    fn from(config: &NormalizerConfig) -> Self {
        Self::new().with_precedence(config.context_precedence)
    }
}

impl<'a> Normalizer<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings from the `normalizer` section of a loaded config
    pub fn from_config(config: &marshal_config::Config) -> Self {
        Self::from(&config.normalizer)
    }

    pub fn with_precedence(mut self, precedence: ContextPrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    /// Reject actions the registry does not know
    pub fn with_actions(mut self, actions: &'a ActionRegistry) -> Self {
        self.actions = Some(actions);
        self
    }

    /// Coerce params against the strategy's action specs
    pub fn with_strategy(mut self, strategy: &'a dyn Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn precedence(&self) -> ContextPrecedence {
        self.precedence
    }

    pub fn normalize(
        &self,
        input: impl Into<InstructionInput>,
        context: &Map<String, Value>,
        opts: &Opts,
    ) -> Result<Vec<Instruction>> {
        match input.into() {
            InstructionInput::List(items) => {
                if items.iter().any(InstructionInput::is_list) {
                    return Err(AgentError::InvalidFormat(
                        "nested instruction lists are not allowed".to_string(),
                    ));
                }
                let instructions = items
                    .into_iter()
                    .map(|item| self.normalize_item(item, context, opts))
                    .collect::<Result<Vec<_>>>()?;
                debug!("◆ NORMALIZED {} INSTRUCTIONS", instructions.len());
                Ok(instructions)
            }
            single => Ok(vec![self.normalize_item(single, context, opts)?]),
        }
    }

    /// Exactly one instruction; list input is rejected
    pub fn normalize_single(
        &self,
        input: impl Into<InstructionInput>,
        context: &Map<String, Value>,
        opts: &Opts,
    ) -> Result<Instruction> {
        let input = input.into();
        if input.is_list() {
            return Err(AgentError::InvalidFormat(
                "expected a single instruction, got a list".to_string(),
            ));
        }

        let mut instructions = self.normalize(input, context, opts)?;
        match instructions.len() {
            1 => Ok(instructions.remove(0)),
            n => Err(AgentError::InvalidFormat(format!(
                "expected exactly one instruction, got {}",
                n
            ))),
        }
    }

    fn normalize_item(
        &self,
        input: InstructionInput,
        shared_context: &Map<String, Value>,
        shared_opts: &Opts,
    ) -> Result<Instruction> {
        let (instruction, item_context, item_opts) = match input {
            InstructionInput::Action(action) => (Instruction::new(action)?, None, Opts::new()),
            InstructionInput::WithParams(action, params) => (
                Instruction::new(action)?.with_params(params),
                None,
                Opts::new(),
            ),
            InstructionInput::WithContext(action, params, context) => (
                Instruction::new(action)?.with_params(params),
                Some(context),
                Opts::new(),
            ),
            InstructionInput::WithOpts(action, params, context, opts) => (
                Instruction::new(action)?.with_params(params),
                Some(context),
                opts,
            ),
            InstructionInput::Instruction(mut instruction) => {
                if !instruction.action.is_valid() {
                    return Err(AgentError::InvalidAction(instruction.action.to_string()));
                }
                let context = std::mem::take(&mut instruction.context);
                let opts = std::mem::take(&mut instruction.opts);
                (instruction, Some(context), opts)
            }
            InstructionInput::List(_) => {
                return Err(AgentError::InvalidFormat(
                    "nested instruction lists are not allowed".to_string(),
                ))
            }
        };

        let context = match item_context {
            Some(item) => self.merge_context(item, shared_context),
            None => shared_context.clone(),
        };
        let mut opts = item_opts;
        opts.merge(shared_opts);

        let instruction = instruction.with_context(context).with_opts(opts);
        self.resolve(instruction)
    }

    fn merge_context(
        &self,
        item: Map<String, Value>,
        shared: &Map<String, Value>,
    ) -> Map<String, Value> {
        match self.precedence {
            ContextPrecedence::SharedWins => {
                let mut merged = item;
                merged.extend(shared.iter().map(|(k, v)| (k.clone(), v.clone())));
                merged
            }
            ContextPrecedence::ItemWins => {
                let mut merged = shared.clone();
                merged.extend(item);
                merged
            }
        }
    }

    /// Check the action exists and normalize params against its schema
    fn resolve(&self, mut instruction: Instruction) -> Result<Instruction> {
        if let Some(actions) = self.actions {
            if !actions.has(instruction.action.as_str()) {
                return Err(AgentError::UnknownAction(instruction.action.to_string()));
            }
        }

        let schema = self
            .strategy
            .and_then(|strategy| strategy.action_spec(&instruction.action))
            .and_then(|spec| spec.schema)
            .or_else(|| {
                self.actions
                    .and_then(|actions| actions.get(instruction.action.as_str()))
                    .and_then(|action| action.schema())
            });

        if let Some(schema) = schema {
            let params = std::mem::take(&mut instruction.params);
            instruction.params = schema.normalize(instruction.action.as_str(), params)?;
        }
        Ok(instruction)
    }
}

/// Normalize with default settings
pub fn normalize(
    input: impl Into<InstructionInput>,
    context: &Map<String, Value>,
    opts: &Opts,
) -> Result<Vec<Instruction>> {
    Normalizer::new().normalize(input, context, opts)
}

/// Normalize exactly one instruction with default settings
pub fn normalize_single(
    input: impl Into<InstructionInput>,
    context: &Map<String, Value>,
    opts: &Opts,
) -> Result<Instruction> {
    Normalizer::new().normalize_single(input, context, opts)
}
