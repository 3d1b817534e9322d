//! Agent core
//!
//! An [`Agent`] is plain data. Input is normalized into [`Instruction`]s, a
//! [`Strategy`] turns them into [`Effect`]s, and the applier folds state ops
//! into the agent while handing [`Directive`]s back for the runtime to
//! interpret. Nothing in this crate performs I/O.

use thiserror::Error;

pub mod action;
pub mod agent;
pub mod apply;
pub mod direct;
pub mod directive;
pub mod effect;
pub mod instruction;
pub mod normalize;
pub mod schema;
pub mod state_op;
pub mod strategy;

pub use action::{Action, ActionContext, ActionError, ActionOutput, ActionRegistry, FnAction};
pub use agent::{Agent, Routed};
pub use apply::{apply, apply_result};
pub use direct::Direct;
pub use directive::{
    CustomDirective, Directive, DirectiveRegistry, ErrorContext, ErrorInfo, ExtensionDirective,
    ScheduleMessage, StopReason,
};
pub use effect::Effect;
pub use instruction::{ActionRef, Instruction, Opts};
pub use marshal_config::ContextPrecedence;
pub use normalize::{normalize, normalize_single, InstructionInput, Normalizer};
pub use schema::{FieldSpec, FieldType, ParamSchema};
pub use state_op::{deep_merge, StateOp};
pub use strategy::{
    route, type_matches, ActionSpec, RouteTarget, SignalRoute, Snapshot, Status, Strategy,
    StrategyContext, STRATEGY_KEY,
};

/// Agent errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("◆ MALFORMED INPUT: {0}")]
    InvalidFormat(String),

    #[error("◆ INVALID ACTION: {0:?}")]
    InvalidAction(String),

    #[error("◆ ACTION NOT FOUND: {0}")]
    UnknownAction(String),

    #[error("◆ UNKNOWN FIELD {field} FOR {action}")]
    UnknownField { action: String, field: String },

    #[error("◆ INVALID PARAM {field} FOR {action}: {reason}")]
    InvalidParam {
        action: String,
        field: String,
        reason: String,
    },

    #[error("◆ MISSING PARAM {field} FOR {action}")]
    MissingParam { action: String, field: String },

    #[error("◆ INVALID {kind} DIRECTIVE: {reason}")]
    InvalidDirective { kind: String, reason: String },

    #[error("◆ UNKNOWN DIRECTIVE: {0}")]
    UnknownDirective(String),
}

impl AgentError {
    /// Stable identifier carried in error directives
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::InvalidFormat(_) => "invalid_format",
            AgentError::InvalidAction(_) => "invalid_action",
            AgentError::UnknownAction(_) => "unknown_action",
            AgentError::UnknownField { .. } => "unknown_field",
            AgentError::InvalidParam { .. } => "invalid_param",
            AgentError::MissingParam { .. } => "missing_param",
            AgentError::InvalidDirective { .. } => "invalid_directive",
            AgentError::UnknownDirective(_) => "unknown_directive",
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
