use crate::directive::Directive;
use crate::state_op::StateOp;

/// What a strategy or action returns: state changes mixed with directives
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StateOp(StateOp),
    Directive(Directive),
}

impl Effect {
    pub fn is_state_op(&self) -> bool {
        matches!(self, Effect::StateOp(_))
    }
}

impl From<StateOp> for Effect {
    fn from(op: StateOp) -> Self {
        Effect::StateOp(op)
    }
}

impl From<Directive> for Effect {
    fn from(directive: Directive) -> Self {
        Effect::Directive(directive)
    }
}
