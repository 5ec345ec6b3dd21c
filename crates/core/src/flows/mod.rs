pub mod engine;
pub mod states;

pub use engine::{open_gate, verify_chain, ApprovalStateMachine, ChainInvariantViolation, DecisionError};
pub use states::{DecisionAction, DecisionOutcome};
