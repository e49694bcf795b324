use thiserror::Error;
use udfkit_codegen::BuildError;
use udfkit_ir::ValueError;
use udfkit_registry::{EvalError, RegistryError};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Value error: {0}")]
    Value(#[from] ValueError),

    #[error("Aggregate state of group {0} was already released")]
    StateReleased(usize),

    #[error("Aggregate {0} cannot merge partial states")]
    MergeUnsupported(String),

    #[error("{0} is not an aggregate")]
    NotAggregate(String),

    #[error("Aggregate {0} used in scalar position")]
    AggregateInScalar(String),

    #[error("{func} produced a value only known at run time")]
    NonConstant { func: String },

    #[error("State mismatch in {func}: {msg}")]
    StateMismatch { func: String, msg: String },

    #[error("Argument {index} is not bound ({len} arguments)")]
    UnboundArgument { index: usize, len: usize },
}
