use thiserror::Error;
use udfkit_codegen::BuildError;
use udfkit_ir::ValueError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Function {name} is already registered with signature ({signature})")]
    RegistrationConflict { name: String, signature: String },

    #[error("Function not found: {name}({args})")]
    NotFound { name: String, args: String },

    #[error("Ambiguous call {name}({args}), candidates: {candidates}")]
    Ambiguous {
        name: String,
        args: String,
        candidates: String,
    },

    #[error("Type mismatch in {func}: {msg}")]
    TypeMismatch { func: String, msg: String },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Invalid definition of {name}: {msg}")]
    InvalidDefinition { name: String, msg: String },

    #[error("Alias {alias} refers to unknown function {target}")]
    UnknownAlias { alias: String, target: String },
}

/// Failure raised by a native function at run time
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("{func}: expected {expected} arguments, got {actual}")]
    Arity {
        func: String,
        expected: usize,
        actual: usize,
    },

    #[error("{func}: argument {index} is not a {expected}")]
    ArgumentType {
        func: String,
        index: usize,
        expected: String,
    },

    #[error("{func}: {msg}")]
    InvalidArgument { func: String, msg: String },

    #[error("{func}: opaque state is not a {layout}")]
    StateLayout { func: String, layout: String },

    #[error(transparent)]
    Value(#[from] ValueError),
}
