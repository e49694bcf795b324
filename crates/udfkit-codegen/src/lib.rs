//! Code generation contracts for inline UDFs
//!
//! CodeGen functions never build instructions themselves. They receive
//! already-built argument values and delegate to IR builder services
//! (timestamp, date, string, arithmetic) reached through a [`CodeGenContext`].
//! [`ConstantFolder`] is the reference builder: it folds materialized
//! constants and rejects raw build-time handles.

mod builder;
mod fold;
mod native;

pub use builder::*;
pub use fold::ConstantFolder;
pub use native::NativeValue;

use thiserror::Error;

/// Failure message reported by a builder operation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{msg}")]
pub struct BuildStatus {
    pub msg: String,
}

impl BuildStatus {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    /// `func` is the function name with its argument types, e.g. `hour(int64)`
    #[error("Fail to build udf {func}: {cause}")]
    Udf { func: String, cause: String },

    #[error(transparent)]
    Status(#[from] BuildStatus),
}

impl BuildError {
    pub fn udf(func: impl Into<String>, status: BuildStatus) -> Self {
        BuildError::Udf {
            func: func.into(),
            cause: status.msg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_message() {
        let err = BuildError::udf("hour(int64)", BuildStatus::new("bad input"));
        assert_eq!(err.to_string(), "Fail to build udf hour(int64): bad input");
    }
}
