//! udfkit Intermediate Representation
//!
//! Scalar types, runtime values and the expression tree shared by the
//! registry, the code builders and the evaluator. Everything here is
//! deterministically serializable so trees can be fingerprinted.

mod expr;
mod types;
mod value;

pub use expr::*;
pub use types::*;
pub use value::*;
