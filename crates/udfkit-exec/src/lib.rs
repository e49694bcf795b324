//! Reference execution of resolved UDF calls and aggregates
//!
//! Manages:
//! - Scalar evaluation of resolved expression trees
//! - Aggregate plans compiled from registered definitions
//! - Per-group state lifetime

mod aggregate;
mod error;
mod eval;
mod groups;

pub use aggregate::{Accumulator, AggregatePlan, AggregateState};
pub use error::ExecError;
pub use eval::Evaluator;
pub use groups::{GroupId, GroupStates};
