//! UDF and UDAF registry
//!
//! Functions are registered once into a [`UdfLibrary`], each name mapping to
//! a set of signatures bound to one of four variant kinds (External,
//! CodeGen, Expr, Aggregate). At compile time a [`Resolver`] picks the best
//! variant for the argument types seen at a call site and lowers the call.

pub mod builder;
pub mod builtin;
mod error;
mod global;
mod library;
mod resolve;
mod signature;
pub mod udaf;
mod variant;

pub use builder::{CodeGenFunction, CodeGenTemplate, ExternalTemplate, UdafTemplate};
pub use builtin::DefaultUdfLibrary;
pub use error::{EvalError, RegistryError};
pub use global::default_library;
pub use library::{FunctionDoc, FunctionEntry, SignatureDoc, UdfLibrary};
pub use resolve::{Lowering, ResolveContext, Resolved, Resolver};
pub use signature::{
    format_arg_types, AnyArg, ArgList, ArgSpec, Nullable, Opaque, Param, ParamKind, Signature,
    Tuple, TypeSpec,
};
pub use udaf::{AggregateDef, MergeStep, OpaqueState, OutputStep, StateInit, UpdateStep};
pub use variant::{
    native, native_fn, CodeGenDef, EmitFn, ExpandFn, ExprDef, ExternalDef, FunctionVariant,
    InferFn, NativeFn, Variant, VariantKind,
};
