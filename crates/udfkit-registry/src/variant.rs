//! The four variant kinds a signature can be bound to

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use udfkit_codegen::{BuildStatus, CodeGenContext, NativeValue};
use udfkit_ir::{Expr, TypeAttr, Value};

use crate::error::{EvalError, RegistryError};
use crate::resolve::ResolveContext;
use crate::signature::Signature;
use crate::udaf::AggregateDef;

/// Compiled native body, called with materialized arguments
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// Output type and nullability from argument attributes
pub type InferFn =
    Arc<dyn Fn(&ResolveContext<'_>, &[TypeAttr]) -> Result<TypeAttr, RegistryError> + Send + Sync>;

/// Inline code emission over already-built arguments
pub type EmitFn =
    Arc<dyn Fn(&mut CodeGenContext<'_>, &[NativeValue]) -> Result<NativeValue, BuildStatus> + Send + Sync>;

/// Rewrites the argument expressions into a replacement subtree
pub type ExpandFn =
    Arc<dyn Fn(&ResolveContext<'_>, &[Expr]) -> Result<Expr, RegistryError> + Send + Sync>;

pub fn native_fn<F>(f: F) -> NativeFn
where
    F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
pub struct ExternalDef {
    pub symbol: String,
    /// Result is written through a trailing out-parameter
    pub return_by_arg: bool,
    pub returns: TypeAttr,
    pub func: NativeFn,
}

#[derive(Clone)]
pub struct CodeGenDef {
    pub infer: InferFn,
    pub emit: EmitFn,
}

#[derive(Clone)]
pub struct ExprDef {
    pub expand: ExpandFn,
}

#[derive(Clone)]
pub enum Variant {
    External(ExternalDef),
    CodeGen(CodeGenDef),
    Expr(ExprDef),
    Aggregate(AggregateDef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantKind {
    External,
    CodeGen,
    Expr,
    Aggregate,
}

impl Variant {
    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::External(_) => VariantKind::External,
            Variant::CodeGen(_) => VariantKind::CodeGen,
            Variant::Expr(_) => VariantKind::Expr,
            Variant::Aggregate(_) => VariantKind::Aggregate,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self {
            Variant::External(def) => Some(&def.symbol),
            _ => None,
        }
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::External(def) => f
                .debug_struct("External")
                .field("symbol", &def.symbol)
                .field("return_by_arg", &def.return_by_arg)
                .field("returns", &def.returns)
                .finish(),
            Variant::CodeGen(_) => f.write_str("CodeGen"),
            Variant::Expr(_) => f.write_str("Expr"),
            Variant::Aggregate(def) => f
                .debug_struct("Aggregate")
                .field("state", &def.state)
                .field("output", &def.output)
                .finish(),
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariantKind::External => "external",
            VariantKind::CodeGen => "codegen",
            VariantKind::Expr => "expr",
            VariantKind::Aggregate => "aggregate",
        };
        f.write_str(name)
    }
}

/// A registered signature together with its implementation
#[derive(Debug, Clone)]
pub struct FunctionVariant {
    pub signature: Signature,
    pub variant: Variant,
}

/// Adapters turning typed Rust functions into [`NativeFn`]s
pub mod native {
    use super::*;
    use crate::signature::{ArgSpec, Param, TypeSpec};
    use udfkit_ir::NativeType;

    /// Native body plus the parameter list derived from its Rust types
    #[derive(Clone)]
    pub struct NativeFunction {
        pub params: Vec<Param>,
        pub returns: TypeAttr,
        pub func: NativeFn,
    }

    impl NativeFunction {
        /// Accepts nullable arguments. A null argument still yields null.
        pub fn nullable(mut self) -> Self {
            for param in &mut self.params {
                param.nullable = true;
            }
            self.returns.nullable = true;
            self
        }
    }

    fn arg<T: NativeType>(args: &[Value], index: usize) -> Result<T, EvalError> {
        args.get(index)
            .and_then(T::from_value)
            .ok_or_else(|| EvalError::ArgumentType {
                func: "native".to_string(),
                index,
                expected: T::type_name().to_string(),
            })
    }

    fn check_arity(args: &[Value], expected: usize) -> Result<(), EvalError> {
        if args.len() != expected {
            return Err(EvalError::Arity {
                func: "native".to_string(),
                expected,
                actual: args.len(),
            });
        }
        Ok(())
    }

    pub fn unary<A, R, F>(f: F) -> NativeFunction
    where
        A: NativeType + TypeSpec,
        R: NativeType + TypeSpec,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        NativeFunction {
            params: vec![A::param()],
            returns: R::attr(),
            func: native_fn(move |args| {
                check_arity(args, 1)?;
                if args[0].is_null() {
                    return Ok(Value::Null);
                }
                Ok(f(arg(args, 0)?).into_value())
            }),
        }
    }

    pub fn binary<A, B, R, F>(f: F) -> NativeFunction
    where
        A: NativeType + TypeSpec,
        B: NativeType + TypeSpec,
        R: NativeType + TypeSpec,
        F: Fn(A, B) -> R + Send + Sync + 'static,
    {
        NativeFunction {
            params: vec![A::param(), B::param()],
            returns: R::attr(),
            func: native_fn(move |args| {
                check_arity(args, 2)?;
                if args.iter().any(Value::is_null) {
                    return Ok(Value::Null);
                }
                Ok(f(arg(args, 0)?, arg(args, 1)?).into_value())
            }),
        }
    }

    /// Like [`binary`] for bodies that can fail on valid input types
    pub fn try_binary<A, B, R, F>(f: F) -> NativeFunction
    where
        A: NativeType + TypeSpec,
        B: NativeType + TypeSpec,
        R: NativeType + TypeSpec,
        F: Fn(A, B) -> Result<R, EvalError> + Send + Sync + 'static,
    {
        NativeFunction {
            params: vec![A::param(), B::param()],
            returns: R::attr(),
            func: native_fn(move |args| {
                check_arity(args, 2)?;
                if args.iter().any(Value::is_null) {
                    return Ok(Value::Null);
                }
                Ok(f(arg(args, 0)?, arg(args, 1)?)?.into_value())
            }),
        }
    }

    pub fn ternary<A, B, C, R, F>(f: F) -> NativeFunction
    where
        A: NativeType + TypeSpec,
        B: NativeType + TypeSpec,
        C: NativeType + TypeSpec,
        R: NativeType + TypeSpec,
        F: Fn(A, B, C) -> R + Send + Sync + 'static,
    {
        NativeFunction {
            params: vec![A::param(), B::param(), C::param()],
            returns: R::attr(),
            func: native_fn(move |args| {
                check_arity(args, 3)?;
                if args.iter().any(Value::is_null) {
                    return Ok(Value::Null);
                }
                Ok(f(arg(args, 0)?, arg(args, 1)?, arg(args, 2)?).into_value())
            }),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_binary_propagates_null() {
            let max = binary(|a: i64, b: i64| a.max(b));
            assert_eq!((max.func)(&[Value::Int64(3), Value::Int64(9)]).unwrap(), Value::Int64(9));
            assert_eq!((max.func)(&[Value::Null, Value::Int64(9)]).unwrap(), Value::Null);
            assert!(matches!(
                (max.func)(&[Value::Int64(3)]),
                Err(EvalError::Arity { expected: 2, actual: 1, .. })
            ));
        }

        #[test]
        fn test_nullable_marks_every_param() {
            let sqrt = unary(f64::sqrt).nullable();
            assert!(sqrt.params.iter().all(|p| p.nullable));
            assert!(sqrt.returns.nullable);
            assert!(matches!(
                (sqrt.func)(&[Value::String("x".into())]),
                Err(EvalError::ArgumentType { index: 0, .. })
            ));
        }
    }
}
