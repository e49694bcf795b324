//! Expression evaluator
//!
//! Evaluates resolved trees over positional argument values:
//! - External calls run their native function
//! - CodeGen calls emit through the IR builders, which must fold to a constant
//! - Expr-macro calls are resolved and expanded on the fly

use tracing::trace;
use udfkit_codegen::{BuildError, CodeGenContext, ConstantFolder, IrBuilders, NativeValue};
use udfkit_ir::{Expr, TypeAttr, Value, ValueError};
use udfkit_registry::{
    format_arg_types, CodeGenDef, Lowering, ParamKind, Resolver, UdfLibrary, Variant,
};

use crate::error::ExecError;

static FOLDER: ConstantFolder = ConstantFolder;

pub struct Evaluator<'a> {
    resolver: Resolver<'a>,
    builders: &'a dyn IrBuilders,
}

impl<'a> Evaluator<'a> {
    /// Evaluator folding CodeGen calls with [`ConstantFolder`]
    pub fn new(library: &'a UdfLibrary) -> Self {
        Self::with_builders(library, &FOLDER)
    }

    pub fn with_builders(library: &'a UdfLibrary, builders: &'a dyn IrBuilders) -> Self {
        Self {
            resolver: Resolver::new(library),
            builders,
        }
    }

    pub fn resolver(&self) -> &Resolver<'a> {
        &self.resolver
    }

    /// Resolves `expr`, then evaluates it
    pub fn eval(&self, expr: &Expr, args: &[Value]) -> Result<Value, ExecError> {
        let resolved = self.resolver.resolve_expr(expr)?;
        self.eval_resolved(&resolved, args)
    }

    /// Evaluates a tree returned by [`Resolver::resolve_expr`]
    pub fn eval_resolved(&self, expr: &Expr, args: &[Value]) -> Result<Value, ExecError> {
        match expr {
            Expr::Literal { value } => Ok(value.clone()),
            Expr::Arg { index, .. } => {
                args.get(*index)
                    .cloned()
                    .ok_or(ExecError::UnboundArgument {
                        index: *index,
                        len: args.len(),
                    })
            }
            Expr::Cast { to, expr } => Ok(self.eval_resolved(expr, args)?.cast(to)?),
            Expr::BinaryOp {
                op,
                left,
                right,
                output,
            } => {
                let l = self.eval_resolved(left, args)?;
                let r = self.eval_resolved(right, args)?;
                let value = l.binary(*op, &r)?;
                match output {
                    Some(attr) if !value.is_null() && value.data_type().as_ref() != Some(&attr.data_type) => {
                        Ok(value.cast(&attr.data_type)?)
                    }
                    _ => Ok(value),
                }
            }
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => {
                // null counts as false
                let taken = self.eval_resolved(cond, args)?.as_bool().unwrap_or(false);
                if taken {
                    self.eval_resolved(then, args)
                } else {
                    self.eval_resolved(otherwise, args)
                }
            }
            Expr::GetField { expr, index } => match self.eval_resolved(expr, args)? {
                Value::Null => Ok(Value::Null),
                Value::Tuple(fields) => fields.get(*index).cloned().ok_or_else(|| {
                    ExecError::Value(ValueError::InvalidCast {
                        from: format!("tuple of {}", fields.len()),
                        to: format!("field {}", index),
                    })
                }),
                other => Err(ExecError::Value(ValueError::InvalidCast {
                    from: other.to_string(),
                    to: "tuple".to_string(),
                })),
            },
            Expr::Call { func, args: arg_exprs, .. } => self.call(func, arg_exprs, args),
        }
    }

    fn call(&self, func: &str, arg_exprs: &[Expr], args: &[Value]) -> Result<Value, ExecError> {
        let resolved = self.resolver.resolve(func, arg_exprs)?;
        if let Lowering::Expand(expanded) = &resolved.lowering {
            return self.eval_resolved(expanded, args);
        }

        let values = arg_exprs
            .iter()
            .map(|e| self.eval_resolved(e, args))
            .collect::<Result<Vec<_>, _>>()?;

        match &resolved.variant.variant {
            Variant::External(def) => {
                let params = &resolved.variant.signature.params;
                let null_to_strict = params.iter().zip(&values).any(|(param, value)| {
                    value.is_null() && !param.nullable && matches!(param.kind, ParamKind::Exact(_))
                });
                if null_to_strict {
                    return Ok(Value::Null);
                }
                trace!(symbol = %def.symbol, "calling native udf");
                Ok((def.func)(&values)?)
            }
            Variant::CodeGen(def) => {
                let types: Vec<TypeAttr> = arg_exprs.iter().filter_map(Expr::output_attr).collect();
                let label = format!("{}({})", resolved.name, format_arg_types(&types));
                self.emit(def, &label, values)
            }
            Variant::Aggregate(_) => Err(ExecError::AggregateInScalar(resolved.name)),
            Variant::Expr(_) => Err(ExecError::StateMismatch {
                func: resolved.name,
                msg: "expression macro was not expanded".to_string(),
            }),
        }
    }

    /// Runs an emit function over materialized values
    pub(crate) fn emit(
        &self,
        def: &CodeGenDef,
        label: &str,
        values: Vec<Value>,
    ) -> Result<Value, ExecError> {
        let mut ctx = CodeGenContext::new(self.builders);
        let natives: Vec<NativeValue> = values.into_iter().map(NativeValue::from).collect();
        let built = (def.emit)(&mut ctx, &natives).map_err(|status| BuildError::udf(label, status))?;
        built.into_value().ok_or_else(|| ExecError::NonConstant {
            func: label.to_string(),
        })
    }
}
