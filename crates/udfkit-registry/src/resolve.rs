//! Call-site resolution and Expr-macro expansion
//!
//! Resolution is a pure rewrite: [`Resolver::resolve_expr`] returns a new
//! tree where every Expr-macro call has been replaced by its expansion and
//! every remaining call carries the canonical function name and its output
//! type. Resolving an already resolved tree yields the same tree.

use std::cell::RefCell;
use tracing::debug;
use udfkit_ir::{DataType, Expr, TypeAttr};

use crate::error::RegistryError;
use crate::library::UdfLibrary;
use crate::signature::format_arg_types;
use crate::variant::{FunctionVariant, Variant};

/// What expansion and inference callbacks see of the call being resolved
pub struct ResolveContext<'a> {
    library: &'a UdfLibrary,
    func: String,
    args: Vec<TypeAttr>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(library: &'a UdfLibrary, func: &str, args: Vec<TypeAttr>) -> Self {
        Self {
            library,
            func: func.to_string(),
            args,
        }
    }

    pub fn library(&self) -> &'a UdfLibrary {
        self.library
    }

    pub fn func_name(&self) -> &str {
        &self.func
    }

    pub fn arg_types(&self) -> &[TypeAttr] {
        &self.args
    }

    pub fn arg_type(&self, index: usize) -> Option<&TypeAttr> {
        self.args.get(index)
    }

    /// Error reported for this call site
    pub fn error(&self, msg: impl Into<String>) -> RegistryError {
        RegistryError::TypeMismatch {
            func: self.func.clone(),
            msg: msg.into(),
        }
    }
}

/// How a resolved call is lowered
#[derive(Debug, Clone)]
pub enum Lowering {
    CallNative { symbol: String, return_by_arg: bool },
    EmitInline,
    /// Replacement subtree, already resolved
    Expand(Expr),
    Aggregate,
}

#[derive(Debug, Clone)]
pub struct Resolved<'a> {
    /// Canonical function name
    pub name: String,
    pub variant: &'a FunctionVariant,
    pub output: TypeAttr,
    pub lowering: Lowering,
}

pub struct Resolver<'a> {
    library: &'a UdfLibrary,
    /// Expr-macro calls currently being expanded
    expanding: RefCell<Vec<(String, Vec<TypeAttr>)>>,
}

impl<'a> Resolver<'a> {
    pub fn new(library: &'a UdfLibrary) -> Self {
        Self {
            library,
            expanding: RefCell::new(Vec::new()),
        }
    }

    pub fn library(&self) -> &'a UdfLibrary {
        self.library
    }

    /// Resolves a call whose arguments are already resolved expressions
    pub fn resolve(&self, name: &str, args: &[Expr]) -> Result<Resolved<'a>, RegistryError> {
        let canonical = self.library.canonical_name(name);
        let types = args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                arg.output_attr().ok_or_else(|| RegistryError::TypeMismatch {
                    func: canonical.clone(),
                    msg: format!("cannot infer the type of argument {}", i),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let variant = self.library.lookup(&canonical, &types)?;
        let ctx = ResolveContext::new(self.library, &canonical, types.clone());

        let (output, lowering) = match &variant.variant {
            Variant::External(def) => (
                def.returns.clone(),
                Lowering::CallNative {
                    symbol: def.symbol.clone(),
                    return_by_arg: def.return_by_arg,
                },
            ),
            Variant::CodeGen(def) => ((def.infer)(&ctx, &types)?, Lowering::EmitInline),
            Variant::Expr(def) => {
                let expanded = self.expand(&canonical, &types, || (def.expand)(&ctx, args))?;
                let output = expanded
                    .output_attr()
                    .ok_or_else(|| ctx.error("expansion has no output type"))?;
                (output, Lowering::Expand(expanded))
            }
            Variant::Aggregate(def) => (def.output.clone(), Lowering::Aggregate),
        };

        debug!(
            function = %canonical,
            args = %format_arg_types(&types),
            kind = %variant.variant.kind(),
            output = %output,
            "resolved udf"
        );
        Ok(Resolved {
            name: canonical,
            variant,
            output,
            lowering,
        })
    }

    /// Resolves a call with positional arguments of the given types
    pub fn resolve_types(
        &self,
        name: &str,
        types: &[TypeAttr],
    ) -> Result<Resolved<'a>, RegistryError> {
        let args: Vec<Expr> = types
            .iter()
            .enumerate()
            .map(|(i, t)| Expr::arg(i, t.clone()))
            .collect();
        self.resolve(name, &args)
    }

    /// Runs one expansion and resolves its result, refusing to re-enter a
    /// call that is already being expanded.
    fn expand(
        &self,
        name: &str,
        types: &[TypeAttr],
        expand: impl FnOnce() -> Result<Expr, RegistryError>,
    ) -> Result<Expr, RegistryError> {
        let key = (name.to_string(), types.to_vec());
        if self.expanding.borrow().contains(&key) {
            return Err(RegistryError::NotFound {
                name: name.to_string(),
                args: format_arg_types(types),
            });
        }
        self.expanding.borrow_mut().push(key);
        let result = expand().and_then(|expr| self.resolve_expr(&expr));
        self.expanding.borrow_mut().pop();
        result
    }

    pub fn resolve_expr(&self, expr: &Expr) -> Result<Expr, RegistryError> {
        match expr {
            Expr::Literal { .. } | Expr::Arg { .. } => Ok(expr.clone()),
            Expr::Cast { to, expr } => Ok(Expr::cast(self.resolve_expr(expr)?, to.clone())),
            Expr::BinaryOp {
                op,
                left,
                right,
                output,
            } => {
                let node = Expr::BinaryOp {
                    op: *op,
                    left: Box::new(self.resolve_expr(left)?),
                    right: Box::new(self.resolve_expr(right)?),
                    output: output.clone(),
                };
                let attr = node.output_attr().ok_or_else(|| RegistryError::TypeMismatch {
                    func: op.symbol().to_string(),
                    msg: format!("operands do not combine in {}", node),
                })?;
                Ok(node.with_output(attr))
            }
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.resolve_expr(cond)?;
                if let Some(attr) = cond.output_attr() {
                    if attr.data_type != DataType::Bool {
                        return Err(RegistryError::TypeMismatch {
                            func: "if".to_string(),
                            msg: format!("condition must be bool, got {}", attr),
                        });
                    }
                }
                Ok(Expr::cond(
                    cond,
                    self.resolve_expr(then)?,
                    self.resolve_expr(otherwise)?,
                ))
            }
            Expr::GetField { expr, index } => {
                let node = Expr::get_field(self.resolve_expr(expr)?, *index);
                if node.output_attr().is_none() {
                    return Err(RegistryError::TypeMismatch {
                        func: "get_field".to_string(),
                        msg: format!("no field {} in {}", index, node),
                    });
                }
                Ok(node)
            }
            Expr::Call { func, args, .. } => {
                let args = args
                    .iter()
                    .map(|arg| self.resolve_expr(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let resolved = self.resolve(func, &args)?;
                match resolved.lowering {
                    Lowering::Expand(expanded) => Ok(expanded),
                    _ => Ok(Expr::Call {
                        func: resolved.name,
                        args,
                        output: Some(resolved.output),
                    }),
                }
            }
        }
    }
}
