//! Registration DSL
//!
//! Plain builders register one signature per `args` call. Template builders
//! take a generic definition and a closed list of types (`args_in::<(A, B,
//! ...)>()`); the definition is instantiated once per listed type and each
//! instantiation goes through the ordinary registration path under a symbol
//! derived from the type's name.

use std::sync::Arc;
use udfkit_codegen::{BuildStatus, CodeGenContext, NativeValue};
use udfkit_ir::{Expr, NativeType, TypeAttr};

use crate::error::RegistryError;
use crate::library::UdfLibrary;
use crate::resolve::ResolveContext;
use crate::signature::{ArgList, Param, ParamKind, Signature, TypeSpec};
use crate::udaf::UdafRegistryHelper;
use crate::variant::native::NativeFunction;
use crate::variant::{CodeGenDef, EmitFn, ExprDef, ExternalDef, InferFn, Variant};

fn symbol_suffix(params: &[Param]) -> String {
    let names: Vec<String> = params
        .iter()
        .map(|p| match &p.kind {
            ParamKind::Exact(t) => t.name(),
            ParamKind::Any => "any".to_string(),
        })
        .collect();
    names.join("_")
}

/// Output type that is fixed, becoming nullable when any argument is
fn fixed_output(returns: TypeAttr) -> InferFn {
    infer_fn(move |_ctx, args| {
        let nullable = returns.nullable || args.iter().any(|a| a.nullable);
        Ok(returns.clone().with_nullable(nullable))
    })
}

fn emit_fn<E>(emit: E) -> EmitFn
where
    E: Fn(&mut CodeGenContext<'_>, &[NativeValue]) -> Result<NativeValue, BuildStatus>
        + Send
        + Sync
        + 'static,
{
    Arc::new(emit)
}

fn infer_fn<I>(infer: I) -> InferFn
where
    I: Fn(&ResolveContext<'_>, &[TypeAttr]) -> Result<TypeAttr, RegistryError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(infer)
}

/// One instantiation step of a template over type `T`
pub trait Instantiate<T> {
    fn instantiate(&self, library: &mut UdfLibrary) -> Result<(), RegistryError>;
}

/// A closed list of types, spelled as a tuple
pub trait TypeSet<R> {
    fn instantiate_all(registrar: &R, library: &mut UdfLibrary) -> Result<(), RegistryError>;
}

macro_rules! type_set {
    ($($t:ident),+) => {
        impl<R, $($t),+> TypeSet<R> for ($($t,)+)
        where
            $(R: Instantiate<$t>,)+
        {
            fn instantiate_all(registrar: &R, library: &mut UdfLibrary) -> Result<(), RegistryError> {
                $(<R as Instantiate<$t>>::instantiate(registrar, library)?;)+
                Ok(())
            }
        }
    };
}

type_set!(T1);
type_set!(T1, T2);
type_set!(T1, T2, T3);
type_set!(T1, T2, T3, T4);
type_set!(T1, T2, T3, T4, T5);
type_set!(T1, T2, T3, T4, T5, T6);
type_set!(T1, T2, T3, T4, T5, T6, T7);
type_set!(T1, T2, T3, T4, T5, T6, T7, T8);
type_set!(T1, T2, T3, T4, T5, T6, T7, T8, T9);

// External

pub struct ExternalBuilder<'l> {
    library: &'l mut UdfLibrary,
    name: String,
    return_by_arg: bool,
}

impl<'l> ExternalBuilder<'l> {
    pub fn doc(self, doc: &str) -> Self {
        self.library.set_doc(&self.name, doc);
        self
    }

    pub fn return_by_arg(mut self, return_by_arg: bool) -> Self {
        self.return_by_arg = return_by_arg;
        self
    }

    /// Registers `f` under the parameter list `L`
    pub fn args<L: ArgList>(self, f: NativeFunction) -> Result<Self, RegistryError> {
        let params = L::params();
        if params.len() != f.params.len() {
            return Err(RegistryError::InvalidDefinition {
                name: self.name.clone(),
                msg: format!(
                    "{} declared parameters for a native function of arity {}",
                    params.len(),
                    f.params.len()
                ),
            });
        }
        let symbol = format!("{}.{}", self.name, symbol_suffix(&params));
        let returns = if params.iter().any(|p| p.nullable) {
            f.returns.with_nullable(true)
        } else {
            f.returns
        };
        self.library.insert(
            &self.name,
            Signature::new(params),
            Variant::External(ExternalDef {
                symbol,
                return_by_arg: self.return_by_arg,
                returns,
                func: f.func,
            }),
        )?;
        Ok(self)
    }
}

/// Generic native function, instantiated once per type
pub trait ExternalTemplate<T> {
    fn instantiate(&self) -> NativeFunction;
}

pub struct ExternalRegistrar<D> {
    def: D,
    name: String,
    return_by_arg: bool,
}

impl<T: NativeType, D: ExternalTemplate<T>> Instantiate<T> for ExternalRegistrar<D> {
    fn instantiate(&self, library: &mut UdfLibrary) -> Result<(), RegistryError> {
        let f = self.def.instantiate();
        library.insert(
            &self.name,
            Signature::new(f.params),
            Variant::External(ExternalDef {
                symbol: format!("{}.{}", self.name, T::type_name()),
                return_by_arg: self.return_by_arg,
                returns: f.returns,
                func: f.func,
            }),
        )
    }
}

pub struct ExternalTemplateBuilder<'l, D> {
    library: &'l mut UdfLibrary,
    name: String,
    def: D,
    return_by_arg: bool,
}

impl<'l, D> ExternalTemplateBuilder<'l, D> {
    pub fn doc(self, doc: &str) -> Self {
        self.library.set_doc(&self.name, doc);
        self
    }

    pub fn return_by_arg(mut self, return_by_arg: bool) -> Self {
        self.return_by_arg = return_by_arg;
        self
    }

    pub fn args_in<L>(self) -> Result<(), RegistryError>
    where
        L: TypeSet<ExternalRegistrar<D>>,
    {
        let registrar = ExternalRegistrar {
            def: self.def,
            name: self.name,
            return_by_arg: self.return_by_arg,
        };
        L::instantiate_all(&registrar, self.library)
    }
}

// CodeGen

pub struct CodeGenBuilder<'l> {
    library: &'l mut UdfLibrary,
    name: String,
    returns: Option<TypeAttr>,
}

impl<'l> CodeGenBuilder<'l> {
    pub fn doc(self, doc: &str) -> Self {
        self.library.set_doc(&self.name, doc);
        self
    }

    pub fn returns<R: TypeSpec>(mut self) -> Self {
        self.returns = Some(R::attr());
        self
    }

    fn register(self, signature: Signature, def: CodeGenDef) -> Result<Self, RegistryError> {
        self.library.insert(&self.name, signature, Variant::CodeGen(def))?;
        Ok(self)
    }

    /// Fixed output type set by `returns`
    pub fn args<L: ArgList>(
        self,
        emit: impl Fn(&mut CodeGenContext<'_>, &[NativeValue]) -> Result<NativeValue, BuildStatus>
            + Send
            + Sync
            + 'static,
    ) -> Result<Self, RegistryError> {
        let returns = self.returns.clone().ok_or_else(|| RegistryError::InvalidDefinition {
            name: self.name.clone(),
            msg: "codegen udf without infer needs returns".to_string(),
        })?;
        let def = CodeGenDef {
            infer: fixed_output(returns),
            emit: emit_fn(emit),
        };
        self.register(Signature::new(L::params()), def)
    }

    pub fn args_with_infer<L: ArgList>(
        self,
        infer: impl Fn(&ResolveContext<'_>, &[TypeAttr]) -> Result<TypeAttr, RegistryError>
            + Send
            + Sync
            + 'static,
        emit: impl Fn(&mut CodeGenContext<'_>, &[NativeValue]) -> Result<NativeValue, BuildStatus>
            + Send
            + Sync
            + 'static,
    ) -> Result<Self, RegistryError> {
        let def = CodeGenDef {
            infer: infer_fn(infer),
            emit: emit_fn(emit),
        };
        self.register(Signature::new(L::params()), def)
    }

    /// `L` are the leading parameters; any number of arguments may follow
    pub fn variadic_args<L: ArgList>(
        self,
        infer: impl Fn(&ResolveContext<'_>, &[TypeAttr]) -> Result<TypeAttr, RegistryError>
            + Send
            + Sync
            + 'static,
        emit: impl Fn(&mut CodeGenContext<'_>, &[NativeValue]) -> Result<NativeValue, BuildStatus>
            + Send
            + Sync
            + 'static,
    ) -> Result<Self, RegistryError> {
        let def = CodeGenDef {
            infer: infer_fn(infer),
            emit: emit_fn(emit),
        };
        self.register(Signature::variadic(L::params()), def)
    }
}

/// Inline code for one concrete type
pub struct CodeGenFunction {
    pub params: Vec<Param>,
    pub emit: EmitFn,
}

impl CodeGenFunction {
    pub fn new<L: ArgList>(
        emit: impl Fn(&mut CodeGenContext<'_>, &[NativeValue]) -> Result<NativeValue, BuildStatus>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            params: L::params(),
            emit: emit_fn(emit),
        }
    }
}

/// Generic inline-code definition, instantiated once per type
pub trait CodeGenTemplate<T> {
    fn instantiate(&self) -> CodeGenFunction;
}

pub struct CodeGenRegistrar<D> {
    def: D,
    name: String,
    returns: TypeAttr,
}

impl<T, D: CodeGenTemplate<T>> Instantiate<T> for CodeGenRegistrar<D> {
    fn instantiate(&self, library: &mut UdfLibrary) -> Result<(), RegistryError> {
        let f = self.def.instantiate();
        library.insert(
            &self.name,
            Signature::new(f.params),
            Variant::CodeGen(CodeGenDef {
                infer: fixed_output(self.returns.clone()),
                emit: f.emit,
            }),
        )
    }
}

pub struct CodeGenTemplateBuilder<'l, D> {
    library: &'l mut UdfLibrary,
    name: String,
    def: D,
    returns: Option<TypeAttr>,
}

impl<'l, D> CodeGenTemplateBuilder<'l, D> {
    pub fn doc(self, doc: &str) -> Self {
        self.library.set_doc(&self.name, doc);
        self
    }

    pub fn returns<R: TypeSpec>(mut self) -> Self {
        self.returns = Some(R::attr());
        self
    }

    pub fn args_in<L>(self) -> Result<(), RegistryError>
    where
        L: TypeSet<CodeGenRegistrar<D>>,
    {
        let Some(returns) = self.returns else {
            return Err(RegistryError::InvalidDefinition {
                name: self.name,
                msg: "codegen template needs returns".to_string(),
            });
        };
        let registrar = CodeGenRegistrar {
            def: self.def,
            name: self.name,
            returns,
        };
        L::instantiate_all(&registrar, self.library)
    }
}

// Expr

pub struct ExprBuilder<'l> {
    library: &'l mut UdfLibrary,
    name: String,
}

impl<'l> ExprBuilder<'l> {
    pub fn doc(self, doc: &str) -> Self {
        self.library.set_doc(&self.name, doc);
        self
    }

    fn register<F>(self, signature: Signature, expand: F) -> Result<Self, RegistryError>
    where
        F: Fn(&ResolveContext<'_>, &[Expr]) -> Result<Expr, RegistryError> + Send + Sync + 'static,
    {
        self.library.insert(
            &self.name,
            signature,
            Variant::Expr(ExprDef {
                expand: Arc::new(expand),
            }),
        )?;
        Ok(self)
    }

    pub fn args<L: ArgList>(
        self,
        expand: impl Fn(&ResolveContext<'_>, &[Expr]) -> Result<Expr, RegistryError>
            + Send
            + Sync
            + 'static,
    ) -> Result<Self, RegistryError> {
        self.register(Signature::new(L::params()), expand)
    }

    pub fn variadic_args<L: ArgList>(
        self,
        expand: impl Fn(&ResolveContext<'_>, &[Expr]) -> Result<Expr, RegistryError>
            + Send
            + Sync
            + 'static,
    ) -> Result<Self, RegistryError> {
        self.register(Signature::variadic(L::params()), expand)
    }
}

// UDAF

/// Generic aggregate definition, instantiated once per type
pub trait UdafTemplate<T> {
    fn define(&self, helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError>;
}

pub struct UdafRegistrar<D> {
    def: D,
    name: String,
}

impl<T, D: UdafTemplate<T>> Instantiate<T> for UdafRegistrar<D> {
    fn instantiate(&self, library: &mut UdfLibrary) -> Result<(), RegistryError> {
        let mut helper = UdafRegistryHelper::new(library, &self.name);
        self.def.define(&mut helper)
    }
}

pub struct UdafTemplateBuilder<'l, D> {
    library: &'l mut UdfLibrary,
    name: String,
    def: D,
}

impl<'l, D> UdafTemplateBuilder<'l, D> {
    pub fn doc(self, doc: &str) -> Self {
        self.library.set_doc(&self.name, doc);
        self
    }

    pub fn args_in<L>(self) -> Result<(), RegistryError>
    where
        L: TypeSet<UdafRegistrar<D>>,
    {
        let registrar = UdafRegistrar {
            def: self.def,
            name: self.name,
        };
        L::instantiate_all(&registrar, self.library)
    }
}

impl UdfLibrary {
    pub fn register_external(&mut self, name: &str) -> ExternalBuilder<'_> {
        ExternalBuilder {
            library: self,
            name: name.to_ascii_lowercase(),
            return_by_arg: false,
        }
    }

    pub fn register_external_template<D>(
        &mut self,
        name: &str,
        def: D,
    ) -> ExternalTemplateBuilder<'_, D> {
        ExternalTemplateBuilder {
            library: self,
            name: name.to_ascii_lowercase(),
            def,
            return_by_arg: false,
        }
    }

    pub fn register_codegen(&mut self, name: &str) -> CodeGenBuilder<'_> {
        CodeGenBuilder {
            library: self,
            name: name.to_ascii_lowercase(),
            returns: None,
        }
    }

    pub fn register_codegen_template<D>(
        &mut self,
        name: &str,
        def: D,
    ) -> CodeGenTemplateBuilder<'_, D> {
        CodeGenTemplateBuilder {
            library: self,
            name: name.to_ascii_lowercase(),
            def,
            returns: None,
        }
    }

    pub fn register_expr(&mut self, name: &str) -> ExprBuilder<'_> {
        ExprBuilder {
            library: self,
            name: name.to_ascii_lowercase(),
        }
    }

    pub fn register_udaf_template<D>(&mut self, name: &str, def: D) -> UdafTemplateBuilder<'_, D> {
        UdafTemplateBuilder {
            library: self,
            name: name.to_ascii_lowercase(),
            def,
        }
    }
}
