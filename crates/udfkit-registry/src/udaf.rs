//! Aggregate definitions: init, update, merge and output steps
//!
//! By-value states (scalars and tuples) start from a constant and are
//! replaced by the value each step returns, so their steps are ordinary
//! functions resolved by name or expressions built by expansion. Opaque
//! states are containers created by `init`, mutated in place by `update`
//! and `merge`, and consumed by `output`.

use std::any::Any;
use std::sync::Arc;
use udfkit_codegen::{BuildStatus, CodeGenContext, NativeValue};
use udfkit_container::Container;
use udfkit_ir::{DataType, Expr, TypeAttr, Value};

use crate::error::{EvalError, RegistryError};
use crate::library::UdfLibrary;
use crate::resolve::ResolveContext;
use crate::signature::{ArgList, Param, ParamKind, Signature, TypeSpec};
use crate::variant::{CodeGenDef, ExpandFn, InferFn, Variant};

/// Container state owned by one aggregation group
pub type OpaqueState = Box<dyn Any + Send>;

pub type InitFn = Arc<dyn Fn() -> OpaqueState + Send + Sync>;
pub type UpdateFn = Arc<dyn Fn(&mut OpaqueState, &[Value]) -> Result<(), EvalError> + Send + Sync>;
pub type MergeFn = Arc<dyn Fn(&mut OpaqueState, OpaqueState) -> Result<(), EvalError> + Send + Sync>;
pub type OutputFn = Arc<dyn Fn(OpaqueState) -> Result<Value, EvalError> + Send + Sync>;

fn update_fn<F>(f: F) -> UpdateFn
where
    F: Fn(&mut OpaqueState, &[Value]) -> Result<(), EvalError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn merge_fn<F>(f: F) -> MergeFn
where
    F: Fn(&mut OpaqueState, OpaqueState) -> Result<(), EvalError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn output_fn<F>(f: F) -> OutputFn
where
    F: Fn(OpaqueState) -> Result<Value, EvalError> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
pub enum StateInit {
    /// Initial by-value state baked into the plan
    Const(Value),
    Native { symbol: String, func: InitFn },
}

/// Update receives `(state, inputs...)`
#[derive(Clone)]
pub enum UpdateStep {
    /// Function resolved by name against `(state, inputs...)`
    Named(String),
    Expr(ExpandFn),
    CodeGen(CodeGenDef),
    Native { symbol: String, func: UpdateFn },
}

/// Merge receives two partial states
#[derive(Clone)]
pub enum MergeStep {
    Named(String),
    Native { symbol: String, func: MergeFn },
}

#[derive(Clone)]
pub enum OutputStep {
    Named(String),
    Expr(ExpandFn),
    Native { symbol: String, func: OutputFn },
}

#[derive(Clone)]
pub struct AggregateDef {
    pub state: TypeAttr,
    pub output: TypeAttr,
    pub init: StateInit,
    pub update: UpdateStep,
    /// Absent when partial states cannot be combined
    pub merge: Option<MergeStep>,
    pub finish: OutputStep,
}

impl AggregateDef {
    pub fn is_opaque(&self) -> bool {
        matches!(self.state.data_type, DataType::Opaque(_))
    }
}

fn downcast_mut<'s, C: Container>(
    state: &'s mut OpaqueState,
    func: &str,
) -> Result<&'s mut C, EvalError> {
    (**state)
        .downcast_mut::<C>()
        .ok_or_else(|| EvalError::StateLayout {
            func: func.to_string(),
            layout: C::layout_name(),
        })
}

fn downcast<C: Container>(state: OpaqueState, func: &str) -> Result<C, EvalError> {
    state
        .downcast::<C>()
        .map(|boxed| *boxed)
        .map_err(|_| EvalError::StateLayout {
            func: func.to_string(),
            layout: C::layout_name(),
        })
}

/// Handed to each instantiation of an aggregate template
pub struct UdafRegistryHelper<'l> {
    library: &'l mut UdfLibrary,
    name: String,
}

impl<'l> UdafRegistryHelper<'l> {
    pub(crate) fn new(library: &'l mut UdfLibrary, name: &str) -> Self {
        Self {
            library,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opens a definition with output `O`, state `S` and arguments `A`
    pub fn templates<O: TypeSpec, S: TypeSpec, A: ArgList>(&mut self) -> UdafBuilder<'_> {
        let state = S::attr();
        let params = A::params();
        let suffix = match &state.data_type {
            DataType::Opaque(layout) => format!("opaque_{}", layout),
            _ => {
                let names: Vec<String> = params
                    .iter()
                    .map(|p| match &p.kind {
                        ParamKind::Exact(t) => t.name(),
                        ParamKind::Any => "any".to_string(),
                    })
                    .collect();
                names.join("_")
            }
        };
        UdafBuilder {
            library: &mut *self.library,
            name: self.name.clone(),
            suffix,
            params,
            state,
            output: O::attr(),
            init: None,
            update: None,
            merge: None,
        }
    }
}

/// Fluent definition of one aggregate signature; the `output*` call
/// registers it.
pub struct UdafBuilder<'h> {
    library: &'h mut UdfLibrary,
    name: String,
    suffix: String,
    params: Vec<Param>,
    state: TypeAttr,
    output: TypeAttr,
    init: Option<StateInit>,
    update: Option<UpdateStep>,
    merge: Option<MergeStep>,
}

impl<'h> UdafBuilder<'h> {
    fn symbol(&self, base: &str) -> String {
        format!("{}.{}", base, self.suffix)
    }

    pub fn const_init(mut self, value: impl Into<Value>) -> Self {
        self.init = Some(StateInit::Const(value.into()));
        self
    }

    /// Default-constructs container `C` as the initial state
    pub fn init<C: Container>(mut self, symbol: &str) -> Self {
        let symbol = self.symbol(symbol);
        self.init = Some(StateInit::Native {
            symbol,
            func: Arc::new(|| Box::new(C::default()) as OpaqueState),
        });
        self
    }

    pub fn update(mut self, func: &str) -> Self {
        self.update = Some(UpdateStep::Named(func.to_string()));
        self
    }

    pub fn update_expr<F>(mut self, expand: F) -> Self
    where
        F: Fn(&ResolveContext<'_>, &[Expr]) -> Result<Expr, RegistryError> + Send + Sync + 'static,
    {
        self.update = Some(UpdateStep::Expr(Arc::new(expand)));
        self
    }

    pub fn update_codegen<I, E>(mut self, infer: I, emit: E) -> Self
    where
        I: Fn(&ResolveContext<'_>, &[TypeAttr]) -> Result<TypeAttr, RegistryError>
            + Send
            + Sync
            + 'static,
        E: Fn(&mut CodeGenContext<'_>, &[NativeValue]) -> Result<NativeValue, BuildStatus>
            + Send
            + Sync
            + 'static,
    {
        let infer: InferFn = Arc::new(infer);
        self.update = Some(UpdateStep::CodeGen(CodeGenDef {
            infer,
            emit: Arc::new(emit),
        }));
        self
    }

    /// In-place update of container `C` with the row's inputs
    pub fn update_native<C, F>(mut self, symbol: &str, f: F) -> Self
    where
        C: Container,
        F: Fn(&mut C, &[Value]) -> Result<(), EvalError> + Send + Sync + 'static,
    {
        let symbol = self.symbol(symbol);
        let func_name = symbol.clone();
        self.update = Some(UpdateStep::Native {
            symbol,
            func: update_fn(move |state, args| f(downcast_mut::<C>(state, &func_name)?, args)),
        });
        self
    }

    pub fn merge(mut self, func: &str) -> Self {
        self.merge = Some(MergeStep::Named(func.to_string()));
        self
    }

    pub fn merge_native<C, F>(mut self, symbol: &str, f: F) -> Self
    where
        C: Container,
        F: Fn(&mut C, C) -> Result<(), EvalError> + Send + Sync + 'static,
    {
        let symbol = self.symbol(symbol);
        let func_name = symbol.clone();
        self.merge = Some(MergeStep::Native {
            symbol,
            func: merge_fn(move |state, other| {
                let other = downcast::<C>(other, &func_name)?;
                f(downcast_mut::<C>(state, &func_name)?, other)
            }),
        });
        self
    }

    pub fn output(self, func: &str) -> Result<(), RegistryError> {
        self.register(OutputStep::Named(func.to_string()))
    }

    pub fn output_expr<F>(self, expand: F) -> Result<(), RegistryError>
    where
        F: Fn(&ResolveContext<'_>, &[Expr]) -> Result<Expr, RegistryError> + Send + Sync + 'static,
    {
        self.register(OutputStep::Expr(Arc::new(expand)))
    }

    /// Renders the result from container `C`, which is dropped afterwards
    pub fn output_native<C, F>(self, symbol: &str, f: F) -> Result<(), RegistryError>
    where
        C: Container,
        F: Fn(C) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        let symbol = self.symbol(symbol);
        let func_name = symbol.clone();
        self.register(OutputStep::Native {
            symbol,
            func: output_fn(move |state| f(downcast::<C>(state, &func_name)?)),
        })
    }

    fn invalid(&self, msg: &str) -> RegistryError {
        RegistryError::InvalidDefinition {
            name: self.name.clone(),
            msg: msg.to_string(),
        }
    }

    fn register(self, finish: OutputStep) -> Result<(), RegistryError> {
        let opaque = matches!(self.state.data_type, DataType::Opaque(_));
        let init = self.init.clone().ok_or_else(|| self.invalid("missing init"))?;
        let update = self.update.clone().ok_or_else(|| self.invalid("missing update"))?;

        let native_init = matches!(init, StateInit::Native { .. });
        if opaque != native_init {
            return Err(self.invalid("opaque states need a native init, by-value states a constant"));
        }
        let native_update = matches!(update, UpdateStep::Native { .. });
        let native_merge = matches!(self.merge, Some(MergeStep::Native { .. }));
        let native_output = matches!(finish, OutputStep::Native { .. });
        if opaque {
            let merge_ok = self.merge.is_none() || native_merge;
            if !(native_update && merge_ok && native_output) {
                return Err(self.invalid("opaque states need native update, merge and output steps"));
            }
        } else if native_update || native_merge || native_output {
            return Err(self.invalid("native steps operate on opaque states only"));
        }

        let def = AggregateDef {
            state: self.state,
            output: self.output,
            init,
            update,
            merge: self.merge,
            finish,
        };
        self.library.insert(
            &self.name,
            Signature::new(self.params),
            Variant::Aggregate(def),
        )
    }
}
