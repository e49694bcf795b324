//! Aggregate execution
//!
//! An [`AggregatePlan`] is compiled once per call site. Named and Expr
//! steps become resolved expression trees over `(state, inputs...)`,
//! CodeGen steps are emitted through the evaluator's builders and native
//! steps are called directly on the opaque container.

use std::fmt;
use tracing::{debug, trace};
use udfkit_ir::{DataType, Expr, TypeAttr, Value};
use udfkit_registry::udaf::{MergeFn, OutputFn, UpdateFn};
use udfkit_registry::{
    format_arg_types, AggregateDef, CodeGenDef, EvalError, MergeStep, OpaqueState, OutputStep,
    ParamKind, RegistryError, ResolveContext, StateInit, UdfLibrary, UpdateStep, Variant,
};

use crate::error::ExecError;
use crate::eval::Evaluator;

/// Running state of one aggregation group
pub enum AggregateState {
    Value(Value),
    Opaque(OpaqueState),
}

impl fmt::Debug for AggregateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateState::Value(v) => f.debug_tuple("Value").field(v).finish(),
            AggregateState::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

enum UpdatePlan<'a> {
    Eval(Expr),
    Emit { def: &'a CodeGenDef, label: String },
    Native(&'a UpdateFn),
}

enum MergePlan<'a> {
    Eval(Expr),
    Native(&'a MergeFn),
}

enum OutputPlan<'a> {
    Eval(Expr),
    Native(&'a OutputFn),
}

/// Structure of a type with nullability ignored at every level
fn shape(data_type: &DataType) -> DataType {
    match data_type {
        DataType::Tuple(fields) => DataType::Tuple(
            fields
                .iter()
                .map(|f| TypeAttr::new(shape(&f.data_type)))
                .collect(),
        ),
        other => other.clone(),
    }
}

pub struct AggregatePlan<'a> {
    name: String,
    evaluator: Evaluator<'a>,
    def: &'a AggregateDef,
    input_types: Vec<TypeAttr>,
    /// Inputs whose null value skips the row
    skip_null: Vec<bool>,
    update: UpdatePlan<'a>,
    merge: Option<MergePlan<'a>>,
    output: OutputPlan<'a>,
}

impl<'a> AggregatePlan<'a> {
    /// Resolves `name` over `input_types` and compiles its steps.
    ///
    /// Nullable inputs that only match non-null parameters are accepted;
    /// rows where such an input is null are skipped.
    pub fn compile(
        library: &'a UdfLibrary,
        name: &str,
        input_types: &[TypeAttr],
    ) -> Result<Self, ExecError> {
        let evaluator = Evaluator::new(library);
        let resolver = evaluator.resolver();
        let resolved = match resolver.resolve_types(name, input_types) {
            Ok(resolved) => resolved,
            Err(err @ RegistryError::NotFound { .. }) if input_types.iter().any(|t| t.nullable) => {
                let stripped: Vec<TypeAttr> = input_types
                    .iter()
                    .map(|t| t.clone().with_nullable(false))
                    .collect();
                resolver.resolve_types(name, &stripped).map_err(|_| err)?
            }
            Err(err) => return Err(err.into()),
        };
        let canonical = resolved.name.clone();
        let variant = resolved.variant;
        let Variant::Aggregate(def) = &variant.variant else {
            return Err(ExecError::NotAggregate(canonical));
        };

        let mut skip_null = Vec::with_capacity(input_types.len());
        let mut step_types = Vec::with_capacity(input_types.len());
        for (i, attr) in input_types.iter().enumerate() {
            let strict = variant
                .signature
                .params
                .get(i)
                .is_some_and(|p| !p.nullable && matches!(p.kind, ParamKind::Exact(_)));
            skip_null.push(strict && attr.nullable);
            step_types.push(attr.clone().with_nullable(attr.nullable && !strict));
        }

        let mut plan = AggregatePlan {
            name: canonical,
            evaluator,
            def,
            input_types: step_types,
            skip_null,
            update: UpdatePlan::Eval(Expr::literal(Value::Null)),
            merge: None,
            output: OutputPlan::Eval(Expr::literal(Value::Null)),
        };
        plan.update = plan.compile_update()?;
        plan.merge = plan.compile_merge()?;
        plan.output = plan.compile_output()?;

        debug!(
            aggregate = %plan.name,
            args = %format_arg_types(input_types),
            state = %def.state,
            output = %def.output,
            "compiled aggregate"
        );
        Ok(plan)
    }

    fn state_arg(&self, index: usize) -> Expr {
        Expr::arg(index, self.def.state.clone())
    }

    /// `(state, inputs...)` as argument expressions
    fn update_args(&self) -> Vec<Expr> {
        std::iter::once(self.state_arg(0))
            .chain(
                self.input_types
                    .iter()
                    .enumerate()
                    .map(|(i, t)| Expr::arg(i + 1, t.clone())),
            )
            .collect()
    }

    fn context(&self, args: &[Expr]) -> ResolveContext<'a> {
        let types = args.iter().filter_map(Expr::output_attr).collect();
        ResolveContext::new(self.evaluator.resolver().library(), &self.name, types)
    }

    fn check_type(&self, step: &str, expected: &TypeAttr, got: Option<TypeAttr>) -> Result<(), ExecError> {
        match got {
            Some(attr) if shape(&attr.data_type) == shape(&expected.data_type) => Ok(()),
            Some(attr) => Err(self.mismatch(format!(
                "{} yields {}, expected {}",
                step, attr, expected
            ))),
            None => Err(self.mismatch(format!("cannot infer the type of {}", step))),
        }
    }

    fn mismatch(&self, msg: String) -> ExecError {
        ExecError::StateMismatch {
            func: self.name.clone(),
            msg,
        }
    }

    fn resolve_call(&self, func: &str, args: Vec<Expr>) -> Result<Expr, ExecError> {
        Ok(self.evaluator.resolver().resolve_expr(&Expr::call(func, args))?)
    }

    fn compile_update(&self) -> Result<UpdatePlan<'a>, ExecError> {
        let def: &'a AggregateDef = self.def;
        let args = self.update_args();
        let plan = match &def.update {
            UpdateStep::Named(func) => UpdatePlan::Eval(self.resolve_call(func, args)?),
            UpdateStep::Expr(expand) => {
                let expanded = expand(&self.context(&args), &args)?;
                UpdatePlan::Eval(self.evaluator.resolver().resolve_expr(&expanded)?)
            }
            UpdateStep::CodeGen(codegen) => {
                let ctx = self.context(&args);
                let output = (codegen.infer)(&ctx, ctx.arg_types())?;
                self.check_type("update", &def.state, Some(output))?;
                return Ok(UpdatePlan::Emit {
                    def: codegen,
                    label: format!("{}({})", self.name, format_arg_types(ctx.arg_types())),
                });
            }
            UpdateStep::Native { func, .. } => return Ok(UpdatePlan::Native(func)),
        };
        if let UpdatePlan::Eval(expr) = &plan {
            self.check_type("update", &self.def.state, expr.output_attr())?;
        }
        Ok(plan)
    }

    fn compile_merge(&self) -> Result<Option<MergePlan<'a>>, ExecError> {
        let def: &'a AggregateDef = self.def;
        match &def.merge {
            None => Ok(None),
            Some(MergeStep::Named(func)) => {
                let expr = self.resolve_call(func, vec![self.state_arg(0), self.state_arg(1)])?;
                self.check_type("merge", &self.def.state, expr.output_attr())?;
                Ok(Some(MergePlan::Eval(expr)))
            }
            Some(MergeStep::Native { func, .. }) => Ok(Some(MergePlan::Native(func))),
        }
    }

    fn compile_output(&self) -> Result<OutputPlan<'a>, ExecError> {
        let def: &'a AggregateDef = self.def;
        let args = vec![self.state_arg(0)];
        let expr = match &def.finish {
            OutputStep::Named(func) => self.resolve_call(func, args)?,
            OutputStep::Expr(expand) => {
                let expanded = expand(&self.context(&args), &args)?;
                self.evaluator.resolver().resolve_expr(&expanded)?
            }
            OutputStep::Native { func, .. } => return Ok(OutputPlan::Native(func)),
        };
        self.check_type("output", &self.def.output, expr.output_attr())?;
        Ok(OutputPlan::Eval(expr))
    }

    /// Canonical name of the aggregate
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state_type(&self) -> &TypeAttr {
        &self.def.state
    }

    pub fn output_type(&self) -> &TypeAttr {
        &self.def.output
    }

    pub fn supports_merge(&self) -> bool {
        self.merge.is_some()
    }

    pub fn init(&self) -> AggregateState {
        match &self.def.init {
            StateInit::Const(value) => AggregateState::Value(value.clone()),
            StateInit::Native { func, .. } => AggregateState::Opaque(func()),
        }
    }

    /// Folds one row of inputs into `state`
    pub fn update(&self, state: &mut AggregateState, row: &[Value]) -> Result<(), ExecError> {
        if row.len() != self.input_types.len() {
            return Err(EvalError::Arity {
                func: self.name.clone(),
                expected: self.input_types.len(),
                actual: row.len(),
            }
            .into());
        }
        if row
            .iter()
            .zip(&self.skip_null)
            .any(|(value, skip)| *skip && value.is_null())
        {
            trace!(aggregate = %self.name, "skipping row with null input");
            return Ok(());
        }

        match (&self.update, state) {
            (UpdatePlan::Eval(expr), AggregateState::Value(current)) => {
                let args = self.with_state(current, row);
                *current = self.evaluator.eval_resolved(expr, &args)?;
            }
            (UpdatePlan::Emit { def, label }, AggregateState::Value(current)) => {
                let args = self.with_state(current, row);
                *current = self.evaluator.emit(def, label, args)?;
            }
            (UpdatePlan::Native(func), AggregateState::Opaque(container)) => func(container, row)?,
            (_, state) => return Err(self.mismatch(format!("unexpected state {:?}", state))),
        }
        Ok(())
    }

    fn with_state(&self, state: &Value, row: &[Value]) -> Vec<Value> {
        let mut args = Vec::with_capacity(row.len() + 1);
        args.push(state.clone());
        args.extend_from_slice(row);
        args
    }

    /// Combines `other` into `state`
    pub fn merge(&self, state: &mut AggregateState, other: AggregateState) -> Result<(), ExecError> {
        let Some(merge) = &self.merge else {
            return Err(ExecError::MergeUnsupported(self.name.clone()));
        };
        match (merge, state, other) {
            (MergePlan::Eval(expr), AggregateState::Value(current), AggregateState::Value(other)) => {
                let merged = self
                    .evaluator
                    .eval_resolved(expr, &[current.clone(), other])?;
                *current = merged;
            }
            (MergePlan::Native(func), AggregateState::Opaque(container), AggregateState::Opaque(other)) => {
                func(container, other)?
            }
            (_, state, other) => {
                return Err(self.mismatch(format!("cannot merge {:?} into {:?}", other, state)))
            }
        }
        Ok(())
    }

    /// Renders the result, consuming the state
    pub fn finish(&self, state: AggregateState) -> Result<Value, ExecError> {
        match (&self.output, state) {
            (OutputPlan::Eval(expr), AggregateState::Value(current)) => {
                self.evaluator.eval_resolved(expr, &[current])
            }
            (OutputPlan::Native(func), AggregateState::Opaque(container)) => Ok(func(container)?),
            (_, state) => Err(self.mismatch(format!("unexpected state {:?}", state))),
        }
    }

    pub fn accumulator(&self) -> Accumulator<'_, 'a> {
        Accumulator {
            plan: self,
            state: self.init(),
        }
    }

    /// Aggregates `rows` as a single group
    pub fn evaluate<R: AsRef<[Value]>>(&self, rows: &[R]) -> Result<Value, ExecError> {
        let mut acc = self.accumulator();
        for row in rows {
            acc.update(row.as_ref())?;
        }
        acc.output()
    }
}

/// One group's state bound to its plan
pub struct Accumulator<'p, 'a> {
    plan: &'p AggregatePlan<'a>,
    state: AggregateState,
}

impl<'p, 'a> Accumulator<'p, 'a> {
    pub fn update(&mut self, row: &[Value]) -> Result<(), ExecError> {
        self.plan.update(&mut self.state, row)
    }

    pub fn merge(&mut self, other: Accumulator<'_, '_>) -> Result<(), ExecError> {
        self.plan.merge(&mut self.state, other.state)
    }

    pub fn state(&self) -> &AggregateState {
        &self.state
    }

    pub fn output(self) -> Result<Value, ExecError> {
        self.plan.finish(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use udfkit_registry::default_library;

    fn t(data_type: DataType) -> TypeAttr {
        TypeAttr::new(data_type)
    }

    #[test]
    fn test_sum_skips_nulls_of_nullable_column() {
        let plan = AggregatePlan::compile(
            default_library(),
            "sum",
            &[TypeAttr::nullable(DataType::Int64)],
        )
        .unwrap();
        let rows = vec![
            vec![Value::Int64(1)],
            vec![Value::Null],
            vec![Value::Int64(4)],
        ];
        assert_eq!(plan.evaluate(&rows).unwrap(), Value::Int64(5));
        assert_eq!(plan.output_type(), &t(DataType::Int64));
    }

    #[test]
    fn test_scalar_function_is_not_an_aggregate() {
        let err = AggregatePlan::compile(default_library(), "sqrt", &[t(DataType::Double)])
            .err()
            .unwrap();
        assert!(matches!(err, ExecError::NotAggregate(name) if name == "sqrt"));
    }

    #[test]
    fn test_arity_is_checked_per_row() {
        let plan = AggregatePlan::compile(default_library(), "count", &[t(DataType::Int32)]).unwrap();
        let mut acc = plan.accumulator();
        assert!(matches!(
            acc.update(&[]),
            Err(ExecError::Eval(EvalError::Arity { expected: 1, actual: 0, .. }))
        ));
    }

    #[test]
    fn test_avg_of_empty_group_is_null() {
        let plan = AggregatePlan::compile(default_library(), "avg", &[t(DataType::Int32)]).unwrap();
        let rows: Vec<Vec<Value>> = vec![];
        assert_eq!(plan.evaluate(&rows).unwrap(), Value::Null);
    }
}
