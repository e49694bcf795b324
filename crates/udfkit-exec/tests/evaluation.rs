//! Scalar evaluation and build failure reporting

use udfkit_codegen::{
    ArithmeticIrBuilder, BlockId, BuildResult, BuildStatus, ConstantFolder, DateIrBuilder,
    IrBuilders, NativeValue, StringIrBuilder, TimestampIrBuilder,
};
use udfkit_exec::{Evaluator, ExecError};
use udfkit_ir::{DataType, Date, Expr, TypeAttr, Value};
use udfkit_registry::default_library;

/// Folds like [`ConstantFolder`] except that every time-of-day request fails
/// and string concatenation yields a run-time handle
struct BrokenClock {
    folder: ConstantFolder,
}

impl TimestampIrBuilder for BrokenClock {
    fn hour(&self, _block: BlockId, _time: &NativeValue) -> BuildResult {
        Err(BuildStatus::new("clock unavailable"))
    }

    fn minute(&self, _block: BlockId, _time: &NativeValue) -> BuildResult {
        Err(BuildStatus::new("clock unavailable"))
    }

    fn second(&self, _block: BlockId, _time: &NativeValue) -> BuildResult {
        Err(BuildStatus::new("clock unavailable"))
    }
}

impl StringIrBuilder for BrokenClock {
    fn concat(&self, _block: BlockId, _parts: &[NativeValue]) -> BuildResult {
        Ok(NativeValue::raw(0, TypeAttr::new(DataType::Varchar)))
    }

    fn concat_ws(&self, block: BlockId, sep: &NativeValue, parts: &[NativeValue]) -> BuildResult {
        self.folder.concat_ws(block, sep, parts)
    }
}

impl IrBuilders for BrokenClock {
    fn timestamp(&self) -> &dyn TimestampIrBuilder {
        self
    }

    fn date(&self) -> &dyn DateIrBuilder {
        &self.folder
    }

    fn string(&self) -> &dyn StringIrBuilder {
        self
    }

    fn arithmetic(&self) -> &dyn ArithmeticIrBuilder {
        &self.folder
    }
}

fn arg(index: usize, data_type: DataType) -> Expr {
    Expr::arg(index, TypeAttr::new(data_type))
}

#[test]
fn test_build_failure_names_the_function() {
    let builders = BrokenClock {
        folder: ConstantFolder::new(),
    };
    let evaluator = Evaluator::with_builders(default_library(), &builders);
    let expr = Expr::call("hour", vec![arg(0, DataType::Int64)]);
    let err = evaluator
        .eval(&expr, &[Value::Int64(0)])
        .expect_err("hour should fail to build");
    assert!(matches!(err, ExecError::Build(_)));
    assert_eq!(
        err.to_string(),
        "Fail to build udf hour(int64): clock unavailable"
    );

    // other builder services keep working
    let year = Expr::call("year", vec![arg(0, DataType::Date)]);
    let date = Value::Date(Date::from_ymd(2024, 2, 29).unwrap());
    assert_eq!(evaluator.eval(&year, &[date]).unwrap(), Value::Int32(2024));
}

#[test]
fn test_run_time_handle_is_not_a_constant() {
    let builders = BrokenClock {
        folder: ConstantFolder::new(),
    };
    let evaluator = Evaluator::with_builders(default_library(), &builders);
    let expr = Expr::call("concat", vec![arg(0, DataType::Varchar), arg(1, DataType::Varchar)]);
    let err = evaluator
        .eval(&expr, &[Value::from("a"), Value::from("b")])
        .expect_err("concat should not fold");
    assert!(matches!(err, ExecError::NonConstant { ref func } if func == "concat(string, string)"));
}

#[test]
fn test_default_folding() {
    let evaluator = Evaluator::new(default_library());
    let concat = Expr::call(
        "concat_ws",
        vec![
            Expr::literal("-"),
            arg(0, DataType::Varchar),
            arg(1, DataType::Int32),
        ],
    );
    assert_eq!(
        evaluator
            .eval(&concat, &[Value::from("a"), Value::Int32(7)])
            .expect("concat_ws should succeed"),
        Value::from("a-7")
    );

    let nested = Expr::call(
        "round",
        vec![Expr::call("log", vec![Expr::literal(2i64), arg(0, DataType::Int64)])],
    );
    assert_eq!(
        evaluator
            .eval(&nested, &[Value::Int64(1024)])
            .expect("round(log(..)) should succeed"),
        Value::Double(10.0)
    );
}

#[test]
fn test_null_into_strict_external_is_null() {
    let evaluator = Evaluator::new(default_library());
    let strict = Expr::call(
        "minimum",
        vec![arg(0, DataType::Int64), arg(1, DataType::Int64)],
    );
    assert_eq!(
        evaluator
            .eval(&strict, &[Value::Int64(4), Value::Int64(-1)])
            .unwrap(),
        Value::Int64(-1)
    );
    assert_eq!(
        evaluator
            .eval(&strict, &[Value::Null, Value::Int64(-1)])
            .unwrap(),
        Value::Null
    );

    // a nullable argument never reaches a non-null parameter
    let nullable = Expr::call(
        "minimum",
        vec![
            Expr::arg(0, TypeAttr::nullable(DataType::Int64)),
            arg(1, DataType::Int64),
        ],
    );
    assert!(matches!(
        evaluator.eval(&nullable, &[Value::Null, Value::Int64(1)]),
        Err(ExecError::Registry(_))
    ));

    let substr = Expr::call(
        "substr",
        vec![
            Expr::arg(0, TypeAttr::nullable(DataType::Varchar)),
            Expr::literal(2i32),
        ],
    );
    assert_eq!(evaluator.eval(&substr, &[Value::Null]).unwrap(), Value::Null);
    assert_eq!(
        evaluator.eval(&substr, &[Value::from("abc")]).unwrap(),
        Value::from("bc")
    );
}
