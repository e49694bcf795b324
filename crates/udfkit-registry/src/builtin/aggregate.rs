//! Built-in aggregates

use udfkit_codegen::NativeValue;
use udfkit_container::{Bound, BoundedGroupByDict, ContainerType, DistinctCountSet, TopKContainer};
use udfkit_ir::{
    Arithmetic, BinOp, Bounded, DataType, Date, Expr, NativeType, Timestamp, TypeAttr, Value,
};

use super::{built_arg, expr_arg, NumberTypes};
use crate::builder::UdafTemplate;
use crate::error::{EvalError, RegistryError};
use crate::library::UdfLibrary;
use crate::signature::{Nullable, Opaque, Tuple, TypeSpec};
use crate::udaf::UdafRegistryHelper;

type NumberAndTimeTypes = (i16, i32, i64, f32, f64, Timestamp);
type OrderedTypes = (i16, i32, i64, f32, f64, Timestamp, Date);
type ContainerTypes = (i16, i32, i64, f32, f64, Timestamp, Date, String);

fn arg<T: NativeType>(args: &[Value], index: usize) -> Option<T> {
    args.get(index).and_then(T::from_value)
}

/// A null condition counts as false
fn condition(args: &[Value], index: usize) -> bool {
    args.get(index).and_then(Value::as_bool).unwrap_or(false)
}

fn bound<B: Bound>(args: &[Value], index: usize, func: &str) -> Result<B, EvalError> {
    arg(args, index).ok_or_else(|| EvalError::ArgumentType {
        func: func.to_string(),
        index,
        expected: B::type_name().to_string(),
    })
}

fn constant<T: NativeType>(helper: &UdafRegistryHelper<'_>, value: Value) -> Result<Value, RegistryError> {
    value
        .cast(&T::data_type())
        .map_err(|e| RegistryError::InvalidDefinition {
            name: helper.name().to_string(),
            msg: e.to_string(),
        })
}

/// Timestamps are averaged as their millisecond count
fn to_double(expr: &Expr) -> Expr {
    match expr.output_attr().map(|a| a.data_type) {
        Some(DataType::Timestamp) => {
            Expr::cast(Expr::cast(expr.clone(), DataType::Int64), DataType::Double)
        }
        _ => Expr::cast(expr.clone(), DataType::Double),
    }
}

/// `(count + 1, sum + value)` over a `tuple<int64, double>` state
fn count_sum_update(state: &Expr, value: &Expr) -> Expr {
    Expr::make_tuple(vec![
        Expr::call(
            "add",
            vec![Expr::get_field(state.clone(), 0), Expr::literal(1i64)],
        ),
        Expr::call("add", vec![Expr::get_field(state.clone(), 1), to_double(value)]),
    ])
}

fn count_sum_init() -> Value {
    Value::Tuple(vec![Value::Int64(0), Value::Double(0.0)])
}

/// Null when no row was accumulated
fn count_sum_average(state: &Expr) -> Expr {
    Expr::binary(
        BinOp::FDiv,
        Expr::get_field(state.clone(), 1),
        Expr::get_field(state.clone(), 0),
    )
    .with_output(TypeAttr::nullable(DataType::Double))
}

struct Sum;

impl<T: NativeType + TypeSpec> UdafTemplate<T> for Sum {
    fn define(&self, helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError> {
        let zero = constant::<T>(helper, Value::Int64(0))?;
        helper
            .templates::<T, T, (T,)>()
            .const_init(zero)
            .update("add")
            .merge("add")
            .output("identity")
    }
}

struct Min;

impl<T: Bounded + TypeSpec> UdafTemplate<T> for Min {
    fn define(&self, helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError> {
        helper
            .templates::<T, T, (T,)>()
            .const_init(T::maximum_value().into_value())
            .update("minimum")
            .merge("minimum")
            .output("identity")
    }
}

struct Max;

impl<T: Bounded + TypeSpec> UdafTemplate<T> for Max {
    fn define(&self, helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError> {
        helper
            .templates::<T, T, (T,)>()
            .const_init(T::minimum_value().into_value())
            .update("maximum")
            .merge("maximum")
            .output("identity")
    }
}

struct Count;

impl<T: TypeSpec> UdafTemplate<T> for Count {
    fn define(&self, helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError> {
        helper
            .templates::<i64, i64, (T,)>()
            .const_init(0i64)
            .update_codegen(
                |_ctx, _args| Ok(TypeAttr::new(DataType::Int64)),
                |ctx, args| {
                    let block = ctx.current_block();
                    ctx.builders()
                        .arithmetic()
                        .add(block, built_arg(args, 0)?, &NativeValue::create(1i64))
                },
            )
            .merge("add")
            .output("identity")
    }
}

struct Avg;

impl<T: NativeType + TypeSpec> UdafTemplate<T> for Avg {
    fn define(&self, helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError> {
        helper
            .templates::<Nullable<f64>, Tuple<(i64, f64)>, (T,)>()
            .const_init(count_sum_init())
            .update_expr(|ctx, args| {
                Ok(count_sum_update(
                    expr_arg(ctx, args, 0)?,
                    expr_arg(ctx, args, 1)?,
                ))
            })
            .merge("add")
            .output_expr(|ctx, args| Ok(count_sum_average(expr_arg(ctx, args, 0)?)))
    }
}

struct CountWhere;

impl<T: TypeSpec> UdafTemplate<T> for CountWhere {
    fn define(&self, helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError> {
        helper
            .templates::<i64, i64, (T, Nullable<bool>)>()
            .const_init(0i64)
            .update_expr(|ctx, args| {
                let state = expr_arg(ctx, args, 0)?;
                Ok(Expr::cond(
                    expr_arg(ctx, args, 2)?.clone(),
                    Expr::call("add", vec![state.clone(), Expr::literal(1i64)]),
                    state.clone(),
                ))
            })
            .merge("add")
            .output("identity")
    }
}

struct AvgWhere;

impl<T: NativeType + TypeSpec> UdafTemplate<T> for AvgWhere {
    fn define(&self, helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError> {
        helper
            .templates::<Nullable<f64>, Tuple<(i64, f64)>, (T, Nullable<bool>)>()
            .const_init(count_sum_init())
            .update_expr(|ctx, args| {
                let state = expr_arg(ctx, args, 0)?;
                Ok(Expr::cond(
                    expr_arg(ctx, args, 2)?.clone(),
                    count_sum_update(state, expr_arg(ctx, args, 1)?),
                    state.clone(),
                ))
            })
            .merge("add")
            .output_expr(|ctx, args| Ok(count_sum_average(expr_arg(ctx, args, 0)?)))
    }
}

struct DistinctCount;

impl<T: ContainerType + TypeSpec> UdafTemplate<T> for DistinctCount {
    fn define(&self, helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError> {
        helper
            .templates::<i64, Opaque<DistinctCountSet<T>>, (T,)>()
            .init::<DistinctCountSet<T>>("distinct_count_init")
            .update_native::<DistinctCountSet<T>, _>("distinct_count_update", |set, args| {
                if let Some(value) = arg::<T>(args, 0) {
                    set.insert(value);
                }
                Ok(())
            })
            .merge_native::<DistinctCountSet<T>, _>("distinct_count_merge", |set, other| {
                set.merge(other);
                Ok(())
            })
            .output_native::<DistinctCountSet<T>, _>("distinct_count_output", |set| {
                Ok(Value::Int64(set.output()))
            })
    }
}

struct Top;

impl<T: ContainerType + TypeSpec> UdafTemplate<T> for Top {
    fn define(&self, helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError> {
        define_top::<T, i32>(helper)?;
        define_top::<T, i64>(helper)
    }
}

fn define_top<T, B>(helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError>
where
    T: ContainerType + TypeSpec,
    B: Bound + TypeSpec,
{
    helper
        .templates::<String, Opaque<TopKContainer<T, B>>, (Nullable<T>, B)>()
        .init::<TopKContainer<T, B>>("top_init")
        .update_native::<TopKContainer<T, B>, _>("top_update", |top, args| {
            let limit = bound::<B>(args, 1, "top")?;
            top.push(arg::<T>(args, 0), limit);
            Ok(())
        })
        .merge_native::<TopKContainer<T, B>, _>("top_merge", |top, other| {
            top.merge(other);
            Ok(())
        })
        .output_native::<TopKContainer<T, B>, _>("top_output", |top| {
            Ok(Value::String(top.output()))
        })
}

/// Instantiates a per-(value, key) definition for every category key type
macro_rules! for_each_key {
    ($define:ident :: <$v:ty>($helper:expr)) => {{
        $define::<$v, i16>($helper)?;
        $define::<$v, i32>($helper)?;
        $define::<$v, i64>($helper)?;
        $define::<$v, Date>($helper)?;
        $define::<$v, Timestamp>($helper)?;
        $define::<$v, String>($helper)?;
        Ok(())
    }};
}

struct AvgCate;

impl<V: Arithmetic + TypeSpec> UdafTemplate<V> for AvgCate {
    fn define(&self, helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError> {
        for_each_key!(define_avg_cate::<V>(helper))
    }
}

fn define_avg_cate<V, K>(helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError>
where
    V: Arithmetic + TypeSpec,
    K: ContainerType + TypeSpec,
{
    helper
        .templates::<String, Opaque<BoundedGroupByDict<K, V>>, (Nullable<V>, Nullable<K>)>()
        .init::<BoundedGroupByDict<K, V>>("avg_cate_init")
        .update_native::<BoundedGroupByDict<K, V>, _>("avg_cate_update", |dict, args| {
            if let (Some(value), Some(key)) = (arg::<V>(args, 0), arg::<K>(args, 1)) {
                dict.update(key, value);
            }
            Ok(())
        })
        .merge_native::<BoundedGroupByDict<K, V>, _>("avg_cate_merge", |dict, other| {
            dict.merge(other);
            Ok(())
        })
        .output_native::<BoundedGroupByDict<K, V>, _>("avg_cate_output", |dict| {
            Ok(Value::String(dict.output_by_key()))
        })
}

struct AvgCateWhere;

impl<V: Arithmetic + TypeSpec> UdafTemplate<V> for AvgCateWhere {
    fn define(&self, helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError> {
        for_each_key!(define_avg_cate_where::<V>(helper))
    }
}

fn define_avg_cate_where<V, K>(helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError>
where
    V: Arithmetic + TypeSpec,
    K: ContainerType + TypeSpec,
{
    helper
        .templates::<
            String,
            Opaque<BoundedGroupByDict<K, V>>,
            (Nullable<V>, Nullable<bool>, Nullable<K>),
        >()
        .init::<BoundedGroupByDict<K, V>>("avg_cate_where_init")
        .update_native::<BoundedGroupByDict<K, V>, _>("avg_cate_where_update", |dict, args| {
            if !condition(args, 1) {
                return Ok(());
            }
            if let (Some(value), Some(key)) = (arg::<V>(args, 0), arg::<K>(args, 2)) {
                dict.update(key, value);
            }
            Ok(())
        })
        .merge_native::<BoundedGroupByDict<K, V>, _>("avg_cate_where_merge", |dict, other| {
            dict.merge(other);
            Ok(())
        })
        .output_native::<BoundedGroupByDict<K, V>, _>("avg_cate_where_output", |dict| {
            Ok(Value::String(dict.output_by_key()))
        })
}

struct TopNAvgCateWhere;

impl<V: Arithmetic + TypeSpec> UdafTemplate<V> for TopNAvgCateWhere {
    fn define(&self, helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError> {
        for_each_key!(define_top_n_avg_cate_where::<V>(helper))
    }
}

fn define_top_n_avg_cate_where<V, K>(
    helper: &mut UdafRegistryHelper<'_>,
) -> Result<(), RegistryError>
where
    V: Arithmetic + TypeSpec,
    K: ContainerType + TypeSpec,
{
    define_top_n_bounded::<V, K, i32>(helper)?;
    define_top_n_bounded::<V, K, i64>(helper)
}

fn define_top_n_bounded<V, K, B>(helper: &mut UdafRegistryHelper<'_>) -> Result<(), RegistryError>
where
    V: Arithmetic + TypeSpec,
    K: ContainerType + TypeSpec,
    B: Bound + TypeSpec,
{
    let update = format!("top_n_avg_cate_where_update_{}_bound", B::type_name());
    helper
        .templates::<
            String,
            Opaque<BoundedGroupByDict<K, V>>,
            (Nullable<V>, Nullable<bool>, Nullable<K>, B),
        >()
        .init::<BoundedGroupByDict<K, V>>("top_n_avg_cate_where_init")
        .update_native::<BoundedGroupByDict<K, V>, _>(&update, |dict, args| {
            if !condition(args, 1) {
                return Ok(());
            }
            let (Some(value), Some(key)) = (arg::<V>(args, 0), arg::<K>(args, 2)) else {
                return Ok(());
            };
            let limit = bound::<B>(args, 3, "top_n_avg_cate_where")?;
            dict.update(key, value);
            dict.set_limit(limit.limit());
            dict.evict_overflow();
            Ok(())
        })
        .output_native::<BoundedGroupByDict<K, V>, _>("top_n_avg_cate_where_output", |dict| {
            Ok(Value::String(dict.output_by_value_desc()))
        })
}

pub(crate) fn register(library: &mut UdfLibrary) -> Result<(), RegistryError> {
    library
        .register_udaf_template("sum", Sum)
        .doc("Sum of the values in a group.")
        .args_in::<NumberAndTimeTypes>()?;

    library
        .register_udaf_template("min", Min)
        .doc("Smallest value in a group.")
        .args_in::<OrderedTypes>()?;

    library
        .register_udaf_template("max", Max)
        .doc("Largest value in a group.")
        .args_in::<OrderedTypes>()?;

    library
        .register_udaf_template("count", Count)
        .doc("Number of non-null values in a group.")
        .args_in::<ContainerTypes>()?;

    library
        .register_udaf_template("avg", Avg)
        .doc("Average of the values in a group.")
        .args_in::<NumberTypes>()?;

    library
        .register_udaf_template("count_where", CountWhere)
        .doc("Number of non-null values whose condition holds.\n\n  count_where(value, condition)")
        .args_in::<ContainerTypes>()?;

    library
        .register_udaf_template("avg_where", AvgWhere)
        .doc("Average of the values whose condition holds.\n\n  avg_where(value, condition)")
        .args_in::<NumberAndTimeTypes>()?;

    library
        .register_udaf_template("distinct_count", DistinctCount)
        .doc("Number of distinct non-null values in a group.")
        .args_in::<ContainerTypes>()?;

    library
        .register_udaf_template("top", Top)
        .doc(
            "The `k` largest values, largest first, joined by commas. Duplicates are kept \
             and a negative `k` keeps everything.\n\n  top(value, k)",
        )
        .args_in::<ContainerTypes>()?;

    library
        .register_udaf_template("avg_cate", AvgCate)
        .doc(
            "Average of `value` per category, as `category:average` pairs in ascending \
             category order.\n\n\
             Example:\n\n\
             | value | category |\n\
             | 0     | x        |\n\
             | 1     | y        |\n\
             | 2     | x        |\n\
             | 3     | y        |\n\n\
             avg_cate(value, category) yields `x:1,y:2`.",
        )
        .args_in::<NumberTypes>()?;

    library
        .register_udaf_template("avg_cate_where", AvgCateWhere)
        .doc(
            "Like avg_cate, counting only rows whose condition holds.\n\n  \
             avg_cate_where(value, condition, category)",
        )
        .args_in::<NumberTypes>()?;

    library
        .register_udaf_template("top_n_avg_cate_where", TopNAvgCateWhere)
        .doc(
            "Per-category averages over rows whose condition holds, keeping at most `n` \
             categories (the oldest are dropped first) and printed by descending average.\n\n  \
             top_n_avg_cate_where(value, condition, category, n)",
        )
        .args_in::<NumberTypes>()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udaf::{MergeStep, OutputStep, StateInit, UpdateStep};
    use crate::variant::Variant;

    fn library() -> UdfLibrary {
        let mut library = UdfLibrary::new();
        super::super::core::register(&mut library).unwrap();
        register(&mut library).unwrap();
        library
    }

    fn attr(data_type: DataType) -> TypeAttr {
        TypeAttr::new(data_type)
    }

    #[test]
    fn test_sum_initial_state_matches_type() {
        let library = library();
        let variant = library.lookup("sum", &[attr(DataType::Float)]).unwrap();
        let Variant::Aggregate(def) = &variant.variant else {
            panic!("sum should be an aggregate");
        };
        assert!(matches!(&def.init, StateInit::Const(Value::Float(v)) if *v == 0.0));
        assert!(matches!(&def.update, UpdateStep::Named(f) if f == "add"));
        assert_eq!(def.output, attr(DataType::Float));
    }

    #[test]
    fn test_min_starts_at_type_maximum() {
        let library = library();
        let variant = library.lookup("min", &[attr(DataType::Int16)]).unwrap();
        let Variant::Aggregate(def) = &variant.variant else {
            panic!("min should be an aggregate");
        };
        assert!(matches!(&def.init, StateInit::Const(Value::Int16(i16::MAX))));
    }

    #[test]
    fn test_opaque_symbols_carry_layout() {
        let library = library();
        let variant = library
            .lookup(
                "avg_cate",
                &[TypeAttr::nullable(DataType::Int32), TypeAttr::nullable(DataType::Varchar)],
            )
            .unwrap();
        let Variant::Aggregate(def) = &variant.variant else {
            panic!("avg_cate should be an aggregate");
        };
        assert_eq!(def.state.data_type, DataType::Opaque("dict_string_int32".to_string()));
        assert!(matches!(
            &def.update,
            UpdateStep::Native { symbol, .. } if symbol == "avg_cate_update.opaque_dict_string_int32"
        ));
        assert!(matches!(&def.finish, OutputStep::Native { .. }));
    }

    #[test]
    fn test_top_n_avg_cate_where_has_no_merge() {
        let library = library();
        let variant = library
            .lookup(
                "top_n_avg_cate_where",
                &[
                    attr(DataType::Double),
                    attr(DataType::Bool),
                    attr(DataType::Date),
                    attr(DataType::Int64),
                ],
            )
            .unwrap();
        let Variant::Aggregate(def) = &variant.variant else {
            panic!("top_n_avg_cate_where should be an aggregate");
        };
        assert!(def.merge.is_none());
        assert!(matches!(
            &def.update,
            UpdateStep::Native { symbol, .. }
                if symbol == "top_n_avg_cate_where_update_int64_bound.opaque_dict_date_double"
        ));
    }

    #[test]
    fn test_top_accepts_both_bound_widths() {
        let library = library();
        for bound in [DataType::Int32, DataType::Int64] {
            let variant = library
                .lookup("top", &[attr(DataType::Varchar), attr(bound)])
                .unwrap();
            let Variant::Aggregate(def) = &variant.variant else {
                panic!("top should be an aggregate");
            };
            assert!(matches!(&def.merge, Some(MergeStep::Native { .. })));
        }
    }

    #[test]
    fn test_avg_output_is_nullable_double() {
        let library = library();
        let variant = library.lookup("avg", &[attr(DataType::Int32)]).unwrap();
        let Variant::Aggregate(def) = &variant.variant else {
            panic!("avg should be an aggregate");
        };
        assert_eq!(def.output, TypeAttr::nullable(DataType::Double));
        assert_eq!(def.state.data_type.name(), "tuple<int64, double>");
    }
}
