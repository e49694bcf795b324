//! Helper functions that aggregate definitions refer to by name

use udfkit_codegen::NativeValue;
use udfkit_ir::{Arithmetic, BinOp, DataType, Date, Expr, NativeType, Timestamp, TypeAttr};

use super::{built_arg, expr_arg, NumberTypes};
use crate::builder::ExternalTemplate;
use crate::error::RegistryError;
use crate::library::UdfLibrary;
use crate::signature::{AnyArg, TypeSpec};
use crate::variant::native::{self, NativeFunction};

struct Minimum;

impl<T: NativeType + TypeSpec + PartialOrd> ExternalTemplate<T> for Minimum {
    fn instantiate(&self) -> NativeFunction {
        native::binary(|a: T, b: T| if b < a { b } else { a })
    }
}

struct Maximum;

impl<T: NativeType + TypeSpec + PartialOrd> ExternalTemplate<T> for Maximum {
    fn instantiate(&self) -> NativeFunction {
        native::binary(|a: T, b: T| if b > a { b } else { a })
    }
}

struct Inc;

impl<T: Arithmetic + TypeSpec> ExternalTemplate<T> for Inc {
    fn instantiate(&self) -> NativeFunction {
        native::unary(|x: T| x.plus(T::from_f64(1.0)))
    }
}

type OrderedTypes = (i16, i32, i64, f32, f64, Timestamp, Date);

pub(crate) fn register(library: &mut UdfLibrary) -> Result<(), RegistryError> {
    library
        .register_codegen("identity")
        .doc("Returns its argument unchanged.")
        .args_with_infer::<(AnyArg,)>(
            |ctx, args| {
                args.first()
                    .cloned()
                    .ok_or_else(|| ctx.error("missing argument"))
            },
            |_ctx, args| built_arg(args, 0).cloned(),
        )?;

    library
        .register_expr("add")
        .doc("Sum of two values of compatible types, typed as the first operand.")
        .args::<(AnyArg, AnyArg)>(|ctx, args| {
            let (lhs, rhs) = (expr_arg(ctx, args, 0)?, expr_arg(ctx, args, 1)?);
            let (Some(l), Some(r)) = (lhs.output_attr(), rhs.output_attr()) else {
                return Err(ctx.error("cannot infer operand types"));
            };
            if DataType::promote(&l.data_type, &r.data_type).is_none() {
                return Err(ctx.error(format!(
                    "add do not support type {} and {}",
                    l.data_type, r.data_type
                )));
            }
            Ok(Expr::binary(BinOp::Add, lhs.clone(), rhs.clone())
                .with_output(TypeAttr {
                    data_type: l.data_type,
                    nullable: l.nullable || r.nullable,
                }))
        })?;

    library
        .register_codegen("make_tuple")
        .doc("Builds a tuple from its arguments.")
        .variadic_args::<()>(
            |_ctx, args| Ok(TypeAttr::new(DataType::Tuple(args.to_vec()))),
            |_ctx, args| Ok(NativeValue::create_tuple(args.to_vec())),
        )?;

    library
        .register_external_template("minimum", Minimum)
        .doc("The smaller of two values.")
        .args_in::<OrderedTypes>()?;

    library
        .register_external_template("maximum", Maximum)
        .doc("The larger of two values.")
        .args_in::<OrderedTypes>()?;

    library
        .register_external_template("inc", Inc)
        .doc("Adds one.")
        .args_in::<NumberTypes>()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::Resolver;
    use crate::variant::Variant;
    use udfkit_ir::Value;

    fn library() -> UdfLibrary {
        let mut library = UdfLibrary::new();
        register(&mut library).unwrap();
        library
    }

    #[test]
    fn test_minimum_symbols_are_per_type() {
        let library = library();
        let i32_attr = TypeAttr::new(DataType::Int32);
        let variant = library.lookup("minimum", &[i32_attr.clone(), i32_attr]).unwrap();
        let Variant::External(def) = &variant.variant else {
            panic!("minimum should be external");
        };
        assert_eq!(def.symbol, "minimum.int32");
        assert_eq!(
            (def.func)(&[Value::Int32(4), Value::Int32(-2)]).unwrap(),
            Value::Int32(-2)
        );

        let date = TypeAttr::new(DataType::Date);
        let variant = library.lookup("maximum", &[date.clone(), date]).unwrap();
        assert_eq!(variant.variant.symbol(), Some("maximum.date"));
    }

    #[test]
    fn test_add_expands_to_typed_operator() {
        let library = library();
        let resolver = Resolver::new(&library);
        let expr = Expr::call(
            "add",
            vec![
                Expr::arg(0, TypeAttr::new(DataType::Int16)),
                Expr::arg(1, TypeAttr::new(DataType::Int16)),
            ],
        );
        let resolved = resolver.resolve_expr(&expr).unwrap();
        assert!(matches!(resolved, Expr::BinaryOp { op: BinOp::Add, .. }));
        assert_eq!(resolved.output_attr(), Some(TypeAttr::new(DataType::Int16)));
    }

    #[test]
    fn test_add_rejects_strings() {
        let library = library();
        let resolver = Resolver::new(&library);
        let err = resolver
            .resolve_types(
                "add",
                &[TypeAttr::new(DataType::Varchar), TypeAttr::new(DataType::Int64)],
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::TypeMismatch { ref func, .. } if func == "add"));
    }

    #[test]
    fn test_make_tuple_infers_field_types() {
        let library = library();
        let resolver = Resolver::new(&library);
        let resolved = resolver
            .resolve_types(
                "make_tuple",
                &[TypeAttr::new(DataType::Int64), TypeAttr::nullable(DataType::Double)],
            )
            .unwrap();
        assert_eq!(resolved.output.data_type.name(), "tuple<int64, double?>");
    }
}
