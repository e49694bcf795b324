//! Math and trigonometry over doubles
//!
//! Every function is registered once over nullable doubles plus an `Expr`
//! fallback taking any argument. The fallback casts arithmetic operands to
//! double and calls the same name again; anything else is a type error.

use udfkit_ir::{Arithmetic, DataType, Expr};

use super::NumberTypes;
use crate::builder::ExternalTemplate;
use crate::error::RegistryError;
use crate::library::UdfLibrary;
use crate::resolve::ResolveContext;
use crate::signature::{AnyArg, Nullable, TypeSpec};
use crate::variant::native::{self, NativeFunction};

fn cast_to_double(ctx: &ResolveContext<'_>, args: &[Expr]) -> Result<Expr, RegistryError> {
    let mut casted = Vec::with_capacity(args.len());
    for arg in args {
        let attr = arg
            .output_attr()
            .ok_or_else(|| ctx.error("cannot infer argument type"))?;
        if !attr.data_type.is_arithmetic() {
            return Err(ctx.error(format!(
                "{} do not support type {}",
                ctx.func_name(),
                attr.data_type
            )));
        }
        if attr.data_type == DataType::Double {
            casted.push(arg.clone());
        } else {
            casted.push(Expr::cast(arg.clone(), DataType::Double));
        }
    }
    Ok(Expr::call(ctx.func_name(), casted))
}

fn unary(
    library: &mut UdfLibrary,
    name: &str,
    doc: &str,
    f: fn(f64) -> f64,
) -> Result<(), RegistryError> {
    library
        .register_external(name)
        .doc(doc)
        .args::<(Nullable<f64>,)>(native::unary(f))?;
    library
        .register_expr(name)
        .args::<(AnyArg,)>(cast_to_double)?;
    Ok(())
}

fn binary(
    library: &mut UdfLibrary,
    name: &str,
    doc: &str,
    f: fn(f64, f64) -> f64,
) -> Result<(), RegistryError> {
    library
        .register_external(name)
        .doc(doc)
        .args::<(Nullable<f64>, Nullable<f64>)>(native::binary(f))?;
    library
        .register_expr(name)
        .args::<(AnyArg, AnyArg)>(cast_to_double)?;
    Ok(())
}

struct Abs;

impl<T: Arithmetic + TypeSpec> ExternalTemplate<T> for Abs {
    fn instantiate(&self) -> NativeFunction {
        native::unary(T::wrapping_abs).nullable()
    }
}

pub(crate) fn register(library: &mut UdfLibrary) -> Result<(), RegistryError> {
    unary(library, "ln", "Natural logarithm.", f64::ln)?;
    unary(library, "log", "Natural logarithm, or `log(base, x)`.", f64::ln)?;
    binary(library, "log", "Natural logarithm, or `log(base, x)`.", |base, x| {
        x.ln() / base.ln()
    })?;
    unary(library, "log2", "Base-2 logarithm.", f64::log2)?;
    unary(library, "log10", "Base-10 logarithm.", f64::log10)?;
    unary(library, "exp", "e raised to the argument.", f64::exp)?;
    unary(library, "sqrt", "Square root.", f64::sqrt)?;
    unary(library, "ceil", "Smallest integer not less than the argument.", f64::ceil)?;
    unary(library, "floor", "Largest integer not greater than the argument.", f64::floor)?;
    unary(library, "round", "Nearest integer, halves away from zero.", f64::round)?;
    unary(library, "truncate", "Integer part of the argument.", f64::trunc)?;
    binary(library, "pow", "`x` raised to `y`.", f64::powf)?;

    unary(library, "sin", "Sine, in radians.", f64::sin)?;
    unary(library, "cos", "Cosine, in radians.", f64::cos)?;
    unary(library, "tan", "Tangent, in radians.", f64::tan)?;
    unary(library, "cot", "Cotangent, in radians.", |x| 1.0 / x.tan())?;
    unary(library, "asin", "Arc sine.", f64::asin)?;
    unary(library, "acos", "Arc cosine.", f64::acos)?;
    unary(library, "atan", "Arc tangent, or `atan(y, x)`.", f64::atan)?;
    binary(library, "atan", "Arc tangent, or `atan(y, x)`.", f64::atan2)?;
    binary(library, "atan2", "Arc tangent of `y / x` using both signs.", f64::atan2)?;

    library
        .register_external_template("abs", Abs)
        .doc("Absolute value.")
        .args_in::<NumberTypes>()?;

    library.register_alias("ceiling", "ceil")?;
    library.register_alias("power", "pow")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{Lowering, Resolver};
    use udfkit_ir::TypeAttr;

    fn library() -> UdfLibrary {
        let mut library = UdfLibrary::new();
        register(&mut library).unwrap();
        library
    }

    #[test]
    fn test_integer_argument_is_cast_and_redispatched() {
        let library = library();
        let resolver = Resolver::new(&library);
        let resolved = resolver
            .resolve_types("sqrt", &[TypeAttr::new(DataType::Int32)])
            .unwrap();
        let Lowering::Expand(expr) = resolved.lowering else {
            panic!("sqrt(int32) should expand");
        };
        assert_eq!(expr.to_string(), "sqrt(CAST($0 AS double))");
        assert_eq!(resolved.output, TypeAttr::nullable(DataType::Double));
    }

    #[test]
    fn test_double_argument_calls_native() {
        let library = library();
        let resolver = Resolver::new(&library);
        let resolved = resolver
            .resolve_types("ceiling", &[TypeAttr::new(DataType::Double)])
            .unwrap();
        assert_eq!(resolved.name, "ceil");
        assert!(matches!(
            resolved.lowering,
            Lowering::CallNative { ref symbol, .. } if symbol == "ceil.double"
        ));
    }

    #[test]
    fn test_string_argument_is_rejected() {
        let library = library();
        let resolver = Resolver::new(&library);
        let err = resolver
            .resolve_types("log", &[TypeAttr::new(DataType::Varchar)])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Type mismatch in log: log do not support type string"
        );
    }

    #[test]
    fn test_two_argument_log() {
        let library = library();
        let variant = library
            .lookup(
                "log",
                &[TypeAttr::new(DataType::Double), TypeAttr::new(DataType::Double)],
            )
            .unwrap();
        let crate::variant::Variant::External(def) = &variant.variant else {
            panic!("log(double, double) should be external");
        };
        let result = (def.func)(&[2.0f64.into(), 8.0f64.into()]).unwrap();
        assert!((result.as_f64().unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_abs_of_integer_minimum_does_not_overflow() {
        let library = library();
        let variant = library
            .lookup("abs", &[TypeAttr::new(DataType::Int16)])
            .unwrap();
        let crate::variant::Variant::External(def) = &variant.variant else {
            panic!("abs(int16) should be external");
        };
        assert_eq!((def.func)(&[i16::MIN.into()]).unwrap(), i16::MIN.into());
        assert_eq!((def.func)(&[(-5i16).into()]).unwrap(), 5i16.into());
    }
}
