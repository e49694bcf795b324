//! Declared parameter lists and the marker types used to spell them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use udfkit_container::Container;
use udfkit_ir::{DataType, Date, NativeType, Timestamp, TypeAttr};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    Exact(DataType),
    /// Accepts any type and nullability
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub kind: ParamKind,
    pub nullable: bool,
}

impl Param {
    pub fn exact(data_type: DataType, nullable: bool) -> Self {
        Self {
            kind: ParamKind::Exact(data_type),
            nullable,
        }
    }

    pub fn any() -> Self {
        Self {
            kind: ParamKind::Any,
            nullable: true,
        }
    }

    /// Declared type, if the parameter is not `any`
    pub fn attr(&self) -> Option<TypeAttr> {
        match &self.kind {
            ParamKind::Exact(t) => Some(TypeAttr::new(t.clone()).with_nullable(self.nullable)),
            ParamKind::Any => None,
        }
    }

    /// Match quality of one argument against this parameter
    fn score(&self, arg: &TypeAttr) -> Option<u32> {
        match &self.kind {
            ParamKind::Any => Some(1),
            ParamKind::Exact(t) if *t == arg.data_type => match (self.nullable, arg.nullable) {
                (false, true) => None,
                (p, a) if p == a => Some(3),
                _ => Some(2),
            },
            ParamKind::Exact(_) => None,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.attr() {
            Some(attr) => write!(f, "{}", attr),
            None => f.write_str("any"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<Param>,
    /// Accepts any number of trailing arguments of any type
    pub variadic: bool,
}

impl Signature {
    pub fn new(params: Vec<Param>) -> Self {
        Self {
            params,
            variadic: false,
        }
    }

    pub fn variadic(params: Vec<Param>) -> Self {
        Self {
            params,
            variadic: true,
        }
    }

    /// Total match score, or `None` when the arguments do not fit
    pub fn score(&self, args: &[TypeAttr]) -> Option<u32> {
        if args.len() < self.params.len() || (!self.variadic && args.len() > self.params.len()) {
            return None;
        }
        self.params
            .iter()
            .zip(args)
            .map(|(param, arg)| param.score(arg))
            .sum()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.params.iter().map(|p| p.to_string()).collect();
        if self.variadic {
            parts.push("...".to_string());
        }
        f.write_str(&parts.join(", "))
    }
}

pub fn format_arg_types(args: &[TypeAttr]) -> String {
    let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    parts.join(", ")
}

/// A type usable in a registration argument list
pub trait ArgSpec {
    fn param() -> Param;
}

/// Markers with a concrete type, usable as states and outputs
pub trait TypeSpec: ArgSpec {
    fn attr() -> TypeAttr;
}

macro_rules! exact_arg {
    ($($ty:ty),*) => {
        $(
            impl ArgSpec for $ty {
                fn param() -> Param {
                    Param::exact(<$ty as NativeType>::data_type(), false)
                }
            }

            impl TypeSpec for $ty {
                fn attr() -> TypeAttr {
                    TypeAttr::new(<$ty as NativeType>::data_type())
                }
            }
        )*
    };
}

exact_arg!(bool, i16, i32, i64, f32, f64, Timestamp, Date, String);

/// Nullable parameter of type `T`
pub struct Nullable<T>(PhantomData<T>);

impl<T: NativeType> ArgSpec for Nullable<T> {
    fn param() -> Param {
        Param::exact(T::data_type(), true)
    }
}

impl<T: NativeType> TypeSpec for Nullable<T> {
    fn attr() -> TypeAttr {
        TypeAttr::nullable(T::data_type())
    }
}

/// Parameter accepting any argument
pub struct AnyArg;

impl ArgSpec for AnyArg {
    fn param() -> Param {
        Param::any()
    }
}

/// Tuple-valued state or argument, e.g. `Tuple<(i64, f64)>`
pub struct Tuple<T>(PhantomData<T>);

/// Opaque container state
pub struct Opaque<C>(PhantomData<C>);

impl<C: Container> ArgSpec for Opaque<C> {
    fn param() -> Param {
        Param::exact(DataType::Opaque(C::layout_name()), false)
    }
}

impl<C: Container> TypeSpec for Opaque<C> {
    fn attr() -> TypeAttr {
        TypeAttr::new(DataType::Opaque(C::layout_name()))
    }
}

/// Ordered list of argument markers
pub trait ArgList {
    fn params() -> Vec<Param>;
}

macro_rules! arg_list {
    ($($name:ident),*) => {
        impl<$($name: ArgSpec),*> ArgList for ($($name,)*) {
            fn params() -> Vec<Param> {
                vec![$($name::param()),*]
            }
        }

        impl<$($name: TypeSpec),*> ArgSpec for Tuple<($($name,)*)> {
            fn param() -> Param {
                Param::exact(DataType::Tuple(vec![$($name::attr()),*]), false)
            }
        }

        impl<$($name: TypeSpec),*> TypeSpec for Tuple<($($name,)*)> {
            fn attr() -> TypeAttr {
                TypeAttr::new(DataType::Tuple(vec![$($name::attr()),*]))
            }
        }
    };
}

arg_list!(A);
arg_list!(A, B);
arg_list!(A, B, C);
arg_list!(A, B, C, D);
arg_list!(A, B, C, D, E);

impl ArgList for () {
    fn params() -> Vec<Param> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores() {
        let sig = Signature::new(<(i64, Nullable<f64>)>::params());
        let exact = [
            TypeAttr::new(DataType::Int64),
            TypeAttr::nullable(DataType::Double),
        ];
        let widened = [TypeAttr::new(DataType::Int64), TypeAttr::new(DataType::Double)];
        assert_eq!(sig.score(&exact), Some(6));
        assert_eq!(sig.score(&widened), Some(5));
    }

    #[test]
    fn test_non_null_param_rejects_nullable_arg() {
        let sig = Signature::new(<(i64,)>::params());
        assert_eq!(sig.score(&[TypeAttr::nullable(DataType::Int64)]), None);
        assert_eq!(sig.score(&[TypeAttr::new(DataType::Int32)]), None);
    }

    #[test]
    fn test_variadic_and_any() {
        let sig = Signature::variadic(<(AnyArg,)>::params());
        assert_eq!(sig.score(&[]), None);
        let args = [
            TypeAttr::new(DataType::Varchar),
            TypeAttr::nullable(DataType::Int16),
            TypeAttr::new(DataType::Date),
        ];
        assert_eq!(sig.score(&args), Some(1));
        assert_eq!(sig.to_string(), "any, ...");
    }

    #[test]
    fn test_tuple_marker() {
        let attr = <Tuple<(i64, f64)>>::attr();
        assert_eq!(attr.data_type.name(), "tuple<int64, double>");
        assert!(!attr.nullable);
    }
}
