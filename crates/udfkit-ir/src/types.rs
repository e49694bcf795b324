//! Type system for udfkit IR

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::value::{Date, Timestamp, Value, ValueError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    // Primitives
    Bool,
    Int16,
    Int32,
    Int64,
    Float,
    Double,

    // Temporal
    Timestamp,
    Date,

    // Text
    Varchar,

    // Composite
    Tuple(Vec<TypeAttr>),

    /// Accumulator memory whose layout is only known to the functions
    /// that create and consume it.
    Opaque(String),
}

impl DataType {
    /// Canonical lower-case name, also used as the suffix of native symbols.
    pub fn name(&self) -> String {
        match self {
            DataType::Bool => "bool".to_string(),
            DataType::Int16 => "int16".to_string(),
            DataType::Int32 => "int32".to_string(),
            DataType::Int64 => "int64".to_string(),
            DataType::Float => "float".to_string(),
            DataType::Double => "double".to_string(),
            DataType::Timestamp => "timestamp".to_string(),
            DataType::Date => "date".to_string(),
            DataType::Varchar => "string".to_string(),
            DataType::Tuple(fields) => {
                let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
                format!("tuple<{}>", fields.join(", "))
            }
            DataType::Opaque(layout) => format!("opaque<{}>", layout),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int16 | DataType::Int32 | DataType::Int64)
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, DataType::Float | DataType::Double)
    }

    pub fn is_arithmetic(&self) -> bool {
        self.is_integer() || self.is_floating()
    }

    /// Field type of a tuple type
    pub fn generic(&self, index: usize) -> Option<&TypeAttr> {
        match self {
            DataType::Tuple(fields) => fields.get(index),
            _ => None,
        }
    }

    fn numeric_rank(&self) -> Option<u8> {
        match self {
            DataType::Bool => Some(0),
            DataType::Int16 => Some(1),
            DataType::Int32 => Some(2),
            DataType::Int64 => Some(3),
            DataType::Float => Some(4),
            DataType::Double => Some(5),
            _ => None,
        }
    }

    fn from_rank(rank: u8) -> DataType {
        match rank {
            0 | 1 => DataType::Int16,
            2 => DataType::Int32,
            3 => DataType::Int64,
            4 => DataType::Float,
            _ => DataType::Double,
        }
    }

    /// Result type of an additive or multiplicative operator over `lhs` and `rhs`.
    ///
    /// Numbers widen along int16 < int32 < int64 < float < double, a timestamp
    /// shifted by an integer stays a timestamp and tuples combine field by field.
    pub fn promote(lhs: &DataType, rhs: &DataType) -> Option<DataType> {
        match (lhs, rhs) {
            (DataType::Timestamp, DataType::Timestamp) => Some(DataType::Timestamp),
            (DataType::Timestamp, other) | (other, DataType::Timestamp) if other.is_integer() => {
                Some(DataType::Timestamp)
            }
            (DataType::Tuple(left), DataType::Tuple(right)) => {
                if left.len() != right.len() {
                    return None;
                }
                let fields = left
                    .iter()
                    .zip(right)
                    .map(|(l, r)| {
                        DataType::promote(&l.data_type, &r.data_type).map(|data_type| TypeAttr {
                            data_type,
                            nullable: l.nullable || r.nullable,
                        })
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(DataType::Tuple(fields))
            }
            _ => {
                let rank = lhs.numeric_rank()?.max(rhs.numeric_rank()?);
                Some(DataType::from_rank(rank))
            }
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for DataType {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(DataType::Bool),
            "int16" | "smallint" => Ok(DataType::Int16),
            "int32" | "int" | "integer" => Ok(DataType::Int32),
            "int64" | "bigint" => Ok(DataType::Int64),
            "float" => Ok(DataType::Float),
            "double" => Ok(DataType::Double),
            "timestamp" => Ok(DataType::Timestamp),
            "date" => Ok(DataType::Date),
            "string" | "varchar" => Ok(DataType::Varchar),
            other => Err(ValueError::UnknownType(other.to_string())),
        }
    }
}

/// A type together with its nullability, as seen by resolution and inference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeAttr {
    pub data_type: DataType,
    pub nullable: bool,
}

impl TypeAttr {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            nullable: false,
        }
    }

    pub fn nullable(data_type: DataType) -> Self {
        Self {
            data_type,
            nullable: true,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

impl fmt::Display for TypeAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}?", self.data_type)
        } else {
            write!(f, "{}", self.data_type)
        }
    }
}

/// Parses `int64` or `int64?` (nullable)
impl FromStr for TypeAttr {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_suffix('?') {
            Some(base) => Ok(TypeAttr::nullable(base.parse()?)),
            None => Ok(TypeAttr::new(s.parse()?)),
        }
    }
}

/// Binds a Rust type to the SQL scalar type it stands for.
///
/// Registration helpers are generic over this trait; instantiating a generic
/// definition for each type of a closed list is how one definition becomes
/// many concrete variants.
pub trait NativeType: Clone + Send + Sync + 'static {
    fn data_type() -> DataType;

    /// Suffix used when deriving native symbol names
    fn type_name() -> &'static str;

    fn from_value(value: &Value) -> Option<Self>;

    fn into_value(self) -> Value;
}

/// Types with a smallest and largest representable value
pub trait Bounded: NativeType + PartialOrd {
    fn minimum_value() -> Self;
    fn maximum_value() -> Self;
}

/// Integer and floating types
pub trait Arithmetic: NativeType + Copy + PartialOrd {
    fn zero() -> Self;
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;

    /// Addition that wraps on integer overflow
    fn plus(self, rhs: Self) -> Self;

    /// Absolute value; the integer minimum maps to itself
    fn wrapping_abs(self) -> Self;
}

macro_rules! native_type {
    ($ty:ty, $variant:ident, $data_type:expr, $name:literal) => {
        impl NativeType for $ty {
            fn data_type() -> DataType {
                $data_type
            }

            fn type_name() -> &'static str {
                $name
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }
    };
}

native_type!(bool, Bool, DataType::Bool, "bool");
native_type!(i16, Int16, DataType::Int16, "int16");
native_type!(i32, Int32, DataType::Int32, "int32");
native_type!(i64, Int64, DataType::Int64, "int64");
native_type!(f32, Float, DataType::Float, "float");
native_type!(f64, Double, DataType::Double, "double");
native_type!(Timestamp, Timestamp, DataType::Timestamp, "timestamp");
native_type!(Date, Date, DataType::Date, "date");
native_type!(String, String, DataType::Varchar, "string");

macro_rules! arithmetic {
    ($($ty:ty => $plus:expr, $abs:expr),*) => {
        $(
            impl Bounded for $ty {
                fn minimum_value() -> Self {
                    <$ty>::MIN
                }

                fn maximum_value() -> Self {
                    <$ty>::MAX
                }
            }

            impl Arithmetic for $ty {
                fn zero() -> Self {
                    0 as $ty
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn from_f64(value: f64) -> Self {
                    value as $ty
                }

                fn plus(self, rhs: Self) -> Self {
                    let plus: fn($ty, $ty) -> $ty = $plus;
                    plus(self, rhs)
                }

                fn wrapping_abs(self) -> Self {
                    let abs: fn($ty) -> $ty = $abs;
                    abs(self)
                }
            }
        )*
    };
}

arithmetic!(
    i16 => i16::wrapping_add, i16::wrapping_abs,
    i32 => i32::wrapping_add, i32::wrapping_abs,
    i64 => i64::wrapping_add, i64::wrapping_abs,
    f32 => |a, b| a + b, f32::abs,
    f64 => |a, b| a + b, f64::abs
);

impl Bounded for Timestamp {
    fn minimum_value() -> Self {
        Timestamp(i64::MIN)
    }

    fn maximum_value() -> Self {
        Timestamp(i64::MAX)
    }
}

impl Bounded for Date {
    fn minimum_value() -> Self {
        Date::MIN
    }

    fn maximum_value() -> Self {
        Date::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion() {
        assert_eq!(DataType::promote(&DataType::Int16, &DataType::Int64), Some(DataType::Int64));
        assert_eq!(DataType::promote(&DataType::Int32, &DataType::Float), Some(DataType::Float));
        assert_eq!(
            DataType::promote(&DataType::Timestamp, &DataType::Int64),
            Some(DataType::Timestamp)
        );
        assert_eq!(DataType::promote(&DataType::Varchar, &DataType::Int64), None);
    }

    #[test]
    fn test_tuple_promotion_keeps_shape() {
        let state = DataType::Tuple(vec![
            TypeAttr::new(DataType::Int64),
            TypeAttr::new(DataType::Double),
        ]);
        assert_eq!(DataType::promote(&state, &state), Some(state.clone()));
        assert_eq!(state.name(), "tuple<int64, double>");
    }

    #[test]
    fn test_parse_type_attr() {
        assert_eq!("int64".parse::<TypeAttr>().unwrap(), TypeAttr::new(DataType::Int64));
        assert_eq!(
            "string?".parse::<TypeAttr>().unwrap(),
            TypeAttr::nullable(DataType::Varchar)
        );
        assert!("blob".parse::<TypeAttr>().is_err());
    }

    #[test]
    fn test_wrapping_abs() {
        assert_eq!(Arithmetic::wrapping_abs(i32::MIN), i32::MIN);
        assert_eq!(Arithmetic::wrapping_abs(-3i64), 3);
        assert_eq!(Arithmetic::wrapping_abs(-1.5f64), 1.5);
    }
}
