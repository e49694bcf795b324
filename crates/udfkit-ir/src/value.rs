//! Runtime values and the arithmetic shared by evaluation and constant folding

use chrono::{DateTime, Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use crate::expr::BinOp;
use crate::types::{DataType, TypeAttr};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Cannot cast {from} to {to}")]
    InvalidCast { from: String, to: String },

    #[error("Operator {op:?} is not defined for {lhs} and {rhs}")]
    InvalidOperands { op: BinOp, lhs: String, rhs: String },
}

/// Milliseconds since the Unix epoch (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn millis(self) -> i64 {
        self.0
    }

    pub fn to_datetime(self) -> Option<DateTime<chrono::Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Calendar date without time zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Date(pub NaiveDate);

impl Date {
    pub const MIN: Date = Date(NaiveDate::MIN);
    pub const MAX: Date = Date(NaiveDate::MAX);

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Date)
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    pub fn month(self) -> u32 {
        self.0.month()
    }

    pub fn day(self) -> u32 {
        self.0.day()
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Timestamp(Timestamp),
    Date(Date),
    String(String),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Type of a non-null value. Tuple fields that are null make the type unknown.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(DataType::Bool),
            Value::Int16(_) => Some(DataType::Int16),
            Value::Int32(_) => Some(DataType::Int32),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float(_) => Some(DataType::Float),
            Value::Double(_) => Some(DataType::Double),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Date(_) => Some(DataType::Date),
            Value::String(_) => Some(DataType::Varchar),
            Value::Tuple(fields) => fields
                .iter()
                .map(|f| f.data_type().map(TypeAttr::new))
                .collect::<Option<Vec<_>>>()
                .map(DataType::Tuple),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::Timestamp(ts) => Some(ts.0),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    fn type_label(&self) -> String {
        self.data_type()
            .map(|t| t.name())
            .unwrap_or_else(|| "null".to_string())
    }

    fn cast_error(&self, to: &DataType) -> ValueError {
        ValueError::InvalidCast {
            from: self.type_label(),
            to: to.name(),
        }
    }

    /// Explicit conversion, as performed by a cast node
    pub fn cast(&self, to: &DataType) -> Result<Value, ValueError> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        if self.data_type().as_ref() == Some(to) {
            return Ok(self.clone());
        }
        let cast = match (to, self) {
            (DataType::Bool, v) => v.as_f64().map(|x| Value::Bool(x != 0.0)),
            (DataType::Int16, v) => integral(v).map(|x| Value::Int16(x as i16)),
            (DataType::Int32, v) => integral(v).map(|x| Value::Int32(x as i32)),
            (DataType::Int64, v) => integral(v).map(Value::Int64),
            (DataType::Float, v) if !matches!(v, Value::Timestamp(_)) => {
                v.as_f64().map(|x| Value::Float(x as f32))
            }
            (DataType::Double, v) if !matches!(v, Value::Timestamp(_)) => {
                v.as_f64().map(Value::Double)
            }
            (DataType::Timestamp, v) if !matches!(v, Value::Bool(_)) => {
                integral(v).map(|ms| Value::Timestamp(Timestamp(ms)))
            }
            (DataType::Date, Value::Timestamp(ts)) => ts
                .to_datetime()
                .map(|dt| Value::Date(Date(dt.date_naive()))),
            (DataType::Varchar, v) => Some(Value::String(v.to_string())),
            (DataType::Tuple(fields), Value::Tuple(values)) if fields.len() == values.len() => {
                let cast = fields
                    .iter()
                    .zip(values)
                    .map(|(f, v)| v.cast(&f.data_type))
                    .collect::<Result<Vec<_>, _>>()?;
                Some(Value::Tuple(cast))
            }
            _ => None,
        };
        cast.ok_or_else(|| self.cast_error(to))
    }

    /// Applies a binary operator. Null operands produce null, except for the
    /// three-valued logic of `And`/`Or`.
    pub fn binary(&self, op: BinOp, rhs: &Value) -> Result<Value, ValueError> {
        match op {
            BinOp::And => return Ok(logic(self, rhs, false)),
            BinOp::Or => return Ok(logic(self, rhs, true)),
            _ => {}
        }
        if self.is_null() || rhs.is_null() {
            return Ok(Value::Null);
        }
        let invalid = || ValueError::InvalidOperands {
            op,
            lhs: self.type_label(),
            rhs: rhs.type_label(),
        };

        if op.is_comparison() {
            let ordering = compare(self, rhs).ok_or_else(invalid)?;
            let result = match op {
                BinOp::Eq => ordering == Ordering::Equal,
                BinOp::Ne => ordering != Ordering::Equal,
                BinOp::Lt => ordering == Ordering::Less,
                BinOp::Le => ordering != Ordering::Greater,
                BinOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }

        if op == BinOp::FDiv {
            let (l, r) = (
                self.as_f64().ok_or_else(invalid)?,
                rhs.as_f64().ok_or_else(invalid)?,
            );
            return Ok(if r == 0.0 { Value::Null } else { Value::Double(l / r) });
        }

        match (self, rhs) {
            (Value::Tuple(left), Value::Tuple(right)) if left.len() == right.len() => {
                let fields = left
                    .iter()
                    .zip(right)
                    .map(|(l, r)| l.binary(op, r))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Tuple(fields))
            }
            _ => {
                let target = DataType::promote(
                    &self.data_type().ok_or_else(invalid)?,
                    &rhs.data_type().ok_or_else(invalid)?,
                )
                .ok_or_else(invalid)?;
                match target {
                    DataType::Float | DataType::Double => {
                        let l = self.as_f64().ok_or_else(invalid)?;
                        let r = rhs.as_f64().ok_or_else(invalid)?;
                        let result = match op {
                            BinOp::Add => l + r,
                            BinOp::Sub => l - r,
                            BinOp::Mul => l * r,
                            BinOp::Div => l / r,
                            BinOp::Mod => l % r,
                            _ => return Err(invalid()),
                        };
                        if target == DataType::Float {
                            Ok(Value::Float(result as f32))
                        } else {
                            Ok(Value::Double(result))
                        }
                    }
                    _ => {
                        let l = self.as_i64().ok_or_else(invalid)?;
                        let r = rhs.as_i64().ok_or_else(invalid)?;
                        let result = match op {
                            BinOp::Add => Some(l.wrapping_add(r)),
                            BinOp::Sub => Some(l.wrapping_sub(r)),
                            BinOp::Mul => Some(l.wrapping_mul(r)),
                            BinOp::Div => l.checked_div(r),
                            BinOp::Mod => l.checked_rem(r),
                            _ => return Err(invalid()),
                        };
                        match result {
                            Some(v) => Value::Int64(v).cast(&target),
                            None => Ok(Value::Null),
                        }
                    }
                }
            }
        }
    }
}

fn integral(value: &Value) -> Option<i64> {
    match value {
        Value::Float(v) => Some(*v as i64),
        Value::Double(v) => Some(*v as i64),
        other => other.as_i64(),
    }
}

fn logic(lhs: &Value, rhs: &Value, is_or: bool) -> Value {
    let (l, r) = (lhs.as_bool(), rhs.as_bool());
    // the dominant value wins even against null
    if l == Some(is_or) || r == Some(is_or) {
        return Value::Bool(is_or);
    }
    match (l, r) {
        (Some(_), Some(_)) => Value::Bool(!is_or),
        _ => Value::Null,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Date(l), Value::Date(r)) => Some(l.cmp(r)),
        (Value::Timestamp(l), Value::Timestamp(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        (l, r) => {
            let target = DataType::promote(&l.data_type()?, &r.data_type()?)?;
            if target.is_floating() {
                l.as_f64()?.partial_cmp(&r.as_f64()?)
            } else {
                Some(l.as_i64()?.cmp(&r.as_i64()?))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v),
            Value::String(v) => f.write_str(v),
            Value::Tuple(fields) => {
                let fields: Vec<String> = fields.iter().map(|v| v.to_string()).collect();
                write!(f, "({})", fields.join(", "))
            }
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from!(
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float,
    f64 => Double,
    Timestamp => Timestamp,
    Date => Date,
    String => String
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_addition_keeps_width() {
        let sum = Value::Int16(3).binary(BinOp::Add, &Value::Int16(4)).unwrap();
        assert_eq!(sum, Value::Int16(7));

        let widened = Value::Int32(3).binary(BinOp::Add, &Value::Double(0.5)).unwrap();
        assert_eq!(widened, Value::Double(3.5));
    }

    #[test]
    fn test_tuple_addition_is_elementwise() {
        let a = Value::Tuple(vec![Value::Int64(2), Value::Double(3.0)]);
        let b = Value::Tuple(vec![Value::Int64(1), Value::Double(4.5)]);
        assert_eq!(
            a.binary(BinOp::Add, &b).unwrap(),
            Value::Tuple(vec![Value::Int64(3), Value::Double(7.5)])
        );
    }

    #[test]
    fn test_fdiv_and_null() {
        let avg = Value::Double(10.0).binary(BinOp::FDiv, &Value::Int64(4)).unwrap();
        assert_eq!(avg, Value::Double(2.5));
        assert_eq!(
            Value::Null.binary(BinOp::Add, &Value::Int64(1)).unwrap(),
            Value::Null
        );
        assert_eq!(
            Value::Int64(1).binary(BinOp::FDiv, &Value::Int64(0)).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_three_valued_logic() {
        assert_eq!(
            Value::Null.binary(BinOp::And, &Value::Bool(false)).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            Value::Null.binary(BinOp::Or, &Value::Bool(false)).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_casts() {
        assert_eq!(
            Value::Timestamp(Timestamp(1500)).cast(&DataType::Int64).unwrap(),
            Value::Int64(1500)
        );
        assert_eq!(
            Value::Int32(7).cast(&DataType::Double).unwrap(),
            Value::Double(7.0)
        );
        assert_eq!(
            Value::Double(2.0).cast(&DataType::Varchar).unwrap(),
            Value::String("2".to_string())
        );
        assert!(Value::String("x".into()).cast(&DataType::Int64).is_err());
    }

    #[test]
    fn test_timestamp_display_is_utc() {
        let ts = Timestamp(1_590_115_420_000);
        assert_eq!(ts.to_string(), "2020-05-22 02:43:40");
    }
}
