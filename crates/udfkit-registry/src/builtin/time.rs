//! Date and time parts and formatting
//!
//! Timestamps are milliseconds since the epoch in UTC; a bare int64 is read
//! the same way. Parts of a `date` are emitted through the date builder so
//! constant dates fold at build time.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::fmt::Write;
use udfkit_codegen::{BlockId, BuildResult, DateIrBuilder, NativeValue, TimestampIrBuilder};
use udfkit_ir::{Date, NativeType, Timestamp};

use super::built_arg;
use crate::builder::{CodeGenFunction, CodeGenTemplate};
use crate::error::{EvalError, RegistryError};
use crate::library::UdfLibrary;
use crate::signature::Nullable;
use crate::variant::native;

fn datetime(ts: Timestamp) -> DateTime<Utc> {
    ts.to_datetime().unwrap_or_default()
}

fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().number_from_sunday() as i32
}

fn week_of_year(date: NaiveDate) -> i32 {
    date.iso_week().week() as i32
}

/// Renders `datetime` with a strftime pattern such as `%Y-%m-%d %H:%M:%S`
fn date_format(datetime: NaiveDateTime, pattern: &str) -> Result<String, EvalError> {
    let invalid = || EvalError::InvalidArgument {
        func: "date_format".to_string(),
        msg: format!("invalid format {:?}", pattern),
    };
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(invalid());
    }
    let mut out = String::new();
    write!(out, "{}", datetime.format_with_items(items.iter())).map_err(|_| invalid())?;
    Ok(out)
}

/// Registers `f` over int64 milliseconds, timestamps and dates
fn external_date_part(
    library: &mut UdfLibrary,
    name: &str,
    doc: &str,
    f: fn(NaiveDate) -> i32,
) -> Result<(), RegistryError> {
    library
        .register_external(name)
        .doc(doc)
        .args::<(Nullable<i64>,)>(native::unary(move |ms: i64| {
            f(datetime(Timestamp(ms)).date_naive())
        }))?
        .args::<(Nullable<Timestamp>,)>(native::unary(move |ts: Timestamp| {
            f(datetime(ts).date_naive())
        }))?
        .args::<(Nullable<Date>,)>(native::unary(move |date: Date| f(date.0)))?;
    Ok(())
}

/// Registers `f` over int64 milliseconds and timestamps, and the date builder
/// operation `emit` over dates
fn date_part(
    library: &mut UdfLibrary,
    name: &str,
    doc: &str,
    f: fn(NaiveDate) -> i32,
    emit: fn(&dyn DateIrBuilder, BlockId, &NativeValue) -> BuildResult,
) -> Result<(), RegistryError> {
    library
        .register_external(name)
        .doc(doc)
        .args::<(Nullable<i64>,)>(native::unary(move |ms: i64| {
            f(datetime(Timestamp(ms)).date_naive())
        }))?
        .args::<(Nullable<Timestamp>,)>(native::unary(move |ts: Timestamp| {
            f(datetime(ts).date_naive())
        }))?;
    library
        .register_codegen(name)
        .returns::<i32>()
        .args::<(Nullable<Date>,)>(move |ctx, args| {
            emit(ctx.builders().date(), ctx.current_block(), built_arg(args, 0)?)
        })?;
    Ok(())
}

/// Time of day through the timestamp builder
struct TimePart {
    emit: fn(&dyn TimestampIrBuilder, BlockId, &NativeValue) -> BuildResult,
}

impl<T: NativeType> CodeGenTemplate<T> for TimePart {
    fn instantiate(&self) -> CodeGenFunction {
        let emit = self.emit;
        CodeGenFunction::new::<(Nullable<T>,)>(move |ctx, args| {
            emit(ctx.builders().timestamp(), ctx.current_block(), built_arg(args, 0)?)
        })
    }
}

pub(crate) fn register(library: &mut UdfLibrary) -> Result<(), RegistryError> {
    date_part(
        library,
        "year",
        "Calendar year.",
        |d| d.year(),
        |b, block, v| b.year(block, v),
    )?;
    date_part(
        library,
        "month",
        "Month of the year, 1 to 12.",
        |d| d.month() as i32,
        |b, block, v| b.month(block, v),
    )?;
    date_part(
        library,
        "dayofmonth",
        "Day of the month, 1 to 31.",
        |d| d.day() as i32,
        |b, block, v| b.day(block, v),
    )?;
    external_date_part(
        library,
        "dayofweek",
        "Day of the week, 1 (Sunday) to 7 (Saturday).",
        day_of_week,
    )?;
    external_date_part(
        library,
        "weekofyear",
        "ISO 8601 week number, 1 to 53.",
        week_of_year,
    )?;

    library
        .register_codegen_template(
            "hour",
            TimePart {
                emit: |b, block, v| b.hour(block, v),
            },
        )
        .doc("Hour of the day, 0 to 23.")
        .returns::<i32>()
        .args_in::<(i64, Timestamp)>()?;
    library
        .register_codegen_template(
            "minute",
            TimePart {
                emit: |b, block, v| b.minute(block, v),
            },
        )
        .doc("Minute of the hour.")
        .returns::<i32>()
        .args_in::<(i64, Timestamp)>()?;
    library
        .register_codegen_template(
            "second",
            TimePart {
                emit: |b, block, v| b.second(block, v),
            },
        )
        .doc("Second of the minute.")
        .returns::<i32>()
        .args_in::<(i64, Timestamp)>()?;

    library
        .register_external("date_format")
        .doc(
            "Formats a timestamp or date with a strftime pattern.\n\n  \
             date_format(timestamp, \"%Y-%m-%d %H:%M:%S\")",
        )
        .return_by_arg(true)
        .args::<(Nullable<Timestamp>, Nullable<String>)>(native::try_binary(
            |ts: Timestamp, pattern: String| date_format(datetime(ts).naive_utc(), &pattern),
        ))?
        .args::<(Nullable<Date>, Nullable<String>)>(native::try_binary(
            |date: Date, pattern: String| date_format(date.0.and_time(NaiveTime::MIN), &pattern),
        ))?;

    library.register_alias("day", "dayofmonth")?;
    library.register_alias("week", "weekofyear")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Variant;
    use udfkit_ir::{DataType, TypeAttr, Value};

    fn library() -> UdfLibrary {
        let mut library = UdfLibrary::new();
        register(&mut library).unwrap();
        library
    }

    fn call(library: &UdfLibrary, name: &str, arg: Value) -> Value {
        let attr = TypeAttr::new(arg.data_type().unwrap());
        let variant = library.lookup(name, &[attr]).unwrap();
        let Variant::External(def) = &variant.variant else {
            panic!("{} should be external", name);
        };
        (def.func)(&[arg]).unwrap()
    }

    #[test]
    fn test_parts_of_timestamp() {
        let library = library();
        // 2020-05-22 10:43:40 UTC, a Friday
        let ts = Value::Timestamp(Timestamp(1_590_144_220_000));
        assert_eq!(call(&library, "year", ts.clone()), Value::Int32(2020));
        assert_eq!(call(&library, "month", ts.clone()), Value::Int32(5));
        assert_eq!(call(&library, "day", ts.clone()), Value::Int32(22));
        assert_eq!(call(&library, "dayofweek", ts.clone()), Value::Int32(6));
        assert_eq!(call(&library, "week", ts), Value::Int32(21));
    }

    #[test]
    fn test_int64_reads_as_millis() {
        let library = library();
        assert_eq!(call(&library, "year", Value::Int64(0)), Value::Int32(1970));
        assert_eq!(call(&library, "dayofweek", Value::Int64(0)), Value::Int32(5));
    }

    #[test]
    fn test_date_parts_are_codegen() {
        let library = library();
        let date = TypeAttr::new(DataType::Date);
        let variant = library.lookup("year", &[date.clone()]).unwrap();
        assert!(matches!(variant.variant, Variant::CodeGen(_)));
        let variant = library.lookup("dayofweek", &[date]).unwrap();
        assert!(matches!(variant.variant, Variant::External(_)));
    }

    #[test]
    fn test_date_format() {
        let library = library();
        let args = [TypeAttr::new(DataType::Timestamp), TypeAttr::new(DataType::Varchar)];
        let variant = library.lookup("date_format", &args).unwrap();
        let Variant::External(def) = &variant.variant else {
            panic!("date_format should be external");
        };
        assert!(def.return_by_arg);
        let ts = Value::Timestamp(Timestamp(1_590_144_220_000));
        assert_eq!(
            (def.func)(&[ts.clone(), Value::from("%Y-%m-%d %H:%M:%S")]).unwrap(),
            Value::from("2020-05-22 10:43:40")
        );
        assert_eq!((def.func)(&[ts.clone(), Value::Null]).unwrap(), Value::Null);
        assert!(matches!(
            (def.func)(&[ts, Value::from("%Q")]),
            Err(EvalError::InvalidArgument { .. })
        ));

        let args = [TypeAttr::new(DataType::Date), TypeAttr::new(DataType::Varchar)];
        let variant = library.lookup("date_format", &args).unwrap();
        let Variant::External(def) = &variant.variant else {
            panic!("date_format should be external");
        };
        let date = Value::Date(Date::from_ymd(2020, 5, 22).unwrap());
        assert_eq!(
            (def.func)(&[date, Value::from("%d/%m/%Y %H:%M")]).unwrap(),
            Value::from("22/05/2020 00:00")
        );
    }

    #[test]
    fn test_hour_instantiated_per_type() {
        let library = library();
        let entry = library.find("hour").unwrap();
        assert_eq!(entry.variants.len(), 2);
        assert!(entry
            .variants
            .iter()
            .all(|v| matches!(v.variant, Variant::CodeGen(_))));
    }
}
