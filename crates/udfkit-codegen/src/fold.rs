use chrono::Timelike;
use tracing::trace;
use udfkit_ir::{BinOp, Date, Timestamp, Value};

use crate::builder::*;
use crate::{BuildStatus, NativeValue};

/// Builder that evaluates every operation over constant inputs
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantFolder;

impl ConstantFolder {
    pub fn new() -> Self {
        Self
    }
}

fn constant<'v>(op: &str, value: &'v NativeValue) -> Result<&'v Value, BuildStatus> {
    value.as_const().ok_or_else(|| {
        trace!(op, "cannot fold non-constant input");
        BuildStatus::new(format!("{} expects a constant input, got {:?}", op, value))
    })
}

fn timestamp_of(op: &str, value: &Value) -> Result<Timestamp, BuildStatus> {
    match value {
        Value::Timestamp(ts) => Ok(*ts),
        Value::Int64(ms) => Ok(Timestamp(*ms)),
        other => Err(BuildStatus::new(format!(
            "{} expects a timestamp, got {}",
            op, other
        ))),
    }
}

fn time_part(
    op: &str,
    time: &NativeValue,
    part: impl Fn(chrono::DateTime<chrono::Utc>) -> u32,
) -> BuildResult {
    let value = constant(op, time)?;
    if value.is_null() {
        return Ok(NativeValue::Const(Value::Null));
    }
    let ts = timestamp_of(op, value)?;
    let dt = ts
        .to_datetime()
        .ok_or_else(|| BuildStatus::new(format!("timestamp {} out of range", ts.0)))?;
    Ok(NativeValue::create(part(dt) as i32))
}

fn date_part(op: &str, date: &NativeValue, part: impl Fn(Date) -> i32) -> BuildResult {
    match constant(op, date)? {
        Value::Null => Ok(NativeValue::Const(Value::Null)),
        Value::Date(d) => Ok(NativeValue::create(part(*d))),
        other => Err(BuildStatus::new(format!("{} expects a date, got {}", op, other))),
    }
}

fn strings(op: &str, parts: &[NativeValue]) -> Result<Option<Vec<String>>, BuildStatus> {
    let mut out = Vec::with_capacity(parts.len());
    for part in parts {
        match constant(op, part)? {
            Value::Null => return Ok(None),
            other => out.push(other.to_string()),
        }
    }
    Ok(Some(out))
}

impl TimestampIrBuilder for ConstantFolder {
    fn hour(&self, _block: BlockId, time: &NativeValue) -> BuildResult {
        time_part("hour", time, |dt| dt.hour())
    }

    fn minute(&self, _block: BlockId, time: &NativeValue) -> BuildResult {
        time_part("minute", time, |dt| dt.minute())
    }

    fn second(&self, _block: BlockId, time: &NativeValue) -> BuildResult {
        time_part("second", time, |dt| dt.second())
    }
}

impl DateIrBuilder for ConstantFolder {
    fn year(&self, _block: BlockId, date: &NativeValue) -> BuildResult {
        date_part("year", date, |d| d.year())
    }

    fn month(&self, _block: BlockId, date: &NativeValue) -> BuildResult {
        date_part("month", date, |d| d.month() as i32)
    }

    fn day(&self, _block: BlockId, date: &NativeValue) -> BuildResult {
        date_part("day", date, |d| d.day() as i32)
    }
}

impl StringIrBuilder for ConstantFolder {
    fn concat(&self, _block: BlockId, parts: &[NativeValue]) -> BuildResult {
        Ok(match strings("concat", parts)? {
            Some(parts) => NativeValue::create(parts.concat()),
            None => NativeValue::Const(Value::Null),
        })
    }

    fn concat_ws(&self, _block: BlockId, sep: &NativeValue, parts: &[NativeValue]) -> BuildResult {
        let sep = match constant("concat_ws", sep)? {
            Value::Null => return Ok(NativeValue::Const(Value::Null)),
            other => other.to_string(),
        };
        Ok(match strings("concat_ws", parts)? {
            Some(parts) => NativeValue::create(parts.join(&sep)),
            None => NativeValue::Const(Value::Null),
        })
    }
}

impl ArithmeticIrBuilder for ConstantFolder {
    fn add(&self, _block: BlockId, lhs: &NativeValue, rhs: &NativeValue) -> BuildResult {
        let (l, r) = (constant("add", lhs)?, constant("add", rhs)?);
        l.binary(BinOp::Add, r)
            .map(NativeValue::Const)
            .map_err(|e| BuildStatus::new(e.to_string()))
    }
}

impl IrBuilders for ConstantFolder {
    fn timestamp(&self) -> &dyn TimestampIrBuilder {
        self
    }

    fn date(&self) -> &dyn DateIrBuilder {
        self
    }

    fn string(&self) -> &dyn StringIrBuilder {
        self
    }

    fn arithmetic(&self) -> &dyn ArithmeticIrBuilder {
        self
    }
}
