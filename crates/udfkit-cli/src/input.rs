//! Argument types and literal rows given on the command line

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use udfkit_ir::{DataType, Date, TypeAttr, Value};

/// Parses names such as `int64` or `string?`
pub fn parse_types<S: AsRef<str>>(names: &[S]) -> Result<Vec<TypeAttr>> {
    names
        .iter()
        .map(|name| {
            name.as_ref()
                .parse::<TypeAttr>()
                .with_context(|| format!("invalid argument type {:?}", name.as_ref()))
        })
        .collect()
}

fn to_value(json: &serde_json::Value, attr: &TypeAttr) -> Result<Value> {
    let raw = match json {
        serde_json::Value::Null => return Ok(Value::Null),
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int64(i),
            None => Value::Double(n.as_f64().ok_or_else(|| anyhow!("unsupported number {}", n))?),
        },
        serde_json::Value::String(s) if attr.data_type == DataType::Date => {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("invalid date {:?}", s))?;
            return Ok(Value::Date(Date(date)));
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        other => bail!("unsupported literal {}", other),
    };
    Ok(raw.cast(&attr.data_type)?)
}

/// Parses a JSON array of rows, each an array with one literal per type
pub fn parse_rows(json: &str, types: &[TypeAttr]) -> Result<Vec<Vec<Value>>> {
    let rows: Vec<Vec<serde_json::Value>> =
        serde_json::from_str(json).context("rows must be a JSON array of arrays")?;
    rows.iter()
        .enumerate()
        .map(|(i, row)| -> Result<Vec<Value>> {
            if row.len() != types.len() {
                bail!("row {} has {} values, expected {}", i, row.len(), types.len());
            }
            row.iter()
                .zip(types)
                .map(|(literal, attr)| {
                    to_value(literal, attr).with_context(|| format!("row {}", i))
                })
                .collect()
        })
        .collect()
}
