//! Fixed textual formatting of container output

use udfkit_ir::NativeType;

/// Renders a value the same way regardless of platform locale.
///
/// Integers print plainly, floats print their shortest round-trip form
/// (`2.0` renders as `2`), timestamps as `%Y-%m-%d %H:%M:%S` UTC and dates
/// as `%Y-%m-%d`.
pub fn format_string<T: NativeType>(value: &T) -> String {
    value.clone().into_value().to_string()
}

/// Joins `key:value` pairs with commas
pub fn format_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> String {
    let tokens: Vec<String> = pairs
        .into_iter()
        .map(|(key, value)| format!("{}:{}", key, value))
        .collect();
    tokens.join(",")
}
