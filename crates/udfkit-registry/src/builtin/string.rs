use udfkit_codegen::BuildStatus;
use udfkit_ir::{DataType, Date, NativeType, Timestamp, TypeAttr};

use crate::builder::ExternalTemplate;
use crate::error::RegistryError;
use crate::library::UdfLibrary;
use crate::signature::{AnyArg, Nullable, TypeSpec};
use crate::variant::native::{self, NativeFunction};

struct Stringify;

impl<T: NativeType + TypeSpec> ExternalTemplate<T> for Stringify {
    fn instantiate(&self) -> NativeFunction {
        native::unary(|x: T| x.into_value().to_string()).nullable()
    }
}

/// One-based substring. A negative `pos` counts from the end, zero or an
/// out of range start yields the empty string.
fn substring(s: &str, pos: i32, len: Option<i32>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let count = chars.len() as i64;
    let start = match pos as i64 {
        0 => return String::new(),
        p if p > 0 => p - 1,
        p => count + p,
    };
    if start < 0 || start >= count {
        return String::new();
    }
    let end = match len {
        Some(len) if len <= 0 => return String::new(),
        Some(len) => (start + len as i64).min(count),
        None => count,
    };
    chars[start as usize..end as usize].iter().collect()
}

fn string_output(args: &[TypeAttr]) -> TypeAttr {
    TypeAttr::new(DataType::Varchar).with_nullable(args.iter().any(|a| a.nullable))
}

pub(crate) fn register(library: &mut UdfLibrary) -> Result<(), RegistryError> {
    library
        .register_external_template("string", Stringify)
        .doc("Formats the argument as a string.")
        .return_by_arg(true)
        .args_in::<(bool, i16, i32, i64, f32, f64, Timestamp, Date)>()?;

    library
        .register_codegen("concat")
        .doc("Concatenates the arguments; null if any argument is null.")
        .variadic_args::<()>(
            |_ctx, args| Ok(string_output(args)),
            |ctx, args| {
                ctx.builders()
                    .string()
                    .concat(ctx.current_block(), args)
            },
        )?;

    library
        .register_codegen("concat_ws")
        .doc("Concatenates the remaining arguments separated by the first.\n\n  concat_ws(sep, a, b, ...)")
        .variadic_args::<(AnyArg,)>(
            |_ctx, args| Ok(string_output(args)),
            |ctx, args| {
                let Some((sep, parts)) = args.split_first() else {
                    return Err(BuildStatus::new("concat_ws needs a separator"));
                };
                ctx.builders()
                    .string()
                    .concat_ws(ctx.current_block(), sep, parts)
            },
        )?;

    library
        .register_external("substring")
        .doc(
            "Substring starting at the one-based `pos`, optionally `len` characters long. \
             A negative `pos` counts from the end.\n\n  substring(str, pos[, len])",
        )
        .return_by_arg(true)
        .args::<(Nullable<String>, Nullable<i32>)>(native::binary(|s: String, pos: i32| {
            substring(&s, pos, None)
        }))?
        .args::<(Nullable<String>, Nullable<i32>, Nullable<i32>)>(native::ternary(
            |s: String, pos: i32, len: i32| substring(&s, pos, Some(len)),
        ))?;

    library.register_alias("substr", "substring")?;
    Ok(())
}
