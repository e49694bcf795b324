//! Built-in functions and aggregates

mod aggregate;
mod core;
mod math;
mod string;
mod time;

use tracing::debug;
use udfkit_codegen::{BuildStatus, NativeValue};
use udfkit_ir::Expr;

use crate::error::RegistryError;
use crate::library::UdfLibrary;
use crate::resolve::ResolveContext;

pub(crate) type NumberTypes = (i16, i32, i64, f32, f64);

/// Argument `index` of an expansion
pub(crate) fn expr_arg<'e>(
    ctx: &ResolveContext<'_>,
    args: &'e [Expr],
    index: usize,
) -> Result<&'e Expr, RegistryError> {
    args.get(index)
        .ok_or_else(|| ctx.error(format!("missing argument {}", index)))
}

/// Argument `index` handed to an emit function
pub(crate) fn built_arg(args: &[NativeValue], index: usize) -> Result<&NativeValue, BuildStatus> {
    args.get(index)
        .ok_or_else(|| BuildStatus::new(format!("missing argument {}", index)))
}

pub struct DefaultUdfLibrary;

impl DefaultUdfLibrary {
    /// Registers every built-in into `library`
    pub fn register_all(library: &mut UdfLibrary) -> Result<(), RegistryError> {
        core::register(library)?;
        math::register(library)?;
        time::register(library)?;
        string::register(library)?;
        aggregate::register(library)?;
        debug!(functions = library.len(), "registered built-in functions");
        Ok(())
    }

    pub fn build() -> Result<UdfLibrary, RegistryError> {
        let mut library = UdfLibrary::new();
        Self::register_all(&mut library)?;
        Ok(library)
    }
}
