use std::sync::LazyLock;
use tracing::info;

use crate::builtin::DefaultUdfLibrary;
use crate::library::UdfLibrary;

// Built on first use, read-only afterwards
static DEFAULT_LIBRARY: LazyLock<UdfLibrary> = LazyLock::new(|| {
    let library = DefaultUdfLibrary::build().expect("Failed to register default udf library");
    info!(functions = library.len(), "default udf library initialized");
    library
});

/// The process-wide library holding every built-in function
pub fn default_library() -> &'static UdfLibrary {
    &DEFAULT_LIBRARY
}
