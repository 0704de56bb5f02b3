//! Atelier - the Python code generator for PyWire pages.
//!
//! Takes a [`pywire_relief::ParsedDocument`] from `pywire_armature` and writes one Python
//! module defining the page class:
//!
//! - **scope** / **user_code**: bind the code section to the page instance
//! - **handlers**: promote inline `@event={...}` code to methods
//! - **forms**: validation schema and submit wrapper per form
//! - **render**: the async render method and `$bind` handlers
//! - **layout**: slot fills for pages with `!layout`
//! - **style**: scoped CSS
//! - **codegen**: puts the module together and records the line map
//!
//! ## Name Origin
//!
//! An **atelier** is the workshop where the finished piece is produced.
//! This is where the page becomes runnable code.

pub mod codegen;
pub mod forms;
pub mod handlers;
pub mod layout;
pub mod options;
pub mod render;
pub mod scope;
pub mod style;
pub mod user_code;

pub use codegen::{generate, CompiledModule, PageHandle, ScopedStyle};
pub use options::CompilerOptions;
pub use style::{apply_scoped_css, StyleCollector};

use pywire_relief::CompileResult;

/// Parse and generate a page in one step.
pub fn compile(source: &str, file_path: &str, options: &CompilerOptions) -> CompileResult<CompiledModule> {
    let mut doc = pywire_armature::parse_with_options(source, file_path, &options.parser)?;
    generate(&mut doc, options)
}
