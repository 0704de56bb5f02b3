//! Relief - the shape of a parsed PyWire page.
//!
//! This crate defines the document AST produced by `pywire_armature` and
//! consumed by `pywire_atelier`, the compiler's error taxonomy, and the
//! parser options.
//!
//! ## Name Origin
//!
//! A **relief** is a sculpture raised from a flat surface. The AST is the
//! structure raised from the flat text of a page.

pub mod ast;
pub mod errors;
pub mod options;

pub use ast::*;
pub use errors::{CompileError, CompileResult};
pub use options::ParserOptions;
