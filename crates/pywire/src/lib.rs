//! # PyWire
//!
//! Compiler for `.pywire` pages, written in Rust.
//!
//! This crate re-exports all PyWire sub-crates for unified documentation.
//!
//! ## Crates
//!
//! - [`carton`] - Hashing, code writer with line map, quoting helpers
//! - [`croquis`] - Python front end and self-binding pass
//! - [`relief`] - Document AST, errors and options
//! - [`armature`] - Page parser
//! - [`atelier`] - Python code generator

/// Hashing, code writer with line map, quoting helpers.
pub use pywire_carton as carton;

/// Python front end and self-binding pass.
pub use pywire_croquis as croquis;

/// Document AST, errors and options.
pub use pywire_relief as relief;

/// Page parser.
pub use pywire_armature as armature;

/// Python code generator.
pub use pywire_atelier as atelier;
