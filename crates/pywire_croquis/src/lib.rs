//! Croquis - quick sketches of the embedded Python code.
//!
//! A PyWire page carries Python in two places: the code section below the
//! `---` sentinel and the expressions scattered through the markup
//! (interpolations, conditions, inline handlers). The code generator never
//! emits that Python as opaque text. It parses it into the syntax tree defined
//! here, rewrites the tree, and prints it back out with the original source
//! lines attached.
//!
//! ## Name Origin
//!
//! A **croquis** is a rapid sketch capturing the essential structure of a
//! subject. This crate captures just enough of Python's structure to rewrite
//! it safely.
//!
//! # Modules
//!
//! - **lexer** / **token**: indentation-aware tokenizer
//! - **parser**: recursive descent parser producing [`ast`] nodes
//! - **printer**: precedence-aware printer writing into a `CodeWriter`
//! - **binder**: the self-binding pass (`count` -> `self.count`)
//! - **analysis**: tree queries and rewrites used by the generator

pub mod analysis;
pub mod ast;
pub mod binder;
pub mod builtins;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod token;

pub use ast::{Block, Expr, Ident, Module, Stmt, StmtKind};
pub use binder::{free_names, target_names, SelfBinder};
pub use builtins::{is_builtin, is_keyword};
pub use error::{PyResult, PySyntaxError};
pub use parser::{parse_expression, parse_for_header, parse_module};
pub use printer::{print_block, print_expr, print_function, print_statements, print_stmt};
