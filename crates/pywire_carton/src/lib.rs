//! Carton - The artist's toolbox for PyWire.
//!
//! This crate provides the foundational utilities shared by every stage of the
//! PyWire compiler, much like a carton (artist's portfolio case) holds the
//! tools and materials an artist reaches for during the work.
//!
//! # Modules
//!
//! - **hash**: xxHash3 content hashing for deterministic identifiers
//! - **line_index**: offset to line/column lookup
//! - **code_writer**: indentation-aware output buffer with a source line map
//! - **quote**: Python literal and HTML escaping helpers
//! - **dom_tag_config**: static tag tables (void, raw text, form fields)
//!
//! # Example
//!
//! ```
//! use pywire_carton::{CodeWriter, LineIndex};
//!
//! let index = LineIndex::new("a\nbc");
//! assert_eq!(index.line_col(3), (2, 2));
//!
//! let mut w = CodeWriter::new();
//! w.line("x = 1", Some(7));
//! let (code, map) = w.finish();
//! assert_eq!(code, "x = 1\n");
//! assert_eq!(map.source_line(1), Some(7));
//! ```

pub mod code_writer;
pub mod dom_tag_config;
pub mod hash;
pub mod line_index;
pub mod quote;

pub use code_writer::{CodeWriter, LineMap};
pub use dom_tag_config::*;
pub use line_index::LineIndex;
pub use quote::*;

// Re-export compact_str::CompactString for convenience
pub use compact_str::{format_compact, CompactString};

// Re-export smallvec for stack-optimized collections
pub use smallvec::{smallvec, SmallVec};

// Re-export rustc-hash for fast hash maps/sets
pub use rustc_hash::{FxHashMap, FxHashSet};

// Re-export phf for compile-time perfect hash functions
pub use phf::{phf_set, Set as PhfSet};
