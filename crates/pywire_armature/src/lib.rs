//! Armature - the structural parser for PyWire pages.
//!
//! Turns page source into a [`ParsedDocument`]:
//!
//! 1. **sections**: split directives, markup and the `---` code section
//! 2. **directives**: resolve `!path`, `!layout`, `!component`, `!no_spa`
//! 3. **tokenizer** / **parser**: build the template tree
//! 4. **attributes** / **interpolation**: typed special attributes and
//!    `{expr}` spans
//! 5. **forms**: validation schemas for `<form @submit>`
//!
//! ## Name Origin
//!
//! An **armature** is the framework a sculptor builds before adding clay.
//! The parser gives the page the skeleton every later stage hangs on.

pub mod attributes;
pub mod directives;
pub mod forms;
pub mod interpolation;
pub mod parser;
mod scan;
pub mod sections;
pub mod tokenizer;

pub use attributes::{AttributeKind, ATTRIBUTE_RESOLVERS};
pub use directives::{DirectiveKind, DIRECTIVE_RESOLVERS};
pub use forms::{extract_schema, parse_size};
pub use interpolation::split_interpolations;
pub use parser::Parser;
pub use sections::{split_sections, Sections};

use tracing::debug;

use pywire_carton::hash::content_hash;
use pywire_carton::LineIndex;
use pywire_croquis::parse_module;
use pywire_relief::{CodeSection, CompileError, CompileResult, ParsedDocument, ParserOptions};

use crate::directives::{resolve_directives, DirectiveContext};

/// Parse a page with default options.
pub fn parse(source: &str, file_path: &str) -> CompileResult<ParsedDocument> {
    parse_with_options(source, file_path, &ParserOptions::default())
}

/// Parse a page. Any failure aborts the whole parse.
pub fn parse_with_options(
    source: &str,
    file_path: &str,
    options: &ParserOptions,
) -> CompileResult<ParsedDocument> {
    let sections = split_sections(source, file_path, options)?;
    let index = LineIndex::new(source);

    let directives = resolve_directives(
        &sections.directives,
        &DirectiveContext {
            file: file_path,
            index: &index,
        },
    )?;

    let mut template = Parser::new(&sections.markup, file_path, &index, options).parse()?;
    forms::attach_form_schemas(&mut template);

    let code = match sections.code {
        Some(code) => {
            let module = parse_module(&code.text, code.first_line)
                .map_err(|err| CompileError::embedded(file_path, err))?;
            Some(CodeSection {
                source: code.text,
                first_line: code.first_line,
                module,
            })
        }
        None => None,
    };

    debug!(
        file = file_path,
        directives = directives.len(),
        nodes = template.len(),
        has_code = code.is_some(),
        "parsed document"
    );

    Ok(ParsedDocument {
        file_path: file_path.to_string(),
        content_hash: content_hash(source),
        directives,
        template,
        code,
    })
}
