//! Section splitting.
//!
//! A page is split into three regions: the leading directive lines, the
//! markup, and the code section fenced by `---` lines. Only the markup is
//! handed to the tokenizer, but it is handed over as a buffer of the same
//! byte length as the source: every byte that belongs to another region is
//! replaced by a space (newlines are kept). Offsets, lines and columns of
//! markup tokens are therefore the offsets, lines and columns of the file.

use once_cell::sync::Lazy;
use regex::Regex;

use pywire_relief::{CompileError, CompileResult, ParserOptions};

use crate::scan::bracket_balance;

const SENTINEL: &str = "---";

static FROM_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^from\s+[\w.]+\s+import\s").unwrap());

/// One directive, possibly spanning several lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveSource {
    /// Lines joined with `\n`, trimmed
    pub text: String,
    /// 1-based line of the `!`
    pub line: u32,
    /// 1-based column of the `!`
    pub column: u32,
    /// Byte offset of the `!`
    pub offset: u32,
}

/// The code section as found in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSource {
    pub text: String,
    /// 1-based line of the first code line
    pub first_line: u32,
}

/// Result of splitting a document.
#[derive(Debug, Clone)]
pub struct Sections {
    pub directives: Vec<DirectiveSource>,
    /// Same length as the source; non-markup bytes blanked
    pub markup: String,
    pub code: Option<CodeSource>,
}

struct Line<'s> {
    text: &'s str,
    /// Byte offset of the line start
    start: usize,
}

fn lines(source: &str) -> Vec<Line<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    for text in source.split('\n') {
        out.push(Line { text, start });
        start += text.len() + 1;
    }
    out
}

/// Split `source` into its sections.
pub fn split_sections(
    source: &str,
    file: &str,
    options: &ParserOptions,
) -> CompileResult<Sections> {
    let lines = lines(source);
    let sentinels: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.text.trim() == SENTINEL)
        .map(|(i, _)| i)
        .take(2)
        .collect();

    // Line indices that belong to the code section or are sentinels
    let (code_range, fenced) = match sentinels.as_slice() {
        [first, second] => (Some((*first + 1, *second)), *first..=*second),
        [first] => (Some((*first + 1, lines.len())), *first..=lines.len()),
        _ => (None, 1..=0),
    };

    if code_range.is_none() {
        check_malformed_separator(&lines, file)?;
    }

    let code = code_range.map(|(start, end)| CodeSource {
        text: lines[start..end]
            .iter()
            .map(|l| l.text)
            .collect::<Vec<_>>()
            .join("\n"),
        first_line: start as u32 + 1,
    });

    let mut markup = String::with_capacity(source.len());
    let mut directives = Vec::new();
    let mut pending: Option<DirectiveSource> = None;
    let mut depth = 0i32;
    let mut in_markup = false;

    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            markup.push('\n');
        }
        if fenced.contains(&i) {
            blank(&mut markup, line.text);
            continue;
        }

        if let Some(directive) = pending.as_mut() {
            directive.text.push('\n');
            directive.text.push_str(line.text.trim());
            depth += bracket_balance(line.text);
            blank(&mut markup, line.text);
            if depth <= 0 {
                directives.extend(pending.take());
            }
            continue;
        }

        let trimmed = line.text.trim_start();
        if !in_markup && trimmed.starts_with('!') {
            let indent = line.text.len() - trimmed.len();
            let directive = DirectiveSource {
                text: trimmed.trim_end().to_string(),
                line: i as u32 + 1,
                column: indent as u32 + 1,
                offset: (line.start + indent) as u32,
            };
            depth = bracket_balance(trimmed);
            blank(&mut markup, line.text);
            if depth > 0 {
                pending = Some(directive);
            } else {
                directives.push(directive);
            }
            continue;
        }

        if !trimmed.is_empty() {
            in_markup = true;
        }
        markup.push_str(line.text);
    }

    if let Some(directive) = pending {
        return Err(CompileError::syntax(
            file,
            directive.line,
            directive.column,
            "Unterminated directive: unbalanced brackets",
        ));
    }

    if options.detect_unfenced_code && code.is_none() {
        check_unfenced_code(&lines, file, options)?;
    }

    Ok(Sections {
        directives,
        markup,
        code,
    })
}

fn blank(buf: &mut String, text: &str) {
    buf.extend(std::iter::repeat(' ').take(text.len()));
}

fn check_malformed_separator(lines: &[Line<'_>], file: &str) -> CompileResult<()> {
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.text.trim();
        if trimmed.len() >= 2 && trimmed.bytes().all(|b| b == b'-') {
            return Err(CompileError::syntax(
                file,
                i as u32 + 1,
                1,
                format!("Malformed separator '{}': expected '---'", trimmed),
            ));
        }
    }
    Ok(())
}

/// Python statements at the start of a markup line, outside `<script>` and
/// `<style>`, mean the author forgot the separator.
fn check_unfenced_code(
    lines: &[Line<'_>],
    file: &str,
    options: &ParserOptions,
) -> CompileResult<()> {
    let mut in_raw = false;
    for (i, line) in lines.iter().enumerate() {
        let lower = line.text.to_ascii_lowercase();
        if in_raw {
            if lower.contains("</script") || lower.contains("</style") {
                in_raw = false;
            }
            continue;
        }
        let opens = lower.contains("<script") || lower.contains("<style");
        let closes = lower.contains("</script") || lower.contains("</style");
        if opens && !closes {
            in_raw = true;
            continue;
        }

        let line_no = i as u32 + 1;
        if line_no <= options.unfenced_code_min_line {
            continue;
        }
        let text = line.text;
        if text.starts_with("def ")
            || text.starts_with("async def ")
            || text.starts_with("class ")
            || text.starts_with("import ")
            || FROM_IMPORT.is_match(text)
        {
            return Err(CompileError::syntax(
                file,
                line_no,
                1,
                "Python code detected in the template without '---' separator",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(source: &str) -> Sections {
        split_sections(source, "test.pywire", &ParserOptions::default()).unwrap()
    }

    #[test]
    fn test_markup_only() {
        let s = split("<h1>Hi</h1>");
        assert!(s.code.is_none());
        assert!(s.directives.is_empty());
        assert_eq!(s.markup, "<h1>Hi</h1>");
    }

    #[test]
    fn test_fenced_code_first() {
        let source = "---\nraise ValueError(\"Boom\")\n---\n<h1>Test</h1>";
        let s = split(source);
        let code = s.code.unwrap();
        assert_eq!(code.text, "raise ValueError(\"Boom\")");
        assert_eq!(code.first_line, 2);
        assert_eq!(s.markup.len(), source.len());
        assert!(s.markup.ends_with("\n<h1>Test</h1>"));
        assert!(s.markup.starts_with("   \n"));
    }

    #[test]
    fn test_trailing_code_section() {
        let s = split("<p>{x}</p>\n---\nx = 1\ny = 2");
        let code = s.code.unwrap();
        assert_eq!(code.text, "x = 1\ny = 2");
        assert_eq!(code.first_line, 3);
    }

    #[test]
    fn test_directives_are_blanked() {
        let source = "!path '/'\n!no_spa\n\n<p>hi</p>";
        let s = split(source);
        assert_eq!(s.directives.len(), 2);
        assert_eq!(s.directives[0].text, "!path '/'");
        assert_eq!(s.directives[1].line, 2);
        assert_eq!(s.markup.len(), source.len());
        assert!(s.markup.trim_start().starts_with("<p>"));
    }

    #[test]
    fn test_multiline_directive() {
        let source = "!path {\n  'home': '/',\n  'post': '/post/{id}'\n}\n<p></p>";
        let s = split(source);
        assert_eq!(s.directives.len(), 1);
        assert_eq!(s.directives[0].text, "!path {\n'home': '/',\n'post': '/post/{id}'\n}");
    }

    #[test]
    fn test_bang_after_markup_is_text() {
        let s = split("<p>hi</p>\n!important");
        assert!(s.directives.is_empty());
        assert!(s.markup.contains("!important"));
    }

    #[test]
    fn test_malformed_separator() {
        let err = split_sections("<p></p>\n----\nx = 1", "a.pywire", &ParserOptions::default())
            .unwrap_err();
        assert_eq!(err.line(), 2);
        assert!(err.message().contains("Malformed separator"));
    }

    #[test]
    fn test_unfenced_code_detected() {
        let source = "<div>\n</div>\n\n\n\ndef handler():\n    pass";
        let err = split_sections(source, "a.pywire", &ParserOptions::default()).unwrap_err();
        assert_eq!(err.line(), 6);
        assert!(err.message().contains("without '---' separator"));
    }

    #[test]
    fn test_code_in_script_is_not_flagged() {
        let source = "<div>\n</div>\n\n\n<script>\nimport x from 'y'\n</script>";
        assert!(split_sections(source, "a.pywire", &ParserOptions::default()).is_ok());
    }
}
