//! Interpolation resolver.
//!
//! Splits text into literal pieces and `{expression}` spans. A brace group
//! only becomes an interpolation when its content is a Python expression
//! (optionally followed by a `:format_spec`); anything else, CSS rules in
//! particular, stays literal text.

use std::ops::ControlFlow;

use pywire_carton::LineIndex;
use pywire_croquis::parse_expression;
use pywire_relief::{Interpolation, InterpolationPart, Position};

use crate::scan::{for_each_top_level, matching_brace};

/// Split `text`, which starts at byte `base` of the indexed source.
pub fn split_interpolations(text: &str, base: usize, index: &LineIndex) -> Vec<InterpolationPart> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    let mut last = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                literal.push_str(&text[last..i]);
                literal.push('{');
                i += 2;
                last = i;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                literal.push_str(&text[last..i]);
                literal.push('}');
                i += 2;
                last = i;
            }
            b'{' => {
                let Some(close) = matching_brace(text, i) else {
                    i += 1;
                    continue;
                };
                let inner = &text[i + 1..close];
                match classify(inner) {
                    Some((expression, format_spec)) => {
                        literal.push_str(&text[last..i]);
                        if !literal.is_empty() {
                            parts.push(InterpolationPart::Literal(std::mem::take(&mut literal)));
                        }
                        let leading = inner.len() - inner.trim_start().len();
                        let offset = (base + i + 1 + leading) as u32;
                        let (line, column) = index.line_col(offset);
                        parts.push(InterpolationPart::Expr(Interpolation {
                            expression,
                            format_spec,
                            pos: Position::new(offset, line, column),
                        }));
                    }
                    None => literal.push_str(&text[last..=close]),
                }
                i = close + 1;
                last = i;
            }
            _ => i += 1,
        }
    }

    literal.push_str(&text[last..]);
    if !literal.is_empty() {
        parts.push(InterpolationPart::Literal(literal));
    }
    parts
}

/// Whether `parts` holds at least one expression.
pub fn has_expressions(parts: &[InterpolationPart]) -> bool {
    parts
        .iter()
        .any(|p| matches!(p, InterpolationPart::Expr(_)))
}

/// Decide whether brace content is an expression. Returns the expression
/// and the optional format spec.
fn classify(inner: &str) -> Option<(String, Option<String>)> {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        return None;
    }
    if is_expression(trimmed) {
        return Some((trimmed.to_string(), None));
    }
    if has_top_level(trimmed, b';') {
        return None;
    }

    let colon = format_spec_colon(trimmed)?;
    let head = trimmed[..colon].trim();
    if !head.is_empty() && is_expression(head) {
        let spec = trimmed[colon + 1..].trim().to_string();
        return Some((head.to_string(), Some(spec)));
    }
    None
}

fn is_expression(source: &str) -> bool {
    parse_expression(source, 1, 1).is_ok()
}

fn has_top_level(s: &str, needle: u8) -> bool {
    let mut found = false;
    for_each_top_level(s, |_, c| {
        if c == needle {
            found = true;
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    found
}

/// First top-level `:` that does not belong to a `lambda`.
fn format_spec_colon(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut pending_lambdas = 0u32;
    let mut found = None;
    for_each_top_level(s, |i, c| {
        if c == b'l' && starts_keyword(bytes, i, b"lambda") {
            pending_lambdas += 1;
        } else if c == b':' {
            if pending_lambdas > 0 {
                pending_lambdas -= 1;
            } else {
                found = Some(i);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    });
    found
}

fn starts_keyword(bytes: &[u8], i: usize, kw: &[u8]) -> bool {
    let is_ident = |b: u8| b == b'_' || b.is_ascii_alphanumeric();
    bytes[i..].starts_with(kw)
        && (i == 0 || !is_ident(bytes[i - 1]))
        && bytes.get(i + kw.len()).map_or(true, |b| !is_ident(*b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str) -> Vec<InterpolationPart> {
        split_interpolations(text, 0, &LineIndex::new(text))
    }

    fn expr(part: &InterpolationPart) -> &Interpolation {
        match part {
            InterpolationPart::Expr(e) => e,
            InterpolationPart::Literal(s) => panic!("expected expression, got {:?}", s),
        }
    }

    #[test]
    fn test_text_with_expression() {
        let parts = split("Hello, {name}!");
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], InterpolationPart::Literal("Hello, ".into()));
        assert_eq!(expr(&parts[1]).expression, "name");
        assert_eq!(parts[2], InterpolationPart::Literal("!".into()));
    }

    #[test]
    fn test_complex_expression() {
        let parts = split(r#"{"yes" if ok else "no"}"#);
        assert_eq!(parts.len(), 1);
        assert_eq!(expr(&parts[0]).expression, r#""yes" if ok else "no""#);
    }

    #[test]
    fn test_nested_braces_in_expression() {
        let parts = split("{ {'a': 1}['a'] }");
        assert_eq!(expr(&parts[0]).expression, "{'a': 1}['a']");
    }

    #[test]
    fn test_format_spec() {
        let parts = split("Total: {price:.2f}");
        let e = expr(&parts[1]);
        assert_eq!(e.expression, "price");
        assert_eq!(e.format_spec.as_deref(), Some(".2f"));
    }

    #[test]
    fn test_css_stays_literal() {
        let parts = split(".a { color: red; }");
        assert_eq!(parts, vec![InterpolationPart::Literal(".a { color: red; }".into())]);
    }

    #[test]
    fn test_escaped_braces() {
        let parts = split("{{literal}} {x}");
        assert_eq!(parts[0], InterpolationPart::Literal("{literal} ".into()));
        assert_eq!(expr(&parts[1]).expression, "x");
    }

    #[test]
    fn test_unmatched_brace_is_literal() {
        let parts = split("a { b");
        assert_eq!(parts, vec![InterpolationPart::Literal("a { b".into())]);
    }

    #[test]
    fn test_positions_are_absolute() {
        let source = "<p>\n  Value: { 1 / 0 }\n</p>";
        let start = 3;
        let text = &source[start..source.len() - 4];
        let parts = split_interpolations(text, start, &LineIndex::new(source));
        let e = expr(&parts[1]);
        assert_eq!(e.expression, "1 / 0");
        assert_eq!(e.pos.line, 2);
        assert_eq!(e.pos.column, 12);
    }

    #[test]
    fn test_lambda_colon_is_not_format_spec() {
        let parts = split("{(lambda v: v * 2)(n)}");
        let e = expr(&parts[0]);
        assert_eq!(e.format_spec, None);
    }
}
